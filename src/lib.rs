//! A container-oriented process supervisor: a declarative service graph, a dependency-ordered
//! concurrent launcher, PTY-owned children with line-prefixed logging, a Unix-socket control
//! channel, and a signal-driven two-phase shutdown.

#![warn(unused_crate_dependencies)]
// Test-only dependencies are only referenced from #[cfg(test)] modules.
#[cfg(test)]
use assert_cmd as _;
#[cfg(test)]
use predicates as _;
#[cfg(test)]
use tempfile as _;

/// CLI parsing.
pub mod cli;

/// Config loading (C1).
pub mod config;

/// Shared constants.
pub mod constants;

/// Dependency coordinator (C3).
pub mod dependency;

/// Errors.
pub mod error;

/// Control channel server/client (C6).
pub mod ipc;

/// Runtime data model: ServiceState, ServiceProcess, Registry, StartedMarkers.
pub mod registry;

/// Service runner (C4).
pub mod runner;

/// Runtime paths.
pub mod runtime;

/// Shutdown coordinator (C5).
pub mod shutdown;

/// Top-level orchestration.
pub mod supervisor;

/// Validator (C2).
pub mod validate;

/// Test utils.
#[doc(hidden)]
#[cfg(test)]
pub mod test_utils;
