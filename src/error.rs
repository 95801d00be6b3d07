//! Error types for the supervisor.
use thiserror::Error;

/// Errors surfaced while validating a `Config` (C2) before any process is spawned.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A service name is empty or does not match the allowed name pattern.
    #[error("service '{service}' has an invalid name")]
    InvalidName {
        /// The offending service name.
        service: String,
    },

    /// Two or more services share the same name.
    #[error("duplicate service name '{0}'")]
    DuplicateName(String),

    /// `command` is empty.
    #[error("service '{service}' has an empty command")]
    EmptyCommand {
        /// The service with the empty command.
        service: String,
    },

    /// `command` is neither `PATH`-resolvable nor an existing absolute path.
    #[error("service '{service}' command '{command}' could not be resolved")]
    CommandNotFound {
        /// The service whose command could not be resolved.
        service: String,
        /// The unresolved command string.
        command: String,
    },

    /// `pre_script`, `pos_script`, or the parent directory of `log_file` does not exist.
    #[error("service '{service}' references missing path '{path}' ({kind})")]
    MissingPath {
        /// The service referencing the path.
        service: String,
        /// The path that does not exist.
        path: String,
        /// What kind of path this was (`pre_script`, `pos_script`, `log_file`).
        kind: &'static str,
    },

    /// `user` does not resolve through the local user database.
    #[error("service '{service}' references unknown user '{user}'")]
    UnknownUser {
        /// The service referencing the user.
        service: String,
        /// The unresolved user name.
        user: String,
    },

    /// A `depends_on` entry names a service that does not exist in the set.
    #[error("service '{service}' declares unknown dependency '{dependency}'")]
    UnknownDependency {
        /// The dependent service.
        service: String,
        /// The missing dependency name.
        dependency: String,
    },

    /// A `wait_after` mapping key is not also present in `depends_on`.
    #[error("service '{service}' has wait_after entry for '{dependency}' which is not a declared dependency")]
    WaitAfterNotADependency {
        /// The service with the stray wait_after entry.
        service: String,
        /// The name that is not a declared dependency.
        dependency: String,
    },

    /// A `wait_after` value (scalar or per-edge) falls outside `[0, 300]`.
    #[error("service '{service}' has wait_after value {seconds} outside [0, 300]")]
    WaitAfterOutOfRange {
        /// The service with the out-of-range value.
        service: String,
        /// The offending value.
        seconds: i64,
    },

    /// The dependency graph contains a cycle.
    #[error("dependency cycle detected: {cycle}")]
    DependencyCycle {
        /// Human-readable cycle description, e.g. `a -> b -> a`.
        cycle: String,
    },
}

/// A validation pass may accumulate more than one error before reporting.
#[derive(Debug, Error)]
#[error("config validation failed with {} error(s):\n{}", .0.len(), render_errors(.0))]
pub struct ValidationErrors(pub Vec<ValidationError>);

fn render_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Top-level errors for the supervisor's runtime path (C1/C4/C5).
#[derive(Debug, Error)]
pub enum ProcessManagerError {
    /// Error reading the configuration file from disk.
    #[error("failed to read config file: {0}")]
    ConfigReadError(#[from] std::io::Error),

    /// Error parsing YAML configuration.
    #[error("invalid YAML format: {0}")]
    ConfigParseError(#[from] serde_yaml::Error),

    /// Config failed validation (C2).
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    /// Error spawning a service's child process or allocating its PTY.
    #[error("failed to start service '{service}': {source}")]
    ServiceStartError {
        /// The service that failed to start.
        service: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Error stopping a service's child process.
    #[error("failed to stop service '{service}': {source}")]
    ServiceStopError {
        /// The service that failed to stop.
        service: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A pre-script or post-script exited with a non-zero status.
    #[error("script for service '{service}' failed with status {status:?}")]
    ScriptFailed {
        /// The service whose script failed.
        service: String,
        /// The script's exit status, if one was observed.
        status: Option<i32>,
    },

    /// A dependency never reached "started" within `dependency_wait`.
    #[error("service '{service}' timed out waiting for dependency '{dependency}'")]
    DependencyTimeout {
        /// The dependent service that gave up waiting.
        service: String,
        /// The dependency that never started.
        dependency: String,
    },

    /// A mutex or rwlock guarding shared state was poisoned by a prior panic.
    #[error("lock poisoned: {0}")]
    MutexPoisonError(String),

    /// A raw OS-level errno surfaced by `nix`.
    #[error("OS error: {0}")]
    ErrNo(#[from] nix::errno::Errno),

    /// `restart_service` was requested for a name absent from the registry.
    #[error("unknown service '{0}'")]
    UnknownService(String),
}

impl<T> From<std::sync::PoisonError<T>> for ProcessManagerError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        ProcessManagerError::MutexPoisonError(err.to_string())
    }
}

/// Errors for the control channel (C6), both server- and client-side.
#[derive(Debug, Error)]
pub enum ControlError {
    /// I/O failure on the socket.
    #[error("control socket I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Request or response failed to (de)serialize as JSON.
    #[error("control protocol JSON error: {0}")]
    Serde(#[from] serde_json::Error),

    /// `$HOME` (or the system runtime root) could not be resolved.
    #[error("could not resolve runtime directory")]
    MissingHome,

    /// The daemon is not running (no socket present, or connect refused).
    #[error("could not connect to daemon")]
    NotAvailable,

    /// The daemon returned a `{success: false}` response.
    #[error("{0}")]
    Server(String),
}
