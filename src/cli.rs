//! Command-line interface for the supervisor.
use clap::{Parser, Subcommand};

/// Top-level CLI. No subcommand runs the daemon; subcommands act as a client against a resident
/// daemon (or, for `install`, a standalone convenience with no bearing on the lifecycle engine).
#[derive(Parser)]
#[command(name = "supervisor", version, author)]
#[command(about = "A container-oriented process supervisor", long_about = None)]
pub struct Cli {
    /// Path to the YAML service configuration. Defaults to `supervisor.yaml` or
    /// `services.yaml` when run without a subcommand.
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Raise logging verbosity to `debug` for this invocation.
    #[arg(long, global = true)]
    pub debug: bool,

    /// Optional client subcommand. Absent ⇒ run as the resident daemon.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Client-mode subcommands; each sends one `ControlCommand` to the resident daemon.
#[derive(Subcommand)]
pub enum Commands {
    /// List every managed service and its current state.
    List,

    /// Print a short system status summary.
    Status,

    /// Restart a single named service.
    Restart {
        /// The service to restart.
        name: String,
    },

    /// Symlink the running binary onto `PATH`. Standalone convenience, not part of the
    /// lifecycle engine.
    Install {
        /// Directory to place the symlink in.
        #[arg(long, default_value = "/usr/local/bin")]
        dir: String,
    },
}

/// Parse command-line arguments into a `Cli`.
pub fn parse_args() -> Cli {
    Cli::parse()
}
