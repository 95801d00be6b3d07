//! Shared magic numbers and format strings.

use std::time::Duration;

/// Shell used to run pre/post scripts and `su`-wrapped spawns when `bash` is unavailable.
pub const DEFAULT_SHELL: &str = "sh";

/// Flag passed to the shell to run an inline command string.
pub const SHELL_COMMAND_FLAG: &str = "-c";

/// Polling interval for the dependency coordinator's `StartedMarkers` check.
pub const DEPENDENCY_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Additional grace period after the global shutdown deadline's SIGKILL wave.
pub const KILL_WAVE_GRACE: Duration = Duration::from_secs(5);

/// Maximum accepted value (inclusive) for `wait_after`, scalar or per-edge.
pub const MAX_WAIT_AFTER_SECONDS: u64 = 300;
