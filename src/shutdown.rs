//! C5 — the shutdown coordinator.
//!
//! Fires once, whether triggered by the first SIGINT/SIGTERM/SIGHUP or programmatically by a
//! `required` service failing to start. Broadcasts the global cancellation token, closes and
//! unlinks the control socket, requests a graceful stop of every registered service (each one's
//! own teardown watcher then drives its SIGTERM within its `service_shutdown` budget), and waits
//! for the registry to empty within `global_shutdown` seconds before escalating to a SIGKILL wave.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::{info, warn};

use crate::constants::KILL_WAVE_GRACE;
use crate::registry::{CancelHandle, Registry};
use crate::runner;

/// Owns the process-wide cancellation token and the at-most-once shutdown trigger, reachable
/// both from the signal-listening thread and from the supervisor's `required`-service escalation
/// path.
#[derive(Clone)]
pub struct Coordinator {
    cancel: CancelHandle,
    triggered: Arc<AtomicBool>,
    registry: Registry,
    global_shutdown: Duration,
    socket_path: PathBuf,
}

impl Coordinator {
    /// Construct a coordinator and spawn its signal-listening thread. `global_shutdown` is the
    /// deadline between trigger and the SIGKILL wave; `socket_path` is unlinked on trigger.
    pub fn install(registry: Registry, global_shutdown: Duration, socket_path: PathBuf) -> Self {
        let coordinator = Coordinator {
            cancel: CancelHandle::new(),
            triggered: Arc::new(AtomicBool::new(false)),
            registry,
            global_shutdown,
            socket_path,
        };

        let signal_coordinator = coordinator.clone();
        thread::spawn(move || {
            let mut signals = match Signals::new([SIGINT, SIGTERM, SIGHUP]) {
                Ok(s) => s,
                Err(err) => {
                    warn!(error = %err, "failed to install signal handler");
                    return;
                }
            };
            for sig in signals.forever() {
                info!(signal = sig, "received shutdown signal");
                if signal_coordinator.trigger() {
                    std::process::exit(0);
                }
                // Already triggered by a prior signal or a required-service failure; the first
                // caller's exit(0) will terminate the process, so nothing further to do here.
            }
        });

        coordinator
    }

    /// The cancellation token every suspension point composes with.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Run the shutdown algorithm if it has not already run. Returns `true` if this call is the
    /// one that actually drove shutdown (idempotent: a second signal, or a required-service
    /// failure arriving after a signal, is a no-op observed as "already shutting down").
    pub fn trigger(&self) -> bool {
        if self.triggered.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.run_shutdown();
        true
    }

    fn run_shutdown(&self) {
        self.cancel.cancel();
        let _ = std::fs::remove_file(&self.socket_path);

        if self.registry.is_empty() {
            return;
        }

        for process in self.registry.snapshot() {
            runner::request_stop(&process);
        }

        let deadline = Instant::now() + self.global_shutdown;
        while Instant::now() < deadline {
            if self.registry.is_empty() {
                return;
            }
            thread::sleep(Duration::from_millis(200));
        }

        warn!("global shutdown deadline exceeded, sending SIGKILL to remaining services");
        for process in self.registry.snapshot() {
            if let Some(pid) = process.get_pid() {
                let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
            }
        }

        let kill_deadline = Instant::now() + KILL_WAVE_GRACE;
        while Instant::now() < kill_deadline {
            if self.registry.is_empty() {
                return;
            }
            thread::sleep(Duration::from_millis(200));
        }
        if !self.registry.is_empty() {
            warn!("services remained after SIGKILL wave, proceeding with shutdown anyway");
        }
    }
}
