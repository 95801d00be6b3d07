//! C4 — the service runner.
//!
//! Spawns one service instance to completion (exit or forced kill). The child runs attached to
//! a PTY master owned exclusively by this module; the master is a scoped resource, acquired at
//! spawn and released exactly once regardless of whether self-exit or cancellation reaches the
//! teardown path first.

use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use tracing::{debug, error, info, warn};

use crate::config::{ServiceSpec, Timeouts};
use crate::constants::{DEFAULT_SHELL, SHELL_COMMAND_FLAG};
use crate::registry::{CancelHandle, Registry, ServiceProcess, ServiceState, StartedMarkers};

const DEFAULT_PTY_SIZE: PtySize = PtySize {
    rows: 24,
    cols: 120,
    pixel_width: 0,
    pixel_height: 0,
};

/// Run `name` to completion. Blocks the calling task until the instance has been fully torn
/// down (either because the child exited on its own, or because cancellation drove the teardown
/// watcher). Inserts and eventually removes the `Registry` entry; marks `StartedMarkers[name]`
/// once the child is handed off, before waiting for exit.
pub fn run_service(
    name: &str,
    spec: &ServiceSpec,
    timeouts: &Timeouts,
    registry: &Registry,
    markers: &StartedMarkers,
    name_width: usize,
    global_cancel: &CancelHandle,
) -> RunOutcome {
    if let Some(log_file) = &spec.log_file {
        return tail_log_file(name, log_file, name_width, global_cancel);
    }

    let process = Arc::new(ServiceProcess::new(name.to_string(), spec.clone()));
    registry.add_active(process.clone());

    let spawn_result = spawn_child(spec);
    let (mut child, mut reader) = match spawn_result {
        Ok(pair) => pair,
        Err(err) => {
            error!(service = name, error = %err, "failed to spawn service");
            process.set_error(err.to_string());
            registry.remove_active(name);
            return RunOutcome::SpawnFailed(err.to_string());
        }
    };

    if let Some(pid) = child.process_id() {
        process.set_pid(Some(pid));
    }
    process.set_state(ServiceState::Running);
    markers.mark_started(name);
    info!(service = name, "service running");

    let pid = process.get_pid();
    let service_cancel = process.cancel.clone();
    let padded_name = format!("{name:<width$}", width = name_width);

    let pump_done = Arc::new(AtomicBool::new(false));
    let pump_done_writer = pump_done.clone();
    let pump_name = padded_name.clone();
    let log_pump = thread::spawn(move || {
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {
                    let trimmed = line.trim_end_matches(['\n', '\r']);
                    if !trimmed.is_empty() {
                        println!("[{pump_name}] {trimmed}");
                    }
                }
                Err(err) => {
                    debug!(error = %err, "log pump read error, stopping");
                    break;
                }
            }
        }
        pump_done_writer.store(true, Ordering::SeqCst);
    });

    let teardown_cancel = service_cancel.clone();
    let teardown_name = name.to_string();
    let shutdown_timeout = Duration::from_secs(timeouts.service_shutdown);
    let teardown = thread::spawn(move || {
        while !teardown_cancel.is_cancelled() {
            thread::sleep(Duration::from_millis(100));
        }
        if let Some(pid) = pid {
            escalate_shutdown(&teardown_name, pid, shutdown_timeout);
        }
    });

    if let Some(post_script) = spec.pos_script.clone() {
        let post_cancel = service_cancel.clone();
        let post_delay = Duration::from_secs(timeouts.post_script);
        let post_name = name.to_string();
        thread::spawn(move || {
            if sleep_interruptible(&post_cancel, post_delay) && !post_cancel.is_cancelled() {
                if let Err(err) = run_script(&post_script) {
                    warn!(service = post_name, error = %err, "post-script failed");
                }
            }
        });
    }

    let exit_result = child.wait();
    service_cancel.cancel();
    let _ = teardown.join();
    let _ = log_pump.join();

    let outcome = match exit_result {
        Ok(status) if status.success() => {
            process.set_state(ServiceState::Stopped);
            RunOutcome::Stopped
        }
        Ok(status) => {
            let code = status.exit_code() as i32;
            process.set_error(format!("exited with status {code}"));
            RunOutcome::Failed(format!("exited with status {code}"))
        }
        Err(err) => {
            process.set_error(err.to_string());
            RunOutcome::Failed(err.to_string())
        }
    };

    registry.remove_active(name);
    if global_cancel.is_cancelled() {
        info!(service = name, "service torn down as part of shutdown");
    }
    outcome
}

/// Request cancellation of a running instance's teardown watcher, used both by the shutdown
/// coordinator and the restart path in `ipc.rs`.
pub fn request_stop(process: &ServiceProcess) {
    process.set_state(ServiceState::Stopping);
    process.cancel.cancel();
}

/// Outcome of one run of a service instance.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The child (or tailed log) reached a clean stop.
    Stopped,
    /// The child exited non-zero, or the log tail errored.
    Failed(String),
    /// The child could not be spawned at all.
    SpawnFailed(String),
}

fn spawn_child(
    spec: &ServiceSpec,
) -> std::io::Result<(Box<dyn portable_pty::Child + Send + Sync>, BufReader<Box<dyn std::io::Read + Send>>)> {
    let pty_system = native_pty_system();
    let pair = pty_system
        .openpty(DEFAULT_PTY_SIZE)
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    let mut cmd = if let Some(user) = &spec.user {
        let shell = if Command::new("which")
            .arg("bash")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
        {
            "bash"
        } else {
            DEFAULT_SHELL
        };
        let mut full_command = spec.command.clone();
        for arg in &spec.args {
            full_command.push(' ');
            full_command.push_str(arg);
        }
        let mut builder = CommandBuilder::new("su");
        builder.args(["-s", shell, SHELL_COMMAND_FLAG, &full_command, user]);
        builder
    } else {
        let mut builder = CommandBuilder::new(&spec.command);
        builder.args(&spec.args);
        builder
    };
    cmd.cwd(std::env::current_dir().unwrap_or_else(|_| ".".into()));

    let child = pair
        .slave
        .spawn_command(cmd)
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    drop(pair.slave);

    let reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    Ok((child, BufReader::new(reader)))
}

/// SIGTERM, wait up to `timeout`, SIGKILL if still alive. Mirrors the teardown escalation used
/// throughout this pack's process-supervision examples.
fn escalate_shutdown(service: &str, pid: u32, timeout: Duration) {
    let nix_pid = Pid::from_raw(pid as i32);
    if signal::kill(nix_pid, Signal::SIGTERM).is_err() {
        return;
    }
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if !process_alive(nix_pid) {
            return;
        }
        thread::sleep(Duration::from_millis(100));
    }
    if process_alive(nix_pid) {
        warn!(service, "service did not exit within grace period, sending SIGKILL");
        let _ = signal::kill(nix_pid, Signal::SIGKILL);
    }
}

fn process_alive(pid: Pid) -> bool {
    signal::kill(pid, None).is_ok()
}

/// Sleep in small increments so cancellation is observed promptly. Returns `true` if the full
/// duration elapsed without cancellation.
fn sleep_interruptible(cancel: &CancelHandle, duration: Duration) -> bool {
    let step = Duration::from_millis(100);
    let mut remaining = duration;
    while remaining > Duration::ZERO {
        if cancel.is_cancelled() {
            return false;
        }
        let this_step = step.min(remaining);
        thread::sleep(this_step);
        remaining -= this_step;
    }
    !cancel.is_cancelled()
}

/// Run a pre/post script via the best available shell, marking it executable first.
pub fn run_script(path: &str) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = std::fs::metadata(path) {
            let mut perms = metadata.permissions();
            perms.set_mode(perms.mode() | 0o100);
            let _ = std::fs::set_permissions(path, perms);
        }
    }

    let shell = if Command::new("which")
        .arg("bash")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
    {
        "bash"
    } else {
        DEFAULT_SHELL
    };

    let status = Command::new(shell).arg(SHELL_COMMAND_FLAG).arg(path).status()?;
    if status.success() {
        Ok(())
    } else {
        Err(std::io::Error::other(format!(
            "script exited with status {:?}",
            status.code()
        )))
    }
}

fn tail_log_file(
    name: &str,
    path: &str,
    name_width: usize,
    global_cancel: &CancelHandle,
) -> RunOutcome {
    use std::io::{Seek, SeekFrom};

    let padded_name = format!("{name:<width$}", width = name_width);
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(err) => return RunOutcome::Failed(err.to_string()),
    };
    let mut reader = BufReader::new(file);
    if let Err(err) = reader.seek(SeekFrom::End(0)) {
        return RunOutcome::Failed(err.to_string());
    }

    let mut line = String::new();
    while !global_cancel.is_cancelled() {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => thread::sleep(Duration::from_secs(1)),
            Ok(_) => {
                let trimmed = line.trim_end_matches(['\n', '\r']);
                if !trimmed.is_empty() {
                    println!("[{padded_name}] {trimmed}");
                }
            }
            Err(err) => return RunOutcome::Failed(err.to_string()),
        }
    }
    RunOutcome::Stopped
}
