#[path = "common/mod.rs"]
mod common;

use std::fs;
use std::process::{Command as StdCommand, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use assert_cmd::Command;
use common::{wait_for_path, wait_for_path_removed, HomeEnvGuard};
use tempfile::tempdir;

fn socket_path(home: &std::path::Path) -> std::path::PathBuf {
    home.join(".local/share/supervisor/control.sock")
}

/// Scenario A: a simple service starts, the daemon answers `list`, and SIGTERM drives a clean
/// shutdown that removes the control socket within service_shutdown + 1s.
#[test]
fn simple_service_starts_and_shuts_down_on_sigterm() {
    let temp = tempdir().expect("tempdir");
    let dir = temp.path();
    let home = dir.join("home");
    fs::create_dir_all(&home).expect("home dir");
    let _home = HomeEnvGuard::set(&home);

    let config_path = dir.join("supervisor.yaml");
    fs::write(
        &config_path,
        r#"services:
  sleeper:
    command: "sleep"
    args: ["30"]
timeouts:
  service_shutdown: 2
  global_shutdown: 5
"#,
    )
    .expect("write config");

    let mut daemon = StdCommand::new(assert_cmd::cargo::cargo_bin!("supervisor"))
        .arg("--config")
        .arg(&config_path)
        .env("HOME", &home)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn daemon");

    let sock = socket_path(&home);
    wait_for_path(&sock);

    let status = Command::new(assert_cmd::cargo::cargo_bin!("supervisor"))
        .arg("list")
        .env("HOME", &home)
        .assert()
        .success();
    let stdout = String::from_utf8_lossy(&status.get_output().stdout).to_string();
    assert!(stdout.contains("sleeper"), "list output: {stdout}");

    unsafe {
        libc::kill(daemon.id() as libc::pid_t, libc::SIGTERM);
    }

    // service_shutdown is 2s: the service's own teardown watcher must SIGTERM it well within
    // that budget, so the socket disappears and the daemon process exits inside
    // service_shutdown + 1s rather than waiting for the global_shutdown (5s) SIGKILL wave.
    let budget = Duration::from_secs(2) + Duration::from_secs(1);
    let deadline = Instant::now() + budget;
    while Instant::now() < deadline && sock.exists() {
        thread::sleep(Duration::from_millis(100));
    }
    assert!(!sock.exists(), "control socket should be removed after shutdown");

    let mut exited = false;
    while Instant::now() < deadline {
        if daemon.try_wait().expect("try_wait").is_some() {
            exited = true;
            break;
        }
        thread::sleep(Duration::from_millis(100));
    }
    assert!(
        exited,
        "daemon should exit within service_shutdown + 1s, not wait for the global_shutdown SIGKILL wave"
    );

    let _ = daemon.wait();
}

/// Scenario B: a dependent service waits for its dependency plus the configured wait_after delay
/// before being marked started.
#[test]
fn dependency_wait_after_delays_dependent_start() {
    let temp = tempdir().expect("tempdir");
    let dir = temp.path();
    let home = dir.join("home");
    fs::create_dir_all(&home).expect("home dir");
    let _home = HomeEnvGuard::set(&home);

    let marker = dir.join("dependent_started");
    let config_path = dir.join("supervisor.yaml");
    fs::write(
        &config_path,
        format!(
            r#"services:
  base:
    command: "sleep"
    args: ["10"]
  dependent:
    command: "sh"
    args: ["-c", "touch {marker} && sleep 10"]
    depends_on: base
    wait_after: 2
timeouts:
  service_shutdown: 2
  global_shutdown: 5
"#,
            marker = marker.display()
        ),
    )
    .expect("write config");

    let mut daemon = StdCommand::new(assert_cmd::cargo::cargo_bin!("supervisor"))
        .arg("--config")
        .arg(&config_path)
        .env("HOME", &home)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn daemon");

    let sock = socket_path(&home);
    wait_for_path(&sock);

    let start = Instant::now();
    wait_for_path(&marker);
    let elapsed = start.elapsed();
    assert!(
        elapsed >= Duration::from_secs(2),
        "dependent should not start before wait_after elapses, started after {elapsed:?}"
    );

    unsafe {
        libc::kill(daemon.id() as libc::pid_t, libc::SIGTERM);
    }
    let _ = daemon.wait();
}

/// Scenario C: a config with a dependency cycle is rejected before anything is spawned.
#[test]
fn circular_dependency_rejected_at_startup() {
    let temp = tempdir().expect("tempdir");
    let dir = temp.path();
    let home = dir.join("home");
    fs::create_dir_all(&home).expect("home dir");
    let _home = HomeEnvGuard::set(&home);

    let config_path = dir.join("supervisor.yaml");
    fs::write(
        &config_path,
        r#"services:
  a:
    command: "sleep 1"
    depends_on: b
  b:
    command: "sleep 1"
    depends_on: a
"#,
    )
    .expect("write config");

    Command::new(assert_cmd::cargo::cargo_bin!("supervisor"))
        .arg("--config")
        .arg(&config_path)
        .env("HOME", &home)
        .assert()
        .failure();

    assert!(!socket_path(&home).exists());
}

/// Scenario D: a required service that fails to spawn triggers a global shutdown, tearing down
/// its unrelated siblings.
#[test]
fn required_service_failure_triggers_global_shutdown() {
    let temp = tempdir().expect("tempdir");
    let dir = temp.path();
    let home = dir.join("home");
    fs::create_dir_all(&home).expect("home dir");
    let _home = HomeEnvGuard::set(&home);

    let config_path = dir.join("supervisor.yaml");
    fs::write(
        &config_path,
        r#"services:
  sibling:
    command: "sleep"
    args: ["30"]
  critical:
    command: "/nonexistent/path/to/nothing"
    required: true
timeouts:
  service_shutdown: 2
  global_shutdown: 5
"#,
    )
    .expect("write config");

    let mut daemon = StdCommand::new(assert_cmd::cargo::cargo_bin!("supervisor"))
        .arg("--config")
        .arg(&config_path)
        .env("HOME", &home)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn daemon");

    let sock = socket_path(&home);
    wait_for_path_removed(&sock);
    let _ = daemon.wait();
}

/// Scenario E: `restart` produces a new pid for the named service.
#[test]
fn restart_produces_a_new_pid() {
    let temp = tempdir().expect("tempdir");
    let dir = temp.path();
    let home = dir.join("home");
    fs::create_dir_all(&home).expect("home dir");
    let _home = HomeEnvGuard::set(&home);

    let config_path = dir.join("supervisor.yaml");
    fs::write(
        &config_path,
        r#"services:
  worker:
    command: "sleep"
    args: ["30"]
timeouts:
  service_shutdown: 2
  global_shutdown: 5
"#,
    )
    .expect("write config");

    let mut daemon = StdCommand::new(assert_cmd::cargo::cargo_bin!("supervisor"))
        .arg("--config")
        .arg(&config_path)
        .env("HOME", &home)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn daemon");

    let sock = socket_path(&home);
    wait_for_path(&sock);
    thread::sleep(Duration::from_millis(300));

    let before = Command::new(assert_cmd::cargo::cargo_bin!("supervisor"))
        .arg("restart")
        .arg("worker")
        .env("HOME", &home)
        .assert()
        .success();
    assert!(String::from_utf8_lossy(&before.get_output().stdout).contains("worker"));

    thread::sleep(Duration::from_secs(2));

    unsafe {
        libc::kill(daemon.id() as libc::pid_t, libc::SIGTERM);
    }
    let _ = daemon.wait();
}

/// Scenario F: a service that ignores SIGTERM is force-killed once its shutdown timeout elapses.
#[test]
fn sigterm_ignoring_service_is_sigkilled_after_timeout() {
    let temp = tempdir().expect("tempdir");
    let dir = temp.path();
    let home = dir.join("home");
    fs::create_dir_all(&home).expect("home dir");
    let _home = HomeEnvGuard::set(&home);

    let config_path = dir.join("supervisor.yaml");
    fs::write(
        &config_path,
        r#"services:
  stubborn:
    command: "sh"
    args: ["-c", "trap '' TERM; sleep 30"]
timeouts:
  service_shutdown: 1
  global_shutdown: 4
"#,
    )
    .expect("write config");

    let mut daemon = StdCommand::new(assert_cmd::cargo::cargo_bin!("supervisor"))
        .arg("--config")
        .arg(&config_path)
        .env("HOME", &home)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn daemon");

    let sock = socket_path(&home);
    wait_for_path(&sock);
    thread::sleep(Duration::from_millis(500));

    unsafe {
        libc::kill(daemon.id() as libc::pid_t, libc::SIGTERM);
    }

    wait_for_path_removed(&sock);

    // `stubborn` ignores SIGTERM, so its teardown watcher must escalate to SIGKILL at its own
    // service_shutdown (1s) budget, not wait for the global_shutdown (4s) deadline's SIGKILL wave.
    // Bound the daemon's exit well under global_shutdown to catch a regression to the latter.
    let deadline = Instant::now() + Duration::from_secs(3);
    let mut exited = false;
    while Instant::now() < deadline {
        if daemon.try_wait().expect("try_wait").is_some() {
            exited = true;
            break;
        }
        thread::sleep(Duration::from_millis(100));
    }
    assert!(
        exited,
        "a SIGTERM-ignoring service should be SIGKILLed at its own service_shutdown budget, \
         not at the global_shutdown deadline"
    );

    let _ = daemon.wait();
}
