#[path = "common/mod.rs"]
mod common;

use std::fs;

use assert_cmd::Command;
use common::HomeEnvGuard;
use tempfile::tempdir;

#[test]
fn rejects_config_with_unknown_dependency() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let home = dir.join("home");
    fs::create_dir_all(&home).expect("failed to create home dir");
    let _home = HomeEnvGuard::set(&home);

    let config_path = dir.join("supervisor.yaml");
    fs::write(
        &config_path,
        r#"services:
  web:
    command: "sleep 1"
    depends_on: db
"#,
    )
    .expect("failed to write config");

    Command::new(assert_cmd::cargo::cargo_bin!("supervisor"))
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .assert()
        .failure();
}

#[test]
fn rejects_circular_dependency() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let home = dir.join("home");
    fs::create_dir_all(&home).expect("failed to create home dir");
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
    .expect("failed to write config");

    let output = Command::new(assert_cmd::cargo::cargo_bin!("supervisor"))
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .output()
        .expect("failed to invoke supervisor");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.to_lowercase().contains("cycle"),
        "stderr should mention the dependency cycle: {stderr}"
    );
}

#[test]
fn list_fails_gracefully_with_no_running_daemon() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let home = dir.join("home");
    fs::create_dir_all(&home).expect("failed to create home dir");
    let _home = HomeEnvGuard::set(&home);

    Command::new(assert_cmd::cargo::cargo_bin!("supervisor"))
        .arg("list")
        .assert()
        .failure();
}

#[test]
fn install_symlinks_current_binary() {
    let temp = tempdir().expect("failed to create tempdir");
    let dir = temp.path();
    let home = dir.join("home");
    fs::create_dir_all(&home).expect("failed to create home dir");
    let _home = HomeEnvGuard::set(&home);

    let install_dir = dir.join("bin");
    fs::create_dir_all(&install_dir).expect("failed to create install dir");

    Command::new(assert_cmd::cargo::cargo_bin!("supervisor"))
        .arg("install")
        .arg(install_dir.to_str().unwrap())
        .assert()
        .success();

    let linked = install_dir.join("supervisor");
    assert!(linked.exists(), "expected symlink at {linked:?}");
}
