// ABOUTME: Integration tests for the slotctl CLI commands.
// ABOUTME: Validates --help output, init behavior, and config errors before any connection.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

fn slotctl_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("slotctl"))
}

#[test]
fn help_shows_commands() {
    slotctl_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("rollback"))
        .stdout(predicate::str::contains("health"))
        .stdout(predicate::str::contains("backup"));
}

#[test]
fn init_creates_config_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("slotctl.yml");

    slotctl_cmd()
        .current_dir(temp_dir.path())
        .args(["init", "--service", "shop", "--image", "ghcr.io/acme/shop"])
        .assert()
        .success();

    assert!(config_path.exists(), "slotctl.yml should be created");
    let content = fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("image: ghcr.io/acme/shop"));
    assert!(content.contains("slot_name: shop-prod"));
}

#[test]
fn init_refuses_to_overwrite_existing_config() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("slotctl.yml");

    fs::write(&config_path, "existing: config").unwrap();

    slotctl_cmd()
        .current_dir(temp_dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    assert_eq!(fs::read_to_string(&config_path).unwrap(), "existing: config");
}

#[test]
fn init_force_overwrites() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("slotctl.yml");
    fs::write(&config_path, "existing: config").unwrap();

    slotctl_cmd()
        .current_dir(temp_dir.path())
        .args(["init", "--force"])
        .assert()
        .success();

    assert!(fs::read_to_string(&config_path).unwrap().contains("environments:"));
}

#[test]
fn deploy_without_config_fails() {
    let temp_dir = tempfile::tempdir().unwrap();

    slotctl_cmd()
        .current_dir(temp_dir.path())
        .args(["deploy", "production", "v2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn explicit_missing_config_path_fails() {
    let temp_dir = tempfile::tempdir().unwrap();

    slotctl_cmd()
        .current_dir(temp_dir.path())
        .args(["--config", "nowhere.yml", "health", "production"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nowhere.yml"));
}

#[test]
fn unknown_environment_fails_before_connecting() {
    let temp_dir = tempfile::tempdir().unwrap();
    slotctl_cmd()
        .current_dir(temp_dir.path())
        .arg("init")
        .assert()
        .success();

    slotctl_cmd()
        .current_dir(temp_dir.path())
        .args(["rollback", "staging"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown environment: staging"));
}

#[test]
fn json_mode_reports_errors_as_events() {
    let temp_dir = tempfile::tempdir().unwrap();

    let output = slotctl_cmd()
        .current_dir(temp_dir.path())
        .args(["--json", "deploy", "production", "v2"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    let line = stderr.lines().last().unwrap();
    let event: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(event["event"], "error");
}

#[test]
fn conflicting_backup_flags_are_rejected() {
    slotctl_cmd()
        .args(["backup", "production", "--list", "--prune"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}
