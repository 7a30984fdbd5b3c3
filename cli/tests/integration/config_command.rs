//! Integration tests for `flotilla config`

#![allow(clippy::expect_used)]

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

fn flotilla(config: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("flotilla"));
    cmd.env("NO_COLOR", "1")
        .env("FLOTILLA_CONFIG", config)
        .env_remove("FLOTILLA_API_TOKEN");
    cmd
}

#[test]
fn test_config_path_honours_env_override() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.yaml");
    flotilla(&path)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(path.display().to_string()));
}

#[test]
fn test_config_show_defaults_without_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    flotilla(&dir.path().join("config.yaml"))
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("https://api.machines.dev"))
        .stdout(predicate::str::contains("(not set)"));
}

#[test]
fn test_config_set_persists_value() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.yaml");
    flotilla(&path)
        .args(["config", "set", "defaults.app", "shop"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Set defaults.app = shop"));

    let out = flotilla(&path)
        .args(["--json", "config", "show"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: serde_json::Value = serde_json::from_slice(&out).expect("valid JSON");
    assert_eq!(value["config"]["defaults"]["app"], "shop");
}

#[test]
fn test_config_set_never_persists_env_token() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.yaml");
    flotilla(&path)
        .env("FLOTILLA_API_TOKEN", "secret-from-env")
        .args(["config", "set", "defaults.ssh_user", "deploy"])
        .assert()
        .success();
    let written = std::fs::read_to_string(&path).expect("config written");
    assert!(written.contains("deploy"));
    assert!(!written.contains("secret-from-env"));
}

#[test]
fn test_config_show_redacts_token() {
    let dir = tempfile::tempdir().expect("tempdir");
    flotilla(&dir.path().join("config.yaml"))
        .env("FLOTILLA_API_TOKEN", "secret-from-env")
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("<redacted>"))
        .stdout(predicate::str::contains("secret-from-env").not());
}

#[test]
fn test_config_set_rejects_unknown_key() {
    let dir = tempfile::tempdir().expect("tempdir");
    flotilla(&dir.path().join("config.yaml"))
        .args(["config", "set", "security.level", "strict"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown setting: security.level"));
}

#[test]
fn test_config_set_rejects_zero_timeout() {
    let dir = tempfile::tempdir().expect("tempdir");
    flotilla(&dir.path().join("config.yaml"))
        .args(["config", "set", "timeouts.start_wait_secs", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid value for timeouts.start_wait_secs"));
}
