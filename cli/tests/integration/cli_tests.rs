//! Integration tests for flotilla CLI argument parsing and error paths

#![allow(clippy::expect_used)]

use assert_cmd::Command;
use predicates::prelude::*;

fn flotilla() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("flotilla"));
    cmd.env("NO_COLOR", "1")
        .env("FLOTILLA_CONFIG", "/nonexistent/flotilla/config.yaml")
        .env_remove("FLOTILLA_APP")
        .env_remove("FLOTILLA_API_TOKEN")
        .env_remove("FLOTILLA_LOG");
    cmd
}

// --- Help and version tests ---

#[test]
fn test_cli_no_args_shows_help_and_exits_two() {
    flotilla().assert().code(2).stderr(predicate::str::contains(
        "Operate the machines behind your apps",
    ));
}

#[test]
fn test_cli_help_lists_commands() {
    flotilla()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("machine"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_command_shows_version() {
    flotilla()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("flotilla 0.1.0"));
}

#[test]
fn test_no_color_env_accepts_any_conventional_value() {
    for value in ["1", "yes", "true", "0"] {
        flotilla()
            .env("NO_COLOR", value)
            .arg("version")
            .assert()
            .success()
            .stdout(predicate::str::contains("flotilla 0.1.0"));
    }
}

#[test]
fn test_no_color_flag_still_works_without_env() {
    flotilla()
        .env_remove("NO_COLOR")
        .args(["--no-color", "version"])
        .assert()
        .success();
}

#[test]
fn test_version_command_json_outputs_valid_json() {
    let out = flotilla()
        .args(["--json", "version"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value: serde_json::Value = serde_json::from_slice(&out).expect("valid JSON");
    assert_eq!(value["version"], "0.1.0");
}

#[test]
fn test_machine_help_lists_subcommands() {
    flotilla()
        .args(["machine", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("update"))
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("status"));
}

// --- Run argument handling ---

#[test]
fn test_run_without_command_is_a_usage_error() {
    flotilla().arg("run").assert().code(2);
}

#[test]
fn test_run_rejects_machine_with_select() {
    flotilla()
        .args(["run", "--machine", "3d8d9e1b", "--select", "ls"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_run_rejects_invalid_machine_id() {
    flotilla()
        .args(["run", "--machine", "NOT-AN-ID", "ls"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid machine ID: NOT-AN-ID"));
}

#[test]
fn test_run_without_app_explains_how_to_pick_one() {
    flotilla()
        .args(["run", "--config", "/nonexistent/flotilla.yaml", "ls"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No app selected"));
}

#[test]
fn test_run_without_token_explains_how_to_set_one() {
    flotilla()
        .env("FLOTILLA_APP", "shop")
        .args(["run", "--config", "/nonexistent/flotilla.yaml", "ls"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No API token"));
}

// --- Machine update argument handling ---

#[test]
fn test_machine_update_requires_a_change() {
    flotilla()
        .env("FLOTILLA_APP", "shop")
        .env("FLOTILLA_API_TOKEN", "test-token")
        .args(["machine", "update", "3d8d9e1b"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing to update"));
}

#[test]
fn test_machine_update_rejects_bad_env_assignment() {
    flotilla()
        .env("FLOTILLA_APP", "shop")
        .env("FLOTILLA_API_TOKEN", "test-token")
        .args(["machine", "update", "3d8d9e1b", "--env", "NOVALUE"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected KEY=VALUE"));
}

#[test]
fn test_errors_are_json_objects_in_json_mode() {
    let out = flotilla()
        .args(["--json", "run", "--machine", "NOT-AN-ID", "ls"])
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();
    let value: serde_json::Value = serde_json::from_slice(&out).expect("valid JSON");
    assert_eq!(value["error"], true);
    assert_eq!(value["code"], "config_error");
}

// --- Error handling tests ---

#[test]
fn test_unknown_command_exits_with_error() {
    flotilla()
        .arg("nonexistent")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}
