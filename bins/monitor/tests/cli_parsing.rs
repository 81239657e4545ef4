//! CLI argument parsing tests for xfrm-monitor.
//!
//! These tests verify that command-line arguments are correctly parsed
//! without requiring network access or root privileges.

use assert_cmd::Command;
use predicates::prelude::*;

fn monitor_cmd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_xfrm-monitor"))
}

#[test]
fn test_help() {
    monitor_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Watch kernel IPsec (XFRM) events"));
}

#[test]
fn test_help_lists_group_flags() {
    monitor_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--sa"))
        .stdout(predicate::str::contains("--policy"))
        .stdout(predicate::str::contains("--acquire"))
        .stdout(predicate::str::contains("--expire"))
        .stdout(predicate::str::contains("--report"));
}

#[test]
fn test_help_lists_output_flags() {
    monitor_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--json"))
        .stdout(predicate::str::contains("--pretty"))
        .stdout(predicate::str::contains("--timestamp"))
        .stdout(predicate::str::contains("--hide-keys"));
}

#[test]
fn test_version() {
    monitor_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("xfrm-monitor"));
}

#[test]
fn test_unknown_flag_fails() {
    monitor_cmd()
        .arg("--no-such-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_unexpected_positional_fails() {
    monitor_cmd()
        .arg("extra")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}
