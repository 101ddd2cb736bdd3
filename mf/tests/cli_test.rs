//! Tests for the `mf` binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn mf(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("mf").unwrap();
    cmd.env("HOME", home.path()).env("XDG_DATA_HOME", home.path().join("data"));
    cmd
}

fn config_with_runs_dir(temp: &TempDir) -> std::path::PathBuf {
    let runs_dir = temp.path().join("runs");
    let config = temp.path().join("modelflow.yml");
    fs::write(&config, format!("runs-dir: {}\n", runs_dir.display())).unwrap();
    config
}

#[test]
fn test_stages_lists_all_three() {
    let home = TempDir::new().unwrap();
    mf(&home)
        .arg("stages")
        .assert()
        .success()
        .stdout(predicate::str::contains("ucd"))
        .stdout(predicate::str::contains("Scenarios and Activities"))
        .stdout(predicate::str::contains("adm"));
}

#[test]
fn test_help_shows_stages_and_log_path() {
    let home = TempDir::new().unwrap();
    mf(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Stages:"))
        .stdout(predicate::str::contains("Logs are written to"));
}

#[test]
fn test_run_rejects_unknown_stage() {
    let home = TempDir::new().unwrap();
    mf(&home)
        .args(["run", "Describe a library", "--start", "xyz"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("xyz"));
}

#[test]
fn test_run_rejects_reversed_stage_range() {
    let home = TempDir::new().unwrap();
    mf(&home)
        .args(["run", "Describe a library", "--start", "adm", "--end", "ucd"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("comes before"));
}

#[test]
fn test_runs_with_empty_runs_dir() {
    let home = TempDir::new().unwrap();
    let config = config_with_runs_dir(&home);
    mf(&home)
        .arg("--config")
        .arg(&config)
        .arg("runs")
        .assert()
        .success()
        .stdout(predicate::str::contains("No runs recorded"));
}

#[test]
fn test_trace_unknown_run_fails() {
    let home = TempDir::new().unwrap();
    let config = config_with_runs_dir(&home);
    mf(&home)
        .arg("--config")
        .arg(&config)
        .args(["trace", "no-such-run"])
        .assert()
        .failure();
}
