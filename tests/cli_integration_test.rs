//! CLI integration tests for the spikeline binary.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_config_path_prints_toml_path() {
    let mut cmd = Command::cargo_bin("spikeline").unwrap();
    cmd.arg("config")
        .arg("path")
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_cache_path_prints_directory() {
    let mut cmd = Command::cargo_bin("spikeline").unwrap();
    cmd.arg("cache")
        .arg("path")
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_info_unknown_file_fails() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("mystery.dat");
    std::fs::write(&path, b"not a recording").unwrap();

    let mut cmd = Command::cargo_bin("spikeline").unwrap();
    cmd.arg("info")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported format"));
}

#[test]
fn test_run_unknown_sorter_fails() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("rec.json");
    std::fs::write(&path, b"{}").unwrap();

    let mut cmd = Command::cargo_bin("spikeline").unwrap();
    cmd.arg("run")
        .arg("--sorter")
        .arg("no-such-sorter")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown adapter"));
}

#[test]
fn test_help_lists_subcommands() {
    let mut cmd = Command::cargo_bin("spikeline").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("waveforms"))
        .stdout(predicate::str::contains("sorters"));
}
