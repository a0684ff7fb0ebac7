//! CLI end-to-end tests
//!
//! Tests for the fragforge command-line interface.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the fragforge binary
#[allow(deprecated)]
fn fragforge_cmd() -> Command {
    Command::cargo_bin("fragforge").unwrap()
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = fragforge_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help_flag() {
    let mut cmd = fragforge_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("fragforge"))
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version_command() {
    let mut cmd = fragforge_cmd();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("fragforge"));
}

#[test]
fn test_cli_transcode_help() {
    let mut cmd = fragforge_cmd();
    cmd.args(["transcode", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("segment"));
}

#[test]
fn test_cli_validate_accepts_good_config() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fragforge.toml");
    std::fs::write(
        &path,
        "[segment]\nframes = 250\n",
    )
    .unwrap();

    let mut cmd = fragforge_cmd();
    cmd.args(["validate", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration OK"));
}

#[test]
fn test_cli_validate_rejects_bad_codec() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fragforge.toml");
    std::fs::write(&path, "[video]\ncodec = \"cinepak\"\n").unwrap();

    let mut cmd = fragforge_cmd();
    cmd.args(["validate", path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cinepak"));
}

#[test]
fn test_cli_probe_missing_file_fails() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("absent.mp4");

    let mut cmd = fragforge_cmd();
    cmd.args(["probe", missing.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to open"));
}
