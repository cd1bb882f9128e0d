#![allow(deprecated)] // TODO: cargo_bin → cargo_bin_cmd! へ移行

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("beebop-migrate").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("visualise"))
        .stdout(predicate::str::contains("cleanup-backups"))
        .stdout(predicate::str::contains("cleanup-redis"));
}

#[test]
fn test_invalid_command() {
    let mut cmd = Command::cargo_bin("beebop-migrate").unwrap();
    cmd.arg("invalid-command").assert().failure();
}

#[test]
fn test_folders_missing_output_dir() {
    let dir = TempDir::new().unwrap();
    let mut cmd = Command::cargo_bin("beebop-migrate").unwrap();
    cmd.arg("folders")
        .arg("--output-dir")
        .arg(dir.path().join("missing"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("出力ディレクトリが見つかりません"));
}

#[test]
fn test_folders_then_cleanup_backups() {
    let dir = TempDir::new().unwrap();
    let network = dir.path().join("run1/network");
    fs::create_dir_all(&network).unwrap();
    fs::write(network.join("network_component_2.graphml"), "").unwrap();

    Command::cargo_bin("beebop-migrate")
        .unwrap()
        .args(["folders", "--output-dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("バックアップ作成:       1"));
    assert!(dir.path().join("run1_backup").exists());

    Command::cargo_bin("beebop-migrate")
        .unwrap()
        .args(["cleanup-backups", "--output-dir"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("削除しました"));
    assert!(!dir.path().join("run1_backup").exists());
    assert!(dir.path().join("run1/network/pruned_network_component_2.graphml").exists());
}
