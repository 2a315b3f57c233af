//! End-to-end smoke tests for the octojules binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("octojules").unwrap();
    // Isolate from the developer's environment and any .env file.
    cmd.env_clear();
    cmd
}

#[test]
fn help_lists_subcommands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("pause"))
        .stdout(predicate::str::contains("resume"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn run_without_target_repo_fails_fast() {
    let dir = TempDir::new().unwrap();
    cmd()
        .current_dir(dir.path())
        .args(["run", "--once"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("TARGET_REPO"));
}

#[test]
fn run_with_malformed_repo_fails_fast() {
    let dir = TempDir::new().unwrap();
    cmd()
        .current_dir(dir.path())
        .args(["--repo", "not-a-repo", "run", "--once"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("owner/repo"));
}

#[test]
fn add_without_token_fails_fast() {
    let dir = TempDir::new().unwrap();
    cmd()
        .current_dir(dir.path())
        .args(["--repo", "octo/widgets", "add", "Fix the flaky retry"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("GITHUB_TOKEN"));
}

#[test]
fn fresh_database_reports_paused() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("sessions.db");
    cmd()
        .args(["--db", db.to_str().unwrap(), "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("paused: true"))
        .stdout(predicate::str::contains("no sessions recorded yet"));
}

#[test]
fn pause_and_resume_round_trip() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("sessions.db");
    let db = db.to_str().unwrap();

    cmd()
        .args(["--db", db, "resume"])
        .assert()
        .success()
        .stdout(predicate::str::contains("resumed"));
    cmd()
        .args(["--db", db, "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("paused: false"));

    cmd()
        .args(["--db", db, "pause"])
        .assert()
        .success()
        .stdout(predicate::str::contains("paused"));
    cmd()
        .args(["--db", db, "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("paused: true"));
}
