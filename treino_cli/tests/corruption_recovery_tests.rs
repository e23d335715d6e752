//! Corruption recovery tests for the treino binary.
//!
//! These tests verify the system can handle:
//! - A corrupted or stale session slot
//! - Corrupted lines in the outbox and history
//! - Missing files

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::{self, OpenOptions};
use std::io::Write as IoWrite;
use std::path::Path;
use tempfile::TempDir;

fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

fn cli(data_dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("treino"));
    cmd.env("XDG_CONFIG_HOME", data_dir.join("config"))
        .arg("--data-dir")
        .arg(data_dir);
    cmd
}

#[test]
fn test_corrupted_session_slot() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    fs::write(data_dir.join("session.json"), "{ invalid json }}}}")
        .expect("Failed to write corrupted slot");

    cli(data_dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("No active workout."));

    cli(data_dir)
        .args(["start", "LEGS1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Started"));
    cli(data_dir)
        .args(["set", "l1_agachamento", "1", "100", "6"])
        .assert()
        .success();
}

#[test]
fn test_slot_for_unknown_workout() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    fs::write(
        data_dir.join("session.json"),
        r#"{"workout_id":"OLDPLAN","started_at":"2025-03-03T18:00:00Z","elapsed_seconds":0}"#,
    )
    .unwrap();

    cli(data_dir)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("UnknownWorkout"));

    // Starting a real workout replaces the stale slot
    cli(data_dir).args(["start", "PUSH2"]).assert().success();
    cli(data_dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("PUSH2"));
}

#[test]
fn test_recovered_session_keeps_sets_and_start_time() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    fs::write(
        data_dir.join("session.json"),
        r#"{"workout_id":"LEGS1","started_at":"2025-03-03T18:00:00Z","elapsed_seconds":600,
            "sets":{"l1_agachamento_0":{"weight":120.0,"reps":5,"done":true}},"rest_timer":null}"#,
    )
    .unwrap();

    cli(data_dir)
        .args(["start", "LEGS1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Resumed"))
        .stdout(predicate::str::contains("1. 120kg x 5"));

    cli(data_dir).arg("finish").assert().success();

    let history = fs::read_to_string(data_dir.join("history.jsonl")).unwrap();
    assert!(history.contains("\"started_at\":\"2025-03-03T18:00:00Z\""));
}

#[test]
fn test_rest_that_ran_out_while_away_is_dropped() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    fs::write(
        data_dir.join("session.json"),
        r#"{"workout_id":"LEGS1","started_at":"2025-03-03T18:00:00Z","elapsed_seconds":60,
            "sets":{"l1_agachamento_0":{"weight":120.0,"reps":5,"done":true}},
            "rest_timer":{"name":"Agachamento Livre (Barra)","total_seconds":150,
                          "ends_at":"2025-03-03T18:03:30Z"}}"#,
    )
    .unwrap();

    cli(data_dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("1. 120kg x 5"))
        .stdout(predicate::str::contains("Rest").not());

    let slot = fs::read_to_string(data_dir.join("session.json")).unwrap();
    assert!(slot.contains("\"rest_timer\":null"));

    cli(data_dir)
        .args(["rest", "--skip"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No rest running."));
}

#[test]
fn test_outbox_torn_tail_does_not_swallow_next_record() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    cli(data_dir).args(["start", "LEGS1"]).assert().success();
    cli(data_dir).args(["--offline", "finish"]).assert().success();

    let mut outbox = OpenOptions::new()
        .append(true)
        .open(data_dir.join("outbox.jsonl"))
        .unwrap();
    write!(outbox, "{{\"id\":\"trunc").unwrap();
    drop(outbox);

    cli(data_dir).args(["start", "PUSH1"]).assert().success();
    cli(data_dir).args(["--offline", "finish"]).assert().success();

    cli(data_dir)
        .arg("sync")
        .assert()
        .success()
        .stdout(predicate::str::contains("Synced 2 workouts"));
}

#[test]
fn test_corrupted_outbox_line_skipped() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    cli(data_dir).args(["start", "LEGS1"]).assert().success();
    cli(data_dir).args(["--offline", "finish"]).assert().success();

    let mut outbox = OpenOptions::new()
        .append(true)
        .open(data_dir.join("outbox.jsonl"))
        .unwrap();
    writeln!(outbox, "{{\"id\": truncated").unwrap();
    drop(outbox);

    cli(data_dir)
        .arg("sync")
        .assert()
        .success()
        .stdout(predicate::str::contains("Synced 1 workouts"));
}

#[test]
fn test_corrupted_history_line_skipped() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    cli(data_dir).args(["start", "PULL1"]).assert().success();
    cli(data_dir).arg("finish").assert().success();

    let mut history = OpenOptions::new()
        .append(true)
        .open(data_dir.join("history.jsonl"))
        .unwrap();
    writeln!(history, "not json at all").unwrap();
    drop(history);

    cli(data_dir)
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("PULL1"));
}

#[test]
fn test_invalid_config_rejected() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path();

    let config_dir = data_dir.join("config/treino");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join("config.toml"), "[session]\ncore_done_threshold = 0\n").unwrap();

    cli(data_dir)
        .arg("plans")
        .assert()
        .failure()
        .stderr(predicate::str::contains("core_done_threshold"));
}
