//! Integration tests for the tollgate CLI.
//!
//! These run the built binary against a policy file in a temporary
//! directory and check its exit statuses and output.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

fn tollgate(dir: &TempDir, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tollgate"))
        .arg("--config")
        .arg(dir.path().join("policy.json"))
        .args(args)
        .env_remove("TOLLGATE_CONFIG")
        .output()
        .expect("failed to run tollgate")
}

fn records(output: &Output) -> Vec<Value> {
    serde_json::Deserializer::from_slice(&output.stdout)
        .into_iter::<Value>()
        .collect::<Result<_, _>>()
        .expect("decision records on stdout")
}

#[test]
fn test_allowed_application_exits_zero() {
    let dir = TempDir::new().unwrap();
    let output = tollgate(
        &dir,
        &["check", "run_application", "--details", r#"{"application": "Safari"}"#],
    );

    assert_eq!(output.status.code(), Some(0));
    let records = records(&output);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["allowed"], true);
}

#[test]
fn test_forbidden_application_exits_two() {
    let dir = TempDir::new().unwrap();
    let output = tollgate(
        &dir,
        &["check", "run_application", "--details", r#"{"application": "Terminal"}"#],
    );

    assert_eq!(output.status.code(), Some(2));
    let records = records(&output);
    assert_eq!(records[0]["allowed"], false);
    assert_eq!(records[0]["code"], "application_forbidden");
}

#[test]
fn test_exhausted_ceiling_exits_three() {
    let dir = TempDir::new().unwrap();
    let output = tollgate(
        &dir,
        &[
            "check",
            "run_application",
            "--ceiling",
            "1",
            "--details",
            r#"{"application": "Safari"}"#,
            "--details",
            r#"{"application": "Notes"}"#,
        ],
    );

    assert_eq!(output.status.code(), Some(3));
    assert_eq!(records(&output).len(), 1);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Rate limit exceeded for run_application (1 per day)"));
}

#[test]
fn test_zero_ceiling_rate_limits_first_request() {
    let dir = TempDir::new().unwrap();
    let output = tollgate(
        &dir,
        &["check", "execute_script", "--ceiling", "0", "--details", r#"{"script": "ls"}"#],
    );

    assert_eq!(output.status.code(), Some(3));
    assert!(records(&output).is_empty());
}

#[test]
fn test_session_history_spans_repeated_details() {
    let dir = TempDir::new().unwrap();
    let email = r#"{"to": "a@x.com", "subject": "hi", "body": "hey"}"#;
    let output = tollgate(
        &dir,
        &["check", "send_email", "--details", email, "--details", email],
    );

    assert_eq!(output.status.code(), Some(0));
    let records = records(&output);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["requiresConfirmation"], true);
    assert!(records[1].get("requiresConfirmation").is_none());
}

#[test]
fn test_any_denial_in_a_batch_exits_two() {
    let dir = TempDir::new().unwrap();
    let output = tollgate(
        &dir,
        &[
            "check",
            "file_operation",
            "--details",
            r#"{"path": "/tmp/notes.txt"}"#,
            "--details",
            r#"{"path": "/System/Library/x"}"#,
        ],
    );

    assert_eq!(output.status.code(), Some(2));
    let records = records(&output);
    assert_eq!(records.len(), 2);
    assert_eq!(records[1]["code"], "path_forbidden");
}

#[test]
fn test_invalid_details_is_an_error() {
    let dir = TempDir::new().unwrap();
    let output = tollgate(&dir, &["check", "run_application", "--details", "{nope"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("--details must be valid JSON"));
}

#[test]
fn test_blacklist_persists_between_runs() {
    let dir = TempDir::new().unwrap();

    let added = tollgate(&dir, &["blacklist", "add", "spam@x.com"]);
    assert_eq!(added.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&added.stdout).contains("added spam@x.com to blacklist"));

    let output = tollgate(
        &dir,
        &["check", "send_email", "--details", r#"{"to": "spam@x.com"}"#],
    );
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(records(&output)[0]["code"], "blacklisted");

    let shown = tollgate(&dir, &["config", "show"]);
    let policy: Value = serde_json::from_slice(&shown.stdout).unwrap();
    assert_eq!(policy["blacklist"], serde_json::json!(["spam@x.com"]));
}

#[test]
fn test_config_path_and_init() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("policy.json");

    let shown = tollgate(&dir, &["config", "path"]);
    assert_eq!(
        String::from_utf8_lossy(&shown.stdout).trim(),
        path.display().to_string()
    );
    assert!(!path.exists());

    let init = tollgate(&dir, &["config", "init"]);
    assert_eq!(init.status.code(), Some(0));
    let policy: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(policy["permissions"]["email"]["maxPerDay"], 10);
}
