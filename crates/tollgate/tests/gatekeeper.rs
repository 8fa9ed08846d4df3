//! End-to-end behavior of the gatekeeper through its public API.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;
use std::sync::Arc;

use chrono::{TimeDelta, TimeZone, Utc};
use serde_json::{Value, json};
use tollgate::{
    AuditFilter, AuditTrail, CategoryConfig, Clock, Decision, Denial, FileSystemPermissions,
    GateError, Gatekeeper, JsonFileBackend, ManualClock, PolicyConfig, PolicyStore, RateCeilings,
};

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 4, 20, 12, 0, 0).unwrap(),
    ))
}

fn gate_with(clock: Arc<ManualClock>) -> Gatekeeper {
    Gatekeeper::builder(PolicyStore::in_memory())
        .clock(clock)
        .build()
}

fn email(to: &str) -> Value {
    json!({"to": to, "subject": "hi", "body": "hey"})
}

#[test]
fn first_email_needs_confirmation_then_not() {
    let gate = gate_with(clock());

    let first = gate.check_permission("send_email", email("a@x.com")).unwrap();
    assert!(first.is_allowed());
    assert!(first.requires_confirmation());
    assert!(first.message().unwrap().contains("a@x.com"));

    let second = gate.check_permission("send_email", email("a@x.com")).unwrap();
    assert_eq!(second, Decision::Allow);

    // A different recipient is new again
    let other = gate.check_permission("send_email", email("b@x.com")).unwrap();
    assert!(other.requires_confirmation());
}

#[test]
fn confirmation_history_ignores_denied_attempts() {
    let gate = Gatekeeper::builder(PolicyStore::in_memory())
        .clock(clock())
        .ceilings(RateCeilings::default().with_limit("send_email", 1))
        .build();

    gate.check_permission("send_email", email("a@x.com")).unwrap();
    let limited = gate.check_permission("send_email", email("a@x.com"));
    assert!(matches!(limited, Err(GateError::RateLimitExceeded { .. })));

    let approvals = gate.audit_log(&AuditFilter::all().action("send_email").allowed(true));
    assert_eq!(approvals.len(), 1);
}

#[test]
fn eleventh_email_is_rate_limited_until_the_next_day() {
    let clock = clock();
    let gate = gate_with(clock.clone());

    for i in 0..10 {
        let decision = gate
            .check_permission("send_email", email(&format!("user{i}@x.com")))
            .unwrap();
        assert!(decision.is_allowed());
    }

    let eleventh = gate.check_permission("send_email", email("late@x.com"));
    assert_eq!(
        eleventh,
        Err(GateError::RateLimitExceeded {
            action: "send_email".into(),
            limit: 10,
        })
    );

    clock.advance(TimeDelta::days(1));
    let next_day = gate.check_permission("send_email", email("late@x.com"));
    assert!(next_day.unwrap().is_allowed());
}

#[test]
fn ceiling_applies_to_policy_denials_too() {
    let gate = gate_with(clock());

    for _ in 0..30 {
        let decision = gate
            .check_permission("execute_script", json!({"script": "sudo ls"}))
            .unwrap();
        assert_eq!(decision, Decision::Deny(Denial::DangerousScript));
    }
    assert!(matches!(
        gate.check_permission("execute_script", json!({"script": "echo hi"})),
        Err(GateError::RateLimitExceeded { limit: 30, .. })
    ));
}

#[test]
fn unknown_kinds_use_default_ceiling() {
    let gate = gate_with(clock());
    for _ in 0..50 {
        let decision = gate.check_permission("take_screenshot", json!({})).unwrap();
        assert!(decision.requires_confirmation());
    }
    assert!(gate.check_permission("take_screenshot", json!({})).is_err());
}

#[test]
fn audit_trail_has_one_entry_per_call() {
    let gate = Gatekeeper::builder(PolicyStore::in_memory())
        .clock(clock())
        .ceilings(RateCeilings::default().with_limit("run_application", 2))
        .build();

    let calls = [
        ("run_application", json!({"application": "Safari"})),
        ("run_application", json!({"application": "Terminal"})),
        ("run_application", json!({"application": "Notes"})),
        ("execute_script", json!({"script": "rm -rf /"})),
        ("file_operation", json!({"nopath": true})),
    ];
    for (kind, details) in calls.iter().cloned() {
        let _ = gate.check_permission(kind, details);
    }

    let entries = gate.audit_log(&AuditFilter::all());
    assert_eq!(entries.len(), calls.len());
    assert_eq!(gate.audit().len(), calls.len());
    assert!(entries.iter().all(|e| e.allowed.is_some()));
    assert_eq!(
        entries.iter().map(|e| e.allowed).collect::<Vec<_>>(),
        vec![Some(true), Some(false), Some(false), Some(false), Some(false)]
    );
}

#[tokio::test]
async fn blacklist_wins_over_whitelist() {
    let gate = gate_with(clock());
    gate.add_to_whitelist("a@x.com").await.unwrap();
    gate.add_to_blacklist("a@x.com").await.unwrap();

    let decision = gate.check_permission("send_email", email("a@x.com")).unwrap();
    assert_eq!(decision, Decision::Deny(Denial::Blacklisted("a@x.com".into())));
}

#[tokio::test]
async fn forbidden_path_wins_over_allowed_path() {
    let gate = gate_with(clock());
    let mut fs = FileSystemPermissions::with_home(Path::new("/Users/u"));
    fs.allowed_paths.push("/Users/u".into());
    gate.store()
        .set_permissions(CategoryConfig::FileSystem(fs))
        .await
        .unwrap();

    let decision = gate
        .check_permission("file_operation", json!({"path": "/Users/u/.ssh/id_rsa"}))
        .unwrap();
    let denial = decision.denial().expect("should be denied");
    assert_eq!(denial, &Denial::PathForbidden("/Users/u/.ssh/id_rsa".into()));
    assert!(denial.to_string().contains("forbidden"));
}

#[test]
fn dangerous_script_is_denied_with_reason() {
    let gate = gate_with(clock());
    let decision = gate
        .check_permission("execute_script", json!({"script": "rm -rf /"}))
        .unwrap();
    let record = decision.to_record();
    assert!(!record.allowed);
    assert!(record.reason.unwrap().contains("dangerous commands"));
}

#[test]
fn audit_filter_by_time() {
    let clock = clock();
    let gate = gate_with(clock.clone());

    gate.check_permission("run_application", json!({"application": "Safari"}))
        .unwrap();
    clock.advance(TimeDelta::hours(2));
    let cutoff = clock.now();
    gate.check_permission("run_application", json!({"application": "Mail"}))
        .unwrap();

    let recent = gate.audit_log(&AuditFilter::all().since(cutoff));
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].details["application"], "Mail");
}

#[tokio::test]
async fn policy_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("policy.json");

    let gate = Gatekeeper::new(PolicyStore::load(JsonFileBackend::new(&path)).await);
    gate.add_to_whitelist("boss@x.com").await.unwrap();
    gate.add_to_blacklist("ex@y.com").await.unwrap();
    let before = gate.store().snapshot();

    let restarted = Gatekeeper::new(PolicyStore::load(JsonFileBackend::new(&path)).await);
    assert_eq!(restarted.store().snapshot(), before);

    let decision = restarted
        .check_permission("send_email", email("ex@y.com"))
        .unwrap();
    assert_eq!(decision.denial().map(Denial::code), Some("blacklisted"));

    let decision = restarted
        .check_permission("send_email", email("someone@x.com"))
        .unwrap();
    assert_eq!(decision.denial().map(Denial::code), Some("not_whitelisted"));
}

#[tokio::test]
async fn corrupt_policy_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("policy.json");
    std::fs::write(&path, "whitelist: nope").unwrap();

    let store = PolicyStore::load(JsonFileBackend::new(&path)).await;
    assert_eq!(store.snapshot(), PolicyConfig::default());
}

#[test]
fn concurrent_checks_respect_ceiling_and_audit_every_call() {
    let gate = Arc::new(gate_with(clock()));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let gate = Arc::clone(&gate);
            std::thread::spawn(move || {
                (0..40)
                    .filter(|_| {
                        gate.check_permission("execute_script", json!({"script": "echo hi"}))
                            .is_ok()
                    })
                    .count()
            })
        })
        .collect();

    let accepted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(accepted, 30);
    assert_eq!(gate.audit_log(&AuditFilter::all()).len(), 160);
    assert_eq!(
        gate.audit_log(&AuditFilter::all().allowed(false)).len(),
        130
    );
}
