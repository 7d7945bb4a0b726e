// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    queued    = { EventKind::ItemQueued,          "item_queued" },
    started   = { EventKind::ItemStarted,         "item_started" },
    submitted = { EventKind::ItemSubmitted,       "item_submitted" },
    captcha   = { EventKind::CaptchaDetected,     "captcha_detected" },
    two_fa    = { EventKind::TwoFactorRequested,  "two_factor_requested" },
    rate      = { EventKind::RateLimitApplied,    "rate_limit_applied" },
    blocked   = { EventKind::DomainBlocked,       "domain_blocked" },
    crashed   = { EventKind::WorkerCrashed,       "worker_crashed" },
    resolved  = { EventKind::InterventionResolved, "intervention_resolved" },
    completed = { EventKind::SessionCompleted,    "session_completed" },
)]
fn kind_display_matches_wire_form(kind: EventKind, expected: &str) {
    assert_eq!(kind.to_string(), expected);
    // Display and serde agree on the string form.
    let json = serde_json::to_string(&kind).unwrap();
    assert_eq!(json, format!("\"{expected}\""));
}

#[test]
fn unknown_kind_string_is_rejected() {
    let parsed: Result<EventKind, _> = serde_json::from_str("\"item_exploded\"");
    assert!(parsed.is_err());
}

#[yare::parameterized(
    submitted    = { EventKind::ItemSubmitted,      true },
    failed       = { EventKind::ItemFailed,         true },
    skipped      = { EventKind::ItemSkipped,        true },
    cancelled    = { EventKind::SessionCancelled,   true },
    itv_timeout  = { EventKind::InterventionTimeout, true },
    started      = { EventKind::ItemStarted,        false },
    captcha      = { EventKind::CaptchaDetected,    false },
    rate         = { EventKind::RateLimitApplied,   false },
)]
fn item_terminal_set(kind: EventKind, expected: bool) {
    assert_eq!(kind.is_item_terminal(), expected);
}

#[test]
fn record_serde_round_trip() {
    let record = EventRecord::new(SessionId::from_string("ses-t"), EventKind::ItemStarted, 42)
        .application(ApplicationId::from_string("app-t"))
        .detail("worker wkr-1")
        .payload(serde_json::json!({"domain": "ats.company.com"}));

    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["type"], "item_started");
    assert_eq!(json["application"], "app-t");

    let restored: EventRecord = serde_json::from_value(json).unwrap();
    assert_eq!(restored, record);
}

#[test]
fn null_payload_is_omitted() {
    let record = EventRecord::new(SessionId::from_string("ses-t"), EventKind::ItemQueued, 1);
    let json = serde_json::to_value(&record).unwrap();
    assert!(json.get("payload").is_none());
    assert!(json.get("application").is_none());
}

#[test]
fn log_summary_includes_application_when_present() {
    let session = SessionId::from_string("ses-t");
    let bare = EventRecord::new(session, EventKind::SessionPaused, 1);
    assert_eq!(bare.log_summary(), "session_paused seq=0");

    let scoped = EventRecord::new(session, EventKind::ItemFailed, 1)
        .application(ApplicationId::from_string("app-9"));
    assert!(scoped.log_summary().contains("app=app-9"));
}
