// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only event vocabulary and the persisted event record.

use crate::id::{ApplicationId, SessionId};
use serde::{Deserialize, Serialize};

/// Closed vocabulary of event types.
///
/// The string form (serde snake_case) is the wire/storage representation;
/// consumers must treat unknown strings as a schema error, not extend the
/// set ad hoc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    // -- item lifecycle --
    ItemQueued,
    ItemStarted,
    ItemSubmitted,
    ItemFailed,
    ItemSkipped,
    // -- stealth / human-in-the-loop --
    CaptchaDetected,
    CaptchaSolved,
    CaptchaFailed,
    TwoFactorRequested,
    TwoFactorSupplied,
    InterventionRequested,
    InterventionResolved,
    InterventionTimeout,
    // -- rate control --
    RateLimitApplied,
    DomainBlocked,
    // -- workers --
    WorkerCrashed,
    // -- session lifecycle --
    SessionPaused,
    SessionResumed,
    SessionCompleted,
    SessionFailed,
    SessionCancelled,
}

crate::simple_display! {
    EventKind {
        ItemQueued => "item_queued",
        ItemStarted => "item_started",
        ItemSubmitted => "item_submitted",
        ItemFailed => "item_failed",
        ItemSkipped => "item_skipped",
        CaptchaDetected => "captcha_detected",
        CaptchaSolved => "captcha_solved",
        CaptchaFailed => "captcha_failed",
        TwoFactorRequested => "two_factor_requested",
        TwoFactorSupplied => "two_factor_supplied",
        InterventionRequested => "intervention_requested",
        InterventionResolved => "intervention_resolved",
        InterventionTimeout => "intervention_timeout",
        RateLimitApplied => "rate_limit_applied",
        DomainBlocked => "domain_blocked",
        WorkerCrashed => "worker_crashed",
        SessionPaused => "session_paused",
        SessionResumed => "session_resumed",
        SessionCompleted => "session_completed",
        SessionFailed => "session_failed",
        SessionCancelled => "session_cancelled",
    }
}

impl EventKind {
    /// Terminal per-application events: exactly one closes each item's log.
    pub fn is_item_terminal(&self) -> bool {
        matches!(
            self,
            EventKind::ItemSubmitted
                | EventKind::ItemFailed
                | EventKind::ItemSkipped
                | EventKind::SessionCancelled
                | EventKind::InterventionTimeout
        )
    }
}

/// One persisted log record.
///
/// Records are never updated or deleted. `seq` is assigned by the event
/// log (not the caller) and is strictly increasing within a session; ties
/// at identical timestamps are broken by `seq`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub session: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<ApplicationId>,
    /// Session-scoped sequence number assigned on append
    pub seq: u64,
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
    pub at_epoch_ms: u64,
}

impl EventRecord {
    /// Build an unsequenced record; the event log assigns `seq` on append.
    pub fn new(session: SessionId, kind: EventKind, at_epoch_ms: u64) -> Self {
        Self {
            session,
            application: None,
            seq: 0,
            kind,
            detail: None,
            payload: serde_json::Value::Null,
            at_epoch_ms,
        }
    }

    /// Scope the record to one application.
    pub fn application(mut self, application: ApplicationId) -> Self {
        self.application = Some(application);
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Compact single-line summary for tracing output.
    pub fn log_summary(&self) -> String {
        match self.application {
            Some(app) => format!("{} app={} seq={}", self.kind, app, self.seq),
            None => format!("{} seq={}", self.kind, self.seq),
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
