// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::application::{ApplicationItem, Effort, Signals};
use crate::id::SessionId;

// ── Proptest strategies ─────────────────────────────────────────────────

/// Proptest strategies for core state machine types.
pub mod strategies {
    use crate::application::{ApplicationStatus, Effort};
    use crate::session::SessionStatus;
    use proptest::prelude::*;

    pub fn arb_application_status() -> impl Strategy<Value = ApplicationStatus> {
        prop_oneof![
            Just(ApplicationStatus::Queued),
            Just(ApplicationStatus::InProgress),
            Just(ApplicationStatus::Submitted),
            Just(ApplicationStatus::Failed),
            Just(ApplicationStatus::Paused),
            Just(ApplicationStatus::Skipped),
            Just(ApplicationStatus::Cancelled),
        ]
    }

    pub fn arb_session_status() -> impl Strategy<Value = SessionStatus> {
        prop_oneof![
            Just(SessionStatus::Planned),
            Just(SessionStatus::Running),
            Just(SessionStatus::Paused),
            Just(SessionStatus::Draining),
            Just(SessionStatus::Cancelling),
            Just(SessionStatus::Failing),
            Just(SessionStatus::Completed),
            Just(SessionStatus::Failed),
            Just(SessionStatus::Cancelled),
        ]
    }

    pub fn arb_effort() -> impl Strategy<Value = Effort> {
        prop_oneof![Just(Effort::Low), Just(Effort::Medium), Just(Effort::High)]
    }
}

// ── Item factory functions ──────────────────────────────────────────────

/// A queued item on the given domain with the given score.
pub fn queued_item(session: SessionId, domain: &str, match_score: f64) -> ApplicationItem {
    ApplicationItem::new(
        session,
        "user-1",
        format!("https://{domain}/jobs/1"),
        domain,
        Signals { hint_effort: Effort::Medium, match_score, company_tier: String::new() },
        1_000_000,
    )
}
