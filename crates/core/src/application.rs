// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Application item: one attempt at one job posting, and its state machine.

use crate::id::{ApplicationId, SessionId};
use serde::{Deserialize, Serialize};

/// Coarse effort level controlling which sub-steps the executor performs.
///
/// Ordered: `Low < Medium < High`. Policy upgrades move right, downgrades
/// move left.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Effort {
    #[default]
    Low,
    Medium,
    High,
}

crate::simple_display! {
    Effort {
        Low => "low",
        Medium => "medium",
        High => "high",
    }
}

/// Status of an application item.
///
/// Transitions are monotonic except for the explicit `Paused` ↔ `InProgress`
/// pair used by human interventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    /// Waiting in the session queue
    Queued,
    /// Held by exactly one worker
    InProgress,
    /// Form submitted successfully (terminal)
    Submitted,
    /// Terminal failure with a reason code
    Failed,
    /// Waiting on a human intervention
    Paused,
    /// Skipped before any work started (terminal)
    Skipped,
    /// Cancelled with the session (terminal)
    Cancelled,
}

crate::simple_display! {
    ApplicationStatus {
        Queued => "queued",
        InProgress => "in_progress",
        Submitted => "submitted",
        Failed => "failed",
        Paused => "paused",
        Skipped => "skipped",
        Cancelled => "cancelled",
    }
}

impl ApplicationStatus {
    /// Check if this status is terminal (no further transitions).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ApplicationStatus::Submitted
                | ApplicationStatus::Failed
                | ApplicationStatus::Skipped
                | ApplicationStatus::Cancelled
        )
    }

    /// Legal state machine for application items.
    ///
    /// `Queued → InProgress | Skipped | Failed | Cancelled`,
    /// `InProgress → Submitted | Failed | Paused | Cancelled`,
    /// `Paused → InProgress | Failed | Skipped | Cancelled`.
    /// Terminal statuses accept nothing. Failing straight from the queue
    /// covers items no worker could ever take.
    pub fn can_transition_to(&self, next: ApplicationStatus) -> bool {
        use ApplicationStatus::*;
        match self {
            Queued => matches!(next, InProgress | Skipped | Failed | Cancelled),
            InProgress => matches!(next, Submitted | Failed | Paused | Cancelled),
            Paused => matches!(next, InProgress | Failed | Skipped | Cancelled),
            Submitted | Failed | Skipped | Cancelled => false,
        }
    }
}

/// Closed vocabulary of skip/failure reason codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// Match score below the policy skip threshold
    LowMatch,
    /// Company tier marked avoid
    AvoidCompany,
    /// A configured skip rule matched
    PolicySkip,
    /// Policy evaluation failed; skipped defensively
    PolicyError,
    /// Rate governor rejected the domain outright (day cap, avoid)
    RateRejected,
    /// Domain tripwire fired; cooldown in effect
    DomainBlocked,
    /// Worker frame caught an executor panic
    WorkerException,
    /// Executor returned a failure outcome
    ExecutorError,
    /// Human intervention never arrived
    InterventionTimeout,
    /// Human resolved the intervention with "skip"
    InterventionSkipped,
    /// Human resolved the intervention with "abort"
    InterventionAborted,
    /// Item exceeded the per-item hard timeout
    Timeout,
    /// Session was cancelled while the item was outstanding
    SessionCancelled,
    /// Owning process died; item found in_progress at recovery
    Orphaned,
    /// Anything else; detail carries the specifics
    Unknown,
}

crate::simple_display! {
    ReasonCode {
        LowMatch => "low_match",
        AvoidCompany => "avoid_company",
        PolicySkip => "policy_skip",
        PolicyError => "policy_error",
        RateRejected => "rate_rejected",
        DomainBlocked => "domain_blocked",
        WorkerException => "worker_exception",
        ExecutorError => "executor_error",
        InterventionTimeout => "intervention_timeout",
        InterventionSkipped => "intervention_skipped",
        InterventionAborted => "intervention_aborted",
        Timeout => "timeout",
        SessionCancelled => "session_cancelled",
        Orphaned => "orphaned",
        Unknown => "unknown",
    }
}

/// One entry in an item's status history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: ApplicationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReasonCode>,
    pub at_epoch_ms: u64,
}

/// Frozen per-item inputs to the policy evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signals {
    pub hint_effort: Effort,
    pub match_score: f64,
    /// Free-form tier label ("target", "avoid", ...); empty when unknown
    #[serde(default)]
    pub company_tier: String,
}

/// One attempt at one job posting by one user within one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationItem {
    pub id: ApplicationId,
    pub session: SessionId,
    pub user_id: String,
    /// Job posting URL as submitted by the caller
    pub job_url: String,
    /// Canonical host of `job_url`; key into the rate governor
    pub domain: String,
    /// Match score frozen at enqueue time
    pub match_score: f64,
    /// Per-item policy signals captured at enqueue time
    pub signals: Signals,
    /// Effort chosen by the policy evaluator at dispatch; None while queued
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effort: Option<Effort>,
    /// Whether the policy required a QA pass for this item
    #[serde(default)]
    pub qa_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_ref: Option<String>,
    pub status: ApplicationStatus,
    /// Every transition ever applied, in order
    #[serde(default)]
    pub status_history: Vec<StatusChange>,
    pub enqueued_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReasonCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_detail: Option<String>,
    #[serde(default)]
    pub tokens_in: u64,
    #[serde(default)]
    pub tokens_out: u64,
    #[serde(default)]
    pub cost: f64,
}

impl ApplicationItem {
    /// Create a queued item for a job URL.
    ///
    /// `domain` must already be canonicalized via [`crate::domain_from_url`].
    pub fn new(
        session: SessionId,
        user_id: impl Into<String>,
        job_url: impl Into<String>,
        domain: impl Into<String>,
        signals: Signals,
        enqueued_at_ms: u64,
    ) -> Self {
        Self {
            id: ApplicationId::new(),
            session,
            user_id: user_id.into(),
            job_url: job_url.into(),
            domain: domain.into(),
            match_score: signals.match_score,
            signals,
            effort: None,
            qa_required: false,
            resume_ref: None,
            profile_ref: None,
            status: ApplicationStatus::Queued,
            status_history: vec![StatusChange {
                status: ApplicationStatus::Queued,
                reason: None,
                at_epoch_ms: enqueued_at_ms,
            }],
            enqueued_at_ms,
            started_at_ms: None,
            submitted_at_ms: None,
            reason: None,
            reason_detail: None,
            tokens_in: 0,
            tokens_out: 0,
            cost: 0.0,
        }
    }

    /// Priority bucket for dispatch ordering: `floor(match_score * 10)`,
    /// clamped to `[0, 10]`.
    pub fn score_bucket(&self) -> u8 {
        (self.match_score.clamp(0.0, 1.0) * 10.0).floor() as u8
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a status transition, appending to the history.
    ///
    /// Returns false (and leaves the item untouched) when the transition is
    /// illegal under [`ApplicationStatus::can_transition_to`].
    pub fn transition(
        &mut self,
        next: ApplicationStatus,
        reason: Option<ReasonCode>,
        at_epoch_ms: u64,
    ) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        if reason.is_some() {
            self.reason = reason;
        }
        self.status_history.push(StatusChange { status: next, reason, at_epoch_ms });
        match next {
            ApplicationStatus::InProgress if self.started_at_ms.is_none() => {
                self.started_at_ms = Some(at_epoch_ms);
            }
            ApplicationStatus::Submitted => {
                self.submitted_at_ms = Some(at_epoch_ms);
            }
            _ => {}
        }
        true
    }
}

#[cfg(test)]
#[path = "application_tests.rs"]
mod tests;
