// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The repository contract.
//!
//! One implementation note binds every backend: an application-status
//! update is a single transaction that (i) updates the application row,
//! (ii) appends the status-history entry, and (iii) appends the
//! corresponding event with its assigned sequence number. The engine
//! never acknowledges a transition whose event did not commit.

use crate::error::StorageError;
use async_trait::async_trait;
use lw_core::{
    ApplicationId, ApplicationItem, ApplicationStatus, DomainPolicy, Effort, EventRecord,
    ModelUsage, Question, QuestionDraft, ReasonCode, Session, SessionDigest, SessionId,
    SessionStatus,
};
use std::collections::BTreeMap;

/// Additive counter update for a session row. Deltas may be negative
/// (in-flight decrements); the repository clamps at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CounterDelta {
    pub attempted: i64,
    pub succeeded: i64,
    pub failed: i64,
    pub skipped: i64,
    pub cancelled: i64,
    pub in_flight: i64,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub cost: f64,
}

impl CounterDelta {
    pub fn attempt() -> Self {
        Self { attempted: 1, in_flight: 1, ..Default::default() }
    }

    /// Move one in-flight item into a terminal bucket.
    pub fn settle(status: ApplicationStatus) -> Self {
        let mut delta = Self { in_flight: -1, ..Default::default() };
        match status {
            ApplicationStatus::Submitted => delta.succeeded = 1,
            ApplicationStatus::Failed => delta.failed = 1,
            ApplicationStatus::Skipped => delta.skipped = 1,
            ApplicationStatus::Cancelled => delta.cancelled = 1,
            _ => {}
        }
        delta
    }

    pub fn usage(tokens_in: u64, tokens_out: u64, cost: f64) -> Self {
        Self { tokens_in: tokens_in as i64, tokens_out: tokens_out as i64, cost, ..Default::default() }
    }
}

/// Durable state for sessions, applications, questions, events, usage,
/// digests, and domain policies.
#[async_trait]
pub trait Repository: Send + Sync + 'static {
    // ── sessions ──────────────────────────────────────────────────────

    async fn create_session(&self, session: Session) -> Result<(), StorageError>;

    async fn get_session(&self, id: SessionId) -> Result<Session, StorageError>;

    /// Validates the lifecycle transition and stamps start/end times.
    /// Returns the updated row.
    async fn update_session_status(
        &self,
        id: SessionId,
        next: SessionStatus,
        at_epoch_ms: u64,
    ) -> Result<Session, StorageError>;

    /// Atomic additive counter update. Rejected once the session is
    /// terminal (counters are frozen).
    async fn add_session_counters(
        &self,
        id: SessionId,
        delta: CounterDelta,
    ) -> Result<(), StorageError>;

    /// Record the immutable policy snapshot hash at start().
    async fn set_session_config_hash(
        &self,
        id: SessionId,
        hash: String,
    ) -> Result<(), StorageError>;

    async fn heartbeat_session(&self, id: SessionId, at_epoch_ms: u64) -> Result<(), StorageError>;

    /// Non-terminal sessions, for the recovery sweep.
    async fn list_non_terminal_sessions(&self) -> Result<Vec<Session>, StorageError>;

    // ── applications ──────────────────────────────────────────────────

    async fn create_application(&self, item: ApplicationItem) -> Result<(), StorageError>;

    async fn get_application(&self, id: ApplicationId) -> Result<ApplicationItem, StorageError>;

    /// The transactional status update: validates the transition against
    /// the state machine, appends the history row, and appends `event`
    /// (sequence assigned by the log) in one commit. Returns the stored
    /// event.
    async fn transition_application(
        &self,
        id: ApplicationId,
        next: ApplicationStatus,
        reason: Option<ReasonCode>,
        detail: Option<String>,
        event: EventRecord,
    ) -> Result<EventRecord, StorageError>;

    /// Record the policy decision taken at dispatch.
    async fn set_application_decision(
        &self,
        id: ApplicationId,
        effort: Effort,
        qa_required: bool,
    ) -> Result<(), StorageError>;

    async fn add_application_counters(
        &self,
        id: ApplicationId,
        tokens_in: u64,
        tokens_out: u64,
        cost: f64,
    ) -> Result<(), StorageError>;

    async fn list_queued(
        &self,
        session: SessionId,
        limit: usize,
    ) -> Result<Vec<ApplicationItem>, StorageError>;

    async fn list_in_progress(
        &self,
        session: SessionId,
    ) -> Result<Vec<ApplicationItem>, StorageError>;

    async fn list_applications(
        &self,
        session: SessionId,
    ) -> Result<Vec<ApplicationItem>, StorageError>;

    // ── questions ─────────────────────────────────────────────────────

    /// Appends with a repository-assigned, strictly increasing
    /// `step_index`. Returns the stored row.
    async fn append_question(
        &self,
        application: ApplicationId,
        draft: QuestionDraft,
    ) -> Result<Question, StorageError>;

    async fn list_questions(
        &self,
        application: ApplicationId,
    ) -> Result<Vec<Question>, StorageError>;

    // ── events ────────────────────────────────────────────────────────

    /// Append-only; the log assigns the session-scoped sequence number.
    /// Returns the stored record.
    async fn append_event(&self, event: EventRecord) -> Result<EventRecord, StorageError>;

    /// Events for a session ordered by sequence.
    async fn list_events(&self, session: SessionId) -> Result<Vec<EventRecord>, StorageError>;

    // ── model usage ───────────────────────────────────────────────────

    async fn append_usage(&self, usage: ModelUsage) -> Result<(), StorageError>;

    async fn list_usage(&self, session: SessionId) -> Result<Vec<ModelUsage>, StorageError>;

    // ── digests ───────────────────────────────────────────────────────

    async fn upsert_digest(&self, digest: SessionDigest) -> Result<(), StorageError>;

    async fn get_digest(&self, session: SessionId)
        -> Result<Option<SessionDigest>, StorageError>;

    // ── domain policies ───────────────────────────────────────────────

    async fn load_domain_policies(&self) -> Result<BTreeMap<String, DomainPolicy>, StorageError>;

    async fn upsert_domain_policy(
        &self,
        domain: String,
        policy: DomainPolicy,
    ) -> Result<(), StorageError>;
}
