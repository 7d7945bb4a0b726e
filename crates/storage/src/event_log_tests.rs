// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::memory::InMemoryRepository;
use crate::repo::CounterDelta;
use async_trait::async_trait;
use lw_core::test_support::queued_item;
use lw_core::{
    ApplicationItem, DomainPolicy, EventKind, ModelUsage, Question, QuestionDraft, Session,
    SessionConfig, SessionDigest, SessionId, SessionStatus,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Repository that fails the first N writes with a transient error,
/// then delegates to an in-memory store.
#[derive(Clone)]
struct FlakyRepository {
    inner: InMemoryRepository,
    failures_left: std::sync::Arc<Mutex<usize>>,
}

impl FlakyRepository {
    fn new(failures: usize) -> Self {
        Self {
            inner: InMemoryRepository::new(),
            failures_left: std::sync::Arc::new(Mutex::new(failures)),
        }
    }

    fn take_failure(&self) -> bool {
        let mut left = self.failures_left.lock();
        if *left > 0 {
            *left -= 1;
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl Repository for FlakyRepository {
    async fn create_session(&self, session: Session) -> Result<(), StorageError> {
        self.inner.create_session(session).await
    }

    async fn get_session(&self, id: SessionId) -> Result<Session, StorageError> {
        self.inner.get_session(id).await
    }

    async fn update_session_status(
        &self,
        id: SessionId,
        next: SessionStatus,
        at_epoch_ms: u64,
    ) -> Result<Session, StorageError> {
        self.inner.update_session_status(id, next, at_epoch_ms).await
    }

    async fn add_session_counters(
        &self,
        id: SessionId,
        delta: CounterDelta,
    ) -> Result<(), StorageError> {
        self.inner.add_session_counters(id, delta).await
    }

    async fn set_session_config_hash(
        &self,
        id: SessionId,
        hash: String,
    ) -> Result<(), StorageError> {
        self.inner.set_session_config_hash(id, hash).await
    }

    async fn heartbeat_session(&self, id: SessionId, at_epoch_ms: u64) -> Result<(), StorageError> {
        self.inner.heartbeat_session(id, at_epoch_ms).await
    }

    async fn list_non_terminal_sessions(&self) -> Result<Vec<Session>, StorageError> {
        self.inner.list_non_terminal_sessions().await
    }

    async fn create_application(&self, item: ApplicationItem) -> Result<(), StorageError> {
        self.inner.create_application(item).await
    }

    async fn get_application(
        &self,
        id: lw_core::ApplicationId,
    ) -> Result<ApplicationItem, StorageError> {
        self.inner.get_application(id).await
    }

    async fn transition_application(
        &self,
        id: lw_core::ApplicationId,
        next: lw_core::ApplicationStatus,
        reason: Option<lw_core::ReasonCode>,
        detail: Option<String>,
        event: EventRecord,
    ) -> Result<EventRecord, StorageError> {
        if self.take_failure() {
            return Err(StorageError::Unavailable("injected".to_string()));
        }
        self.inner.transition_application(id, next, reason, detail, event).await
    }

    async fn set_application_decision(
        &self,
        id: lw_core::ApplicationId,
        effort: lw_core::Effort,
        qa_required: bool,
    ) -> Result<(), StorageError> {
        self.inner.set_application_decision(id, effort, qa_required).await
    }

    async fn add_application_counters(
        &self,
        id: lw_core::ApplicationId,
        tokens_in: u64,
        tokens_out: u64,
        cost: f64,
    ) -> Result<(), StorageError> {
        self.inner.add_application_counters(id, tokens_in, tokens_out, cost).await
    }

    async fn list_queued(
        &self,
        session: SessionId,
        limit: usize,
    ) -> Result<Vec<ApplicationItem>, StorageError> {
        self.inner.list_queued(session, limit).await
    }

    async fn list_in_progress(
        &self,
        session: SessionId,
    ) -> Result<Vec<ApplicationItem>, StorageError> {
        self.inner.list_in_progress(session).await
    }

    async fn list_applications(
        &self,
        session: SessionId,
    ) -> Result<Vec<ApplicationItem>, StorageError> {
        self.inner.list_applications(session).await
    }

    async fn append_question(
        &self,
        application: lw_core::ApplicationId,
        draft: QuestionDraft,
    ) -> Result<Question, StorageError> {
        self.inner.append_question(application, draft).await
    }

    async fn list_questions(
        &self,
        application: lw_core::ApplicationId,
    ) -> Result<Vec<Question>, StorageError> {
        self.inner.list_questions(application).await
    }

    async fn append_event(&self, event: EventRecord) -> Result<EventRecord, StorageError> {
        if self.take_failure() {
            return Err(StorageError::Unavailable("injected".to_string()));
        }
        self.inner.append_event(event).await
    }

    async fn list_events(&self, session: SessionId) -> Result<Vec<EventRecord>, StorageError> {
        self.inner.list_events(session).await
    }

    async fn append_usage(&self, usage: ModelUsage) -> Result<(), StorageError> {
        self.inner.append_usage(usage).await
    }

    async fn list_usage(&self, session: SessionId) -> Result<Vec<ModelUsage>, StorageError> {
        self.inner.list_usage(session).await
    }

    async fn upsert_digest(&self, digest: SessionDigest) -> Result<(), StorageError> {
        self.inner.upsert_digest(digest).await
    }

    async fn get_digest(
        &self,
        session: SessionId,
    ) -> Result<Option<SessionDigest>, StorageError> {
        self.inner.get_digest(session).await
    }

    async fn load_domain_policies(&self) -> Result<BTreeMap<String, DomainPolicy>, StorageError> {
        self.inner.load_domain_policies().await
    }

    async fn upsert_domain_policy(
        &self,
        domain: String,
        policy: DomainPolicy,
    ) -> Result<(), StorageError> {
        self.inner.upsert_domain_policy(domain, policy).await
    }
}

fn session_event(session: SessionId) -> EventRecord {
    EventRecord::new(session, EventKind::RateLimitApplied, 1_000_000)
}

#[tokio::test(start_paused = true)]
async fn append_retries_transient_failures() {
    let repo = FlakyRepository::new(2);
    let log = EventLog::new(std::sync::Arc::new(repo.clone()), RetryPolicy::default());
    let session = SessionId::from_string("ses-log");

    let stored = log.append(session_event(session)).await.unwrap();
    assert_eq!(stored.seq, 1);
    assert_eq!(repo.inner.list_events(session).await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn append_gives_up_after_budget() {
    let repo = FlakyRepository::new(10);
    let log = EventLog::new(std::sync::Arc::new(repo), RetryPolicy::default());
    let session = SessionId::from_string("ses-log");

    let result = log.append(session_event(session)).await;
    assert!(matches!(result, Err(StorageError::Unavailable(_))));
}

#[tokio::test(start_paused = true)]
async fn no_retry_policy_fails_fast() {
    let repo = FlakyRepository::new(1);
    let log = EventLog::new(std::sync::Arc::new(repo.clone()), RetryPolicy::none());
    let session = SessionId::from_string("ses-log");

    assert!(log.append(session_event(session)).await.is_err());
    // A second append (failure consumed) succeeds.
    assert!(log.append(session_event(session)).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn transition_retries_with_same_payload() {
    let repo = FlakyRepository::new(1);
    let session_row = Session::new(&SessionConfig::new("user-1"), 1_000_000);
    let session = session_row.id;
    repo.create_session(session_row).await.unwrap();
    let item = queued_item(session, "ats.company.com", 0.8);
    let app = item.id;
    repo.create_application(item).await.unwrap();

    let log = EventLog::new(std::sync::Arc::new(repo.clone()), RetryPolicy::default());
    let stored = log
        .transition(
            app,
            lw_core::ApplicationStatus::InProgress,
            None,
            None,
            EventRecord::new(session, EventKind::ItemStarted, 1_000_100).application(app),
        )
        .await
        .unwrap();
    assert_eq!(stored.seq, 1);

    // Exactly one event despite the retry.
    assert_eq!(repo.inner.list_events(session).await.unwrap().len(), 1);
    let item = repo.inner.get_application(app).await.unwrap();
    assert_eq!(item.status, lw_core::ApplicationStatus::InProgress);
}

#[tokio::test(start_paused = true)]
async fn non_transient_errors_do_not_retry() {
    let repo = FlakyRepository::new(0);
    let log = EventLog::new(std::sync::Arc::new(repo), RetryPolicy::default());
    // Illegal transition on a missing application: permanent, no retry.
    let result = log
        .transition(
            lw_core::ApplicationId::from_string("app-ghost"),
            lw_core::ApplicationStatus::InProgress,
            None,
            None,
            session_event(SessionId::from_string("ses-x")),
        )
        .await;
    assert!(matches!(result, Err(StorageError::ApplicationNotFound(_))));
}
