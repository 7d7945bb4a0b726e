// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory repository.
//!
//! Backs tests and the single-process deployment. Every write happens
//! under one lock, which is what makes the transactional status update
//! (row + history + event) atomic here; a relational backend gets the
//! same property from a database transaction.

use crate::error::StorageError;
use crate::repo::{CounterDelta, Repository};
use async_trait::async_trait;
use lw_core::{
    ApplicationId, ApplicationItem, ApplicationStatus, DomainPolicy, Effort, EventRecord,
    ModelUsage, Question, QuestionDraft, ReasonCode, Session, SessionDigest, SessionId,
    SessionStatus,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Default)]
struct Inner {
    sessions: HashMap<SessionId, Session>,
    applications: HashMap<ApplicationId, ApplicationItem>,
    questions: HashMap<ApplicationId, Vec<Question>>,
    events: HashMap<SessionId, Vec<EventRecord>>,
    /// Next sequence number per session
    seqs: HashMap<SessionId, u64>,
    usage: Vec<ModelUsage>,
    digests: HashMap<SessionId, SessionDigest>,
    domain_policies: BTreeMap<String, DomainPolicy>,
}

impl Inner {
    fn next_seq(&mut self, session: SessionId) -> u64 {
        let seq = self.seqs.entry(session).or_insert(0);
        *seq += 1;
        *seq
    }

    fn push_event(&mut self, mut event: EventRecord) -> EventRecord {
        event.seq = self.next_seq(event.session);
        self.events.entry(event.session).or_default().push(event.clone());
        event
    }
}

/// Process-local repository; cheap to clone, all clones share state.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn add_u32(value: &mut u32, delta: i64) {
    *value = (*value as i64 + delta).max(0) as u32;
}

fn add_u64(value: &mut u64, delta: i64) {
    *value = (*value as i64 + delta).max(0) as u64;
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn create_session(&self, session: Session) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        if inner.sessions.contains_key(&session.id) {
            return Err(StorageError::Duplicate(session.id.to_string()));
        }
        inner.sessions.insert(session.id, session);
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<Session, StorageError> {
        self.inner
            .lock()
            .sessions
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::SessionNotFound(id.to_string()))
    }

    async fn update_session_status(
        &self,
        id: SessionId,
        next: SessionStatus,
        at_epoch_ms: u64,
    ) -> Result<Session, StorageError> {
        let mut inner = self.inner.lock();
        let session = inner
            .sessions
            .get_mut(&id)
            .ok_or_else(|| StorageError::SessionNotFound(id.to_string()))?;
        let from = session.status;
        if !session.transition(next, at_epoch_ms) {
            return Err(StorageError::IllegalSessionTransition { from, to: next });
        }
        Ok(session.clone())
    }

    async fn add_session_counters(
        &self,
        id: SessionId,
        delta: CounterDelta,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        let session = inner
            .sessions
            .get_mut(&id)
            .ok_or_else(|| StorageError::SessionNotFound(id.to_string()))?;
        if session.is_terminal() {
            return Err(StorageError::SessionFrozen(id.to_string()));
        }
        let counters = &mut session.counters;
        add_u32(&mut counters.attempted, delta.attempted);
        add_u32(&mut counters.succeeded, delta.succeeded);
        add_u32(&mut counters.failed, delta.failed);
        add_u32(&mut counters.skipped, delta.skipped);
        add_u32(&mut counters.cancelled, delta.cancelled);
        add_u32(&mut counters.in_flight, delta.in_flight);
        add_u64(&mut counters.tokens_in, delta.tokens_in);
        add_u64(&mut counters.tokens_out, delta.tokens_out);
        counters.cost += delta.cost;
        Ok(())
    }

    async fn set_session_config_hash(
        &self,
        id: SessionId,
        hash: String,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        let session = inner
            .sessions
            .get_mut(&id)
            .ok_or_else(|| StorageError::SessionNotFound(id.to_string()))?;
        session.config_hash = hash;
        Ok(())
    }

    async fn heartbeat_session(&self, id: SessionId, at_epoch_ms: u64) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        let session = inner
            .sessions
            .get_mut(&id)
            .ok_or_else(|| StorageError::SessionNotFound(id.to_string()))?;
        session.heartbeat_at_ms = at_epoch_ms;
        Ok(())
    }

    async fn list_non_terminal_sessions(&self) -> Result<Vec<Session>, StorageError> {
        let inner = self.inner.lock();
        let mut sessions: Vec<Session> =
            inner.sessions.values().filter(|s| !s.is_terminal()).cloned().collect();
        sessions.sort_by_key(|s| s.created_at_ms);
        Ok(sessions)
    }

    async fn create_application(&self, item: ApplicationItem) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        if inner.applications.contains_key(&item.id) {
            return Err(StorageError::Duplicate(item.id.to_string()));
        }
        inner.applications.insert(item.id, item);
        Ok(())
    }

    async fn get_application(&self, id: ApplicationId) -> Result<ApplicationItem, StorageError> {
        self.inner
            .lock()
            .applications
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::ApplicationNotFound(id.to_string()))
    }

    async fn transition_application(
        &self,
        id: ApplicationId,
        next: ApplicationStatus,
        reason: Option<ReasonCode>,
        detail: Option<String>,
        event: EventRecord,
    ) -> Result<EventRecord, StorageError> {
        let mut inner = self.inner.lock();
        let item = inner
            .applications
            .get_mut(&id)
            .ok_or_else(|| StorageError::ApplicationNotFound(id.to_string()))?;
        let from = item.status;
        if !item.transition(next, reason, event.at_epoch_ms) {
            return Err(StorageError::IllegalTransition { from, to: next });
        }
        if let Some(detail) = detail {
            item.reason_detail = Some(detail);
        }
        Ok(inner.push_event(event))
    }

    async fn set_application_decision(
        &self,
        id: ApplicationId,
        effort: Effort,
        qa_required: bool,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        let item = inner
            .applications
            .get_mut(&id)
            .ok_or_else(|| StorageError::ApplicationNotFound(id.to_string()))?;
        item.effort = Some(effort);
        item.qa_required = qa_required;
        Ok(())
    }

    async fn add_application_counters(
        &self,
        id: ApplicationId,
        tokens_in: u64,
        tokens_out: u64,
        cost: f64,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        let item = inner
            .applications
            .get_mut(&id)
            .ok_or_else(|| StorageError::ApplicationNotFound(id.to_string()))?;
        item.tokens_in += tokens_in;
        item.tokens_out += tokens_out;
        item.cost += cost;
        Ok(())
    }

    async fn list_queued(
        &self,
        session: SessionId,
        limit: usize,
    ) -> Result<Vec<ApplicationItem>, StorageError> {
        let inner = self.inner.lock();
        let mut queued: Vec<ApplicationItem> = inner
            .applications
            .values()
            .filter(|item| item.session == session && item.status == ApplicationStatus::Queued)
            .cloned()
            .collect();
        queued.sort_by_key(|item| item.enqueued_at_ms);
        queued.truncate(limit);
        Ok(queued)
    }

    async fn list_in_progress(
        &self,
        session: SessionId,
    ) -> Result<Vec<ApplicationItem>, StorageError> {
        let inner = self.inner.lock();
        Ok(inner
            .applications
            .values()
            .filter(|item| {
                item.session == session
                    && matches!(
                        item.status,
                        ApplicationStatus::InProgress | ApplicationStatus::Paused
                    )
            })
            .cloned()
            .collect())
    }

    async fn list_applications(
        &self,
        session: SessionId,
    ) -> Result<Vec<ApplicationItem>, StorageError> {
        let inner = self.inner.lock();
        let mut items: Vec<ApplicationItem> =
            inner.applications.values().filter(|item| item.session == session).cloned().collect();
        items.sort_by_key(|item| item.enqueued_at_ms);
        Ok(items)
    }

    async fn append_question(
        &self,
        application: ApplicationId,
        draft: QuestionDraft,
    ) -> Result<Question, StorageError> {
        let mut inner = self.inner.lock();
        if !inner.applications.contains_key(&application) {
            return Err(StorageError::ApplicationNotFound(application.to_string()));
        }
        let rows = inner.questions.entry(application).or_default();
        let question = Question {
            application,
            step_index: rows.len() as u32,
            field: draft.field,
            value: draft.value,
            source: draft.source,
            confidence: draft.confidence,
            validation_error: draft.validation_error,
            correction: None,
            corrected_by: None,
        };
        rows.push(question.clone());
        Ok(question)
    }

    async fn list_questions(
        &self,
        application: ApplicationId,
    ) -> Result<Vec<Question>, StorageError> {
        Ok(self.inner.lock().questions.get(&application).cloned().unwrap_or_default())
    }

    async fn append_event(&self, event: EventRecord) -> Result<EventRecord, StorageError> {
        Ok(self.inner.lock().push_event(event))
    }

    async fn list_events(&self, session: SessionId) -> Result<Vec<EventRecord>, StorageError> {
        Ok(self.inner.lock().events.get(&session).cloned().unwrap_or_default())
    }

    async fn append_usage(&self, usage: ModelUsage) -> Result<(), StorageError> {
        self.inner.lock().usage.push(usage);
        Ok(())
    }

    async fn list_usage(&self, session: SessionId) -> Result<Vec<ModelUsage>, StorageError> {
        Ok(self.inner.lock().usage.iter().filter(|u| u.session == session).cloned().collect())
    }

    async fn upsert_digest(&self, digest: SessionDigest) -> Result<(), StorageError> {
        self.inner.lock().digests.insert(digest.session, digest);
        Ok(())
    }

    async fn get_digest(
        &self,
        session: SessionId,
    ) -> Result<Option<SessionDigest>, StorageError> {
        Ok(self.inner.lock().digests.get(&session).cloned())
    }

    async fn load_domain_policies(&self) -> Result<BTreeMap<String, DomainPolicy>, StorageError> {
        Ok(self.inner.lock().domain_policies.clone())
    }

    async fn upsert_domain_policy(
        &self,
        domain: String,
        policy: DomainPolicy,
    ) -> Result<(), StorageError> {
        self.inner.lock().domain_policies.insert(domain, policy);
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
