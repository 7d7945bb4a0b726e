// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write-ahead event log over the repository.
//!
//! Appends must be durable before the corresponding state transition is
//! acknowledged. Transient storage failures are retried with bounded
//! exponential backoff; once the budget is spent the error propagates
//! and the session controller treats it as fatal (the state must not
//! diverge from the log).

use crate::error::StorageError;
use crate::repo::Repository;
use lw_core::{ApplicationId, ApplicationStatus, EventRecord, ReasonCode};
use std::sync::Arc;
use std::time::Duration;

/// Bounded retry schedule for log writes.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delays: vec![
                Duration::from_millis(100),
                Duration::from_millis(500),
                Duration::from_secs(2),
            ],
        }
    }
}

impl RetryPolicy {
    /// No retries; used by tests that assert first-failure behavior.
    pub fn none() -> Self {
        Self { delays: Vec::new() }
    }
}

/// The engine's write surface for events and transactional transitions.
#[derive(Clone)]
pub struct EventLog {
    repo: Arc<dyn Repository>,
    retry: RetryPolicy,
}

impl EventLog {
    pub fn new(repo: Arc<dyn Repository>, retry: RetryPolicy) -> Self {
        Self { repo, retry }
    }

    /// Append a bare event (no status transition attached).
    pub async fn append(&self, event: EventRecord) -> Result<EventRecord, StorageError> {
        let mut attempt = 0;
        loop {
            match self.repo.append_event(event.clone()).await {
                Ok(stored) => return Ok(stored),
                Err(err) if err.is_transient() && attempt < self.retry.delays.len() => {
                    tracing::warn!(error = %err, attempt, kind = %event.kind,
                        "event append failed, retrying");
                    tokio::time::sleep(self.retry.delays[attempt]).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Apply a status transition with its event in one transaction,
    /// retrying transient failures with the same payload.
    pub async fn transition(
        &self,
        id: ApplicationId,
        next: ApplicationStatus,
        reason: Option<ReasonCode>,
        detail: Option<String>,
        event: EventRecord,
    ) -> Result<EventRecord, StorageError> {
        let mut attempt = 0;
        loop {
            match self
                .repo
                .transition_application(id, next, reason, detail.clone(), event.clone())
                .await
            {
                Ok(stored) => return Ok(stored),
                Err(err) if err.is_transient() && attempt < self.retry.delays.len() => {
                    tracing::warn!(error = %err, attempt, application = %id, status = %next,
                        "transition commit failed, retrying");
                    tokio::time::sleep(self.retry.delays[attempt]).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
#[path = "event_log_tests.rs"]
mod tests;
