// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dry-run stand-ins for the external executor and matcher.
//!
//! Lets the control plane be exercised end-to-end (policies, rate
//! pacing, budgets, digests) without touching any real site or model.

use async_trait::async_trait;
use lw_adapters::{
    ExecutorAdapter, ExecutorError, ExecutorInstance, InterventionHandler, MatchError,
    MatcherAdapter, RunOutcome, RunRequest, UsageTotals,
};
use lw_core::{FieldDescriptor, FieldKind, QuestionDraft, ValueSource, WorkerId};
use std::sync::Arc;
use std::time::Duration;

/// Executor that "submits" every application after a simulated delay.
#[derive(Clone)]
pub struct DryRunExecutor {
    pub item_delay: Duration,
}

impl ExecutorAdapter for DryRunExecutor {
    type Instance = DryRunInstance;

    fn create_instance(&self, worker: WorkerId) -> Self::Instance {
        DryRunInstance { worker, item_delay: self.item_delay }
    }
}

pub struct DryRunInstance {
    worker: WorkerId,
    item_delay: Duration,
}

#[async_trait]
impl ExecutorInstance for DryRunInstance {
    async fn run_application(
        &mut self,
        request: RunRequest,
        _interventions: Arc<dyn InterventionHandler>,
    ) -> Result<RunOutcome, ExecutorError> {
        tracing::info!(worker = %self.worker, url = %request.job_url, effort = %request.effort,
            "dry-run application");
        tokio::time::sleep(self.item_delay).await;
        let questions = vec![QuestionDraft::new(
            FieldDescriptor {
                kind: FieldKind::Text,
                label: "dry_run".to_string(),
                raw_label: "Dry run".to_string(),
                required: false,
            },
            request.job_url,
            ValueSource::Default,
        )];
        Ok(RunOutcome::Submitted { questions, usage: UsageTotals::default(), calls: Vec::new() })
    }
}

/// Matcher that scores every posting with one fixed value.
#[derive(Clone)]
pub struct FixedScoreMatcher {
    pub score: f64,
}

#[async_trait]
impl MatcherAdapter for FixedScoreMatcher {
    async fn score(&self, _job_url: &str) -> Result<f64, MatchError> {
        Ok(self.score)
    }
}
