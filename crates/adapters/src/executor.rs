// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The browser-executor boundary.
//!
//! The real executor drives an isolated browser context, fills forms, and
//! produces an outcome. At this boundary everything the browser layer
//! signals via exceptions is flattened into [`RunOutcome`] variants: the
//! worker decides on values, never on stack unwinding.

use async_trait::async_trait;
use lw_core::{ApplicationId, Effort, QuestionDraft, WorkerId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Infrastructure failure inside the executor (the browser itself, not
/// the application flow). The worker recycles its instance on these.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("executor resources exhausted: {0}")]
    ResourceExhausted(String),
    #[error("browser context lost: {0}")]
    ContextLost(String),
}

/// Kind of human intervention an executor can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionKind {
    Captcha,
    TwoFactor,
    SuspiciousActivity,
}

lw_core::simple_display! {
    InterventionKind {
        Captcha => "captcha",
        TwoFactor => "two_factor",
        SuspiciousActivity => "suspicious_activity",
    }
}

/// Typed resolution of an intervention request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "payload")]
pub enum Resolution {
    /// Human cleared the obstacle; the executor continues
    Continue(Option<serde_json::Value>),
    /// Human chose to skip this item
    Skip,
    /// Human aborted the item outright
    Abort,
    /// No resolution arrived before the deadline
    Timeout,
}

/// Token/cost totals attributed to one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost: f64,
}

/// One model call the executor made during a run, reported back so the
/// control plane can attribute it to the application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCall {
    pub provider: String,
    pub model: String,
    pub purpose: lw_core::CallPurpose,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost: f64,
    pub started_at_ms: u64,
    pub ended_at_ms: u64,
    pub ok: bool,
}

/// Everything the executor needs for one item.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub application: ApplicationId,
    pub job_url: String,
    pub domain: String,
    pub effort: Effort,
    pub qa_required: bool,
    pub resume_ref: Option<String>,
    pub profile_ref: Option<String>,
}

/// Outcome of one `run_application` call.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Form submitted; `questions` is the audit trail of filled fields
    /// and `calls` the model spend to attribute
    Submitted { questions: Vec<QuestionDraft>, usage: UsageTotals, calls: Vec<ModelCall> },
    /// Application-level failure (form rejected, page broken, blocked).
    /// `blocked` marks responses that should trip the domain cooldown.
    Failed { detail: String, blocked: bool, usage: UsageTotals },
    /// An intervention was requested and its resolution ended the run
    NeedsIntervention { kind: InterventionKind, resolution: Resolution, usage: UsageTotals },
}

/// Callback surface the worker hands to the executor for out-of-band
/// events. `request` suspends until a human (or the deadline) resolves.
#[async_trait]
pub trait InterventionHandler: Send + Sync {
    async fn request(&self, kind: InterventionKind, payload: serde_json::Value) -> Resolution;
}

/// Factory for per-worker executor instances.
///
/// Each worker owns exactly one instance at a time; instance state
/// (browser, cookies, DOM handles) is never shared across workers.
pub trait ExecutorAdapter: Clone + Send + Sync + 'static {
    type Instance: ExecutorInstance;

    fn create_instance(&self, worker: WorkerId) -> Self::Instance;
}

/// One worker's private executor.
#[async_trait]
pub trait ExecutorInstance: Send + 'static {
    /// Fill and submit one application at the given effort.
    async fn run_application(
        &mut self,
        request: RunRequest,
        interventions: Arc<dyn InterventionHandler>,
    ) -> Result<RunOutcome, ExecutorError>;
}

// ── Fakes ───────────────────────────────────────────────────────────────

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::*;
    use lw_core::{FieldDescriptor, FieldKind, ValueSource};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::time::Duration;

    /// Scripted behavior for one domain (or the default).
    #[derive(Debug, Clone)]
    pub enum FakeBehavior {
        /// Submit successfully after simulated browser time
        Submit { delay: Duration, usage: UsageTotals },
        /// Fail; `blocked` trips the domain cooldown
        Fail { detail: String, blocked: bool },
        /// Raise an intervention and act on the resolution
        Intervention { kind: InterventionKind },
        /// Return an infrastructure error
        Error,
        /// Panic inside the run (worker isolation tests)
        Panic,
    }

    impl Default for FakeBehavior {
        fn default() -> Self {
            FakeBehavior::Submit { delay: Duration::from_secs(5), usage: UsageTotals::default() }
        }
    }

    #[derive(Default)]
    struct FakeExecutorState {
        behaviors: HashMap<String, FakeBehavior>,
        default: FakeBehavior,
        /// (worker, application, domain) per run, in call order
        runs: Vec<(WorkerId, ApplicationId, String)>,
        /// Worker ids for which an instance was created
        instances: Vec<WorkerId>,
        recycled: u32,
    }

    /// Scriptable executor for tests. Clones share the script and the
    /// recorded call log.
    #[derive(Clone, Default)]
    pub struct FakeExecutorAdapter {
        state: Arc<Mutex<FakeExecutorState>>,
    }

    impl FakeExecutorAdapter {
        pub fn new() -> Self {
            Self::default()
        }

        /// Script the behavior for a domain.
        pub fn script(&self, domain: impl Into<String>, behavior: FakeBehavior) {
            self.state.lock().behaviors.insert(domain.into(), behavior);
        }

        /// Set the fallback behavior for unscripted domains.
        pub fn script_default(&self, behavior: FakeBehavior) {
            self.state.lock().default = behavior;
        }

        /// Recorded runs as (worker, application, domain).
        pub fn runs(&self) -> Vec<(WorkerId, ApplicationId, String)> {
            self.state.lock().runs.clone()
        }

        /// Number of instances ever created (initial + replacements).
        pub fn instances_created(&self) -> usize {
            self.state.lock().instances.len()
        }

        pub fn recycle_count(&self) -> u32 {
            self.state.lock().recycled
        }
    }

    impl ExecutorAdapter for FakeExecutorAdapter {
        type Instance = FakeExecutorInstance;

        fn create_instance(&self, worker: WorkerId) -> Self::Instance {
            let mut state = self.state.lock();
            if state.instances.contains(&worker) {
                state.recycled += 1;
            }
            state.instances.push(worker);
            FakeExecutorInstance { worker, shared: Arc::clone(&self.state) }
        }
    }

    pub struct FakeExecutorInstance {
        worker: WorkerId,
        shared: Arc<Mutex<FakeExecutorState>>,
    }

    fn canned_questions() -> Vec<QuestionDraft> {
        vec![QuestionDraft::new(
            FieldDescriptor {
                kind: FieldKind::Text,
                label: "full_name".to_string(),
                raw_label: "Full name".to_string(),
                required: true,
            },
            "Ada Lovelace",
            ValueSource::Profile,
        )]
    }

    #[async_trait]
    impl ExecutorInstance for FakeExecutorInstance {
        #[allow(clippy::panic)] // Panic behavior exists to exercise worker isolation
        async fn run_application(
            &mut self,
            request: RunRequest,
            interventions: Arc<dyn InterventionHandler>,
        ) -> Result<RunOutcome, ExecutorError> {
            let behavior = {
                let mut state = self.shared.lock();
                state.runs.push((self.worker, request.application, request.domain.clone()));
                state
                    .behaviors
                    .get(&request.domain)
                    .cloned()
                    .unwrap_or_else(|| state.default.clone())
            };

            match behavior {
                FakeBehavior::Submit { delay, usage } => {
                    tokio::time::sleep(delay).await;
                    let calls = if usage == UsageTotals::default() {
                        Vec::new()
                    } else {
                        vec![ModelCall {
                            provider: "anthropic".to_string(),
                            model: "claude-sonnet".to_string(),
                            purpose: lw_core::CallPurpose::CoverLetter,
                            tokens_in: usage.tokens_in,
                            tokens_out: usage.tokens_out,
                            cost: usage.cost,
                            started_at_ms: 0,
                            ended_at_ms: 0,
                            ok: true,
                        }]
                    };
                    Ok(RunOutcome::Submitted { questions: canned_questions(), usage, calls })
                }
                FakeBehavior::Fail { detail, blocked } => {
                    Ok(RunOutcome::Failed { detail, blocked, usage: UsageTotals::default() })
                }
                FakeBehavior::Intervention { kind } => {
                    let resolution = interventions
                        .request(kind, serde_json::json!({"url": request.job_url}))
                        .await;
                    match resolution {
                        Resolution::Continue(_) => Ok(RunOutcome::Submitted {
                            questions: canned_questions(),
                            usage: UsageTotals::default(),
                            calls: Vec::new(),
                        }),
                        other => Ok(RunOutcome::NeedsIntervention {
                            kind,
                            resolution: other,
                            usage: UsageTotals::default(),
                        }),
                    }
                }
                FakeBehavior::Error => {
                    Err(ExecutorError::ContextLost("injected failure".to_string()))
                }
                FakeBehavior::Panic => panic!("injected executor panic"),
            }
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeBehavior, FakeExecutorAdapter};

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
