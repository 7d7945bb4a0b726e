// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker pool: N isolated actors, one active item each.
//!
//! Every worker owns a private executor instance and consumes one
//! assignment at a time from its own channel. The executor call runs in
//! a spawned task, so a panicking executor surfaces as a `JoinError` and
//! never takes the worker (or its peers) down. A worker whose task does
//! exit is replaced by the pool supervisor.

use crate::bridge::InterventionBridge;
use crate::governor::{RateGovernor, ReleaseOutcome};
use lw_adapters::{
    ExecutorAdapter, ExecutorError, ExecutorInstance, InterventionHandler, InterventionKind,
    ModelCall, NotifyAdapter, Resolution, RunOutcome, RunRequest, UsageTotals,
};
use lw_core::{
    ApplicationId, ApplicationItem, ApplicationStatus, Clock, Effort, EventKind, EventRecord,
    ModelUsage, QuestionDraft, ReasonCode, SessionId, UsageStatus, WorkerId,
};
use lw_storage::{CounterDelta, EventLog, Repository, StorageError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, OwnedSemaphorePermit};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// One unit of work handed to a worker.
pub(crate) struct Assignment {
    pub item: ApplicationItem,
    pub effort: Effort,
    pub qa_required: bool,
    pub max_item_duration: Duration,
    pub session_cancel: CancellationToken,
    /// Session concurrency permit; dropped when the item settles
    pub permit: OwnedSemaphorePermit,
}

/// Shared dependencies every worker runs with.
pub(crate) struct WorkerDeps<E, N: NotifyAdapter, C: Clock> {
    pub executor: E,
    pub repo: Arc<dyn Repository>,
    pub log: EventLog,
    pub governor: Arc<RateGovernor<C>>,
    pub bridge: Arc<InterventionBridge<N>>,
    pub clock: C,
    /// Fatal storage failures flow to the session controller
    pub fatal_tx: mpsc::Sender<(SessionId, String)>,
}

impl<E: Clone, N: NotifyAdapter, C: Clock> Clone for WorkerDeps<E, N, C> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            repo: Arc::clone(&self.repo),
            log: self.log.clone(),
            governor: Arc::clone(&self.governor),
            bridge: Arc::clone(&self.bridge),
            clock: self.clock.clone(),
            fatal_tx: self.fatal_tx.clone(),
        }
    }
}

/// Handle to the fixed-size worker pool. Erases the adapter generics;
/// dispatchers only see assignment channels.
pub struct WorkerPool {
    txs: Arc<Mutex<HashMap<WorkerId, mpsc::Sender<Assignment>>>>,
    idle_rx: tokio::sync::Mutex<mpsc::Receiver<WorkerId>>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// Spawn the pool with `size` workers.
    pub(crate) fn start<E, N, C>(
        size: usize,
        deps: WorkerDeps<E, N, C>,
        shutdown: CancellationToken,
    ) -> Self
    where
        E: ExecutorAdapter,
        N: NotifyAdapter,
        C: Clock,
    {
        let txs: Arc<Mutex<HashMap<WorkerId, mpsc::Sender<Assignment>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let size = size.max(1);
        let (idle_tx, idle_rx) = mpsc::channel(size * 2);

        tokio::spawn(supervise(size, deps, Arc::clone(&txs), idle_tx, shutdown.clone()));

        Self { txs, idle_rx: tokio::sync::Mutex::new(idle_rx), shutdown }
    }

    /// Await a free worker. Returns None on cancellation or pool
    /// shutdown. Stale announcements from replaced workers are skipped.
    pub(crate) async fn checkout(
        &self,
        cancel: &CancellationToken,
    ) -> Option<(WorkerId, mpsc::Sender<Assignment>)> {
        let mut idle = self.idle_rx.lock().await;
        loop {
            let id = tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = self.shutdown.cancelled() => return None,
                id = idle.recv() => id?,
            };
            let tx = self.txs.lock().get(&id).cloned();
            match tx {
                Some(tx) if !tx.is_closed() => return Some((id, tx)),
                _ => continue,
            }
        }
    }

    /// Cooperatively stop all workers.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// Keeps `size` workers alive: any worker task that exits while the pool
/// is up gets a replacement with a fresh executor instance.
async fn supervise<E, N, C>(
    size: usize,
    deps: WorkerDeps<E, N, C>,
    txs: Arc<Mutex<HashMap<WorkerId, mpsc::Sender<Assignment>>>>,
    idle_tx: mpsc::Sender<WorkerId>,
    shutdown: CancellationToken,
) where
    E: ExecutorAdapter,
    N: NotifyAdapter,
    C: Clock,
{
    let mut workers = JoinSet::new();
    for _ in 0..size {
        spawn_worker(&mut workers, &deps, &txs, &idle_tx, &shutdown);
    }

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            finished = workers.join_next() => {
                let Some(result) = finished else { break };
                if shutdown.is_cancelled() {
                    continue;
                }
                match result {
                    Ok(id) => tracing::warn!(worker = %id, "worker decommissioned, spawning replacement"),
                    Err(err) => tracing::error!(error = %err, "worker task died, spawning replacement"),
                }
                spawn_worker(&mut workers, &deps, &txs, &idle_tx, &shutdown);
            }
        }
    }
    workers.shutdown().await;
}

fn spawn_worker<E, N, C>(
    workers: &mut JoinSet<WorkerId>,
    deps: &WorkerDeps<E, N, C>,
    txs: &Arc<Mutex<HashMap<WorkerId, mpsc::Sender<Assignment>>>>,
    idle_tx: &mpsc::Sender<WorkerId>,
    shutdown: &CancellationToken,
) where
    E: ExecutorAdapter,
    N: NotifyAdapter,
    C: Clock,
{
    let id = WorkerId::new();
    let (tx, rx) = mpsc::channel(1);
    txs.lock().insert(id, tx);
    workers.spawn(run_worker(id, deps.clone(), rx, idle_tx.clone(), shutdown.clone()));
}

async fn run_worker<E, N, C>(
    id: WorkerId,
    deps: WorkerDeps<E, N, C>,
    mut rx: mpsc::Receiver<Assignment>,
    idle_tx: mpsc::Sender<WorkerId>,
    shutdown: CancellationToken,
) -> WorkerId
where
    E: ExecutorAdapter,
    N: NotifyAdapter,
    C: Clock,
{
    tracing::info!(worker = %id, "worker started");
    let mut instance: Option<E::Instance> = None;
    loop {
        if shutdown.is_cancelled() {
            break;
        }
        if idle_tx.send(id).await.is_err() {
            break;
        }
        let assignment = tokio::select! {
            _ = shutdown.cancelled() => break,
            assignment = rx.recv() => match assignment {
                Some(assignment) => assignment,
                None => break,
            },
        };
        process(&id, &deps, &mut instance, assignment).await;
    }
    tracing::info!(worker = %id, "worker stopped");
    id
}

/// How an executor run ended, from the worker frame's point of view.
enum RunEnd<I> {
    Finished(I, Result<RunOutcome, ExecutorError>),
    Panicked,
    TimedOut,
    Cancelled,
}

/// What to persist for a finished item.
struct Settlement {
    status: ApplicationStatus,
    reason: Option<ReasonCode>,
    detail: Option<String>,
    event: EventKind,
    release: ReleaseOutcome,
    usage: UsageTotals,
    questions: Vec<QuestionDraft>,
    calls: Vec<ModelCall>,
    /// Bare events appended before the transition (worker_crashed,
    /// intervention_timeout)
    pre_events: Vec<EventKind>,
}

impl Settlement {
    fn failed(reason: ReasonCode, detail: Option<String>, release: ReleaseOutcome) -> Self {
        Self {
            status: ApplicationStatus::Failed,
            reason: Some(reason),
            detail,
            event: EventKind::ItemFailed,
            release,
            usage: UsageTotals::default(),
            questions: Vec::new(),
            calls: Vec::new(),
            pre_events: Vec::new(),
        }
    }
}

async fn process<E, N, C>(
    id: &WorkerId,
    deps: &WorkerDeps<E, N, C>,
    instance: &mut Option<E::Instance>,
    assignment: Assignment,
) where
    E: ExecutorAdapter,
    N: NotifyAdapter,
    C: Clock,
{
    let Assignment { item, effort, qa_required, max_item_duration, session_cancel, permit } =
        assignment;
    let session = item.session;
    let app = item.id;
    let domain = item.domain.clone();

    let started = deps
        .log
        .transition(
            app,
            ApplicationStatus::InProgress,
            None,
            None,
            EventRecord::new(session, EventKind::ItemStarted, deps.clock.epoch_ms())
                .application(app)
                .detail(format!("worker {id}")),
        )
        .await;
    if let Err(err) = started {
        deps.governor.release(&domain, ReleaseOutcome::Failed);
        report_fatal(deps, session, &err).await;
        drop(permit);
        return;
    }

    let exec = match instance.take() {
        Some(exec) => exec,
        None => deps.executor.create_instance(*id),
    };
    let request = RunRequest {
        application: app,
        job_url: item.job_url.clone(),
        domain: domain.clone(),
        effort,
        qa_required,
        resume_ref: item.resume_ref.clone(),
        profile_ref: item.profile_ref.clone(),
    };
    let handler: Arc<dyn InterventionHandler> = Arc::new(ItemInterventionHandler {
        log: deps.log.clone(),
        bridge: Arc::clone(&deps.bridge),
        clock: deps.clock.clone(),
        session,
        application: app,
    });

    let mut task = tokio::spawn(async move {
        let mut exec = exec;
        let outcome = exec.run_application(request, handler).await;
        (exec, outcome)
    });

    let end = tokio::select! {
        _ = session_cancel.cancelled() => {
            task.abort();
            let _ = (&mut task).await;
            RunEnd::Cancelled
        }
        joined = tokio::time::timeout(max_item_duration, &mut task) => match joined {
            Ok(Ok((exec, outcome))) => RunEnd::Finished(exec, outcome),
            Ok(Err(join_err)) if join_err.is_panic() => RunEnd::Panicked,
            Ok(Err(_)) => RunEnd::Cancelled,
            Err(_elapsed) => {
                task.abort();
                let _ = (&mut task).await;
                RunEnd::TimedOut
            }
        }
    };

    let settlement = match end {
        RunEnd::Finished(exec, Ok(RunOutcome::Submitted { questions, usage, calls })) => {
            // Successful run: keep the warm executor for the next item.
            *instance = Some(exec);
            Settlement {
                status: ApplicationStatus::Submitted,
                reason: None,
                detail: None,
                event: EventKind::ItemSubmitted,
                release: ReleaseOutcome::Submitted,
                usage,
                questions,
                calls,
                pre_events: Vec::new(),
            }
        }
        RunEnd::Finished(_, Ok(RunOutcome::Failed { detail, blocked, usage })) => {
            let reason =
                if blocked { ReasonCode::DomainBlocked } else { ReasonCode::ExecutorError };
            let release = if blocked { ReleaseOutcome::Blocked } else { ReleaseOutcome::Failed };
            Settlement { usage, ..Settlement::failed(reason, Some(detail), release) }
        }
        RunEnd::Finished(_, Ok(RunOutcome::NeedsIntervention { kind, resolution, usage })) => {
            settle_intervention(kind, resolution, usage)
        }
        RunEnd::Finished(_, Err(err)) => Settlement::failed(
            ReasonCode::ExecutorError,
            Some(err.to_string()),
            ReleaseOutcome::Failed,
        ),
        RunEnd::Panicked => Settlement {
            pre_events: vec![EventKind::WorkerCrashed],
            ..Settlement::failed(
                ReasonCode::WorkerException,
                Some("executor panicked".to_string()),
                ReleaseOutcome::Failed,
            )
        },
        RunEnd::TimedOut => Settlement::failed(
            ReasonCode::Timeout,
            Some(format!("exceeded {}s", max_item_duration.as_secs())),
            ReleaseOutcome::Timeout,
        ),
        RunEnd::Cancelled => Settlement {
            status: ApplicationStatus::Cancelled,
            event: EventKind::SessionCancelled,
            ..Settlement::failed(ReasonCode::SessionCancelled, None, ReleaseOutcome::Cancelled)
        },
    };

    apply_settlement(id, deps, session, app, &domain, settlement).await;
    drop(permit);
}

fn settle_intervention(
    kind: InterventionKind,
    resolution: Resolution,
    usage: UsageTotals,
) -> Settlement {
    let settlement = match resolution {
        Resolution::Timeout => Settlement {
            pre_events: vec![EventKind::InterventionTimeout],
            ..Settlement::failed(
                ReasonCode::InterventionTimeout,
                Some(kind.to_string()),
                ReleaseOutcome::Failed,
            )
        },
        Resolution::Skip => Settlement {
            status: ApplicationStatus::Skipped,
            event: EventKind::ItemSkipped,
            ..Settlement::failed(ReasonCode::InterventionSkipped, None, ReleaseOutcome::Failed)
        },
        Resolution::Abort => Settlement::failed(
            ReasonCode::InterventionAborted,
            Some(kind.to_string()),
            ReleaseOutcome::Failed,
        ),
        // The executor resumes on Continue; seeing it here means the run
        // ended without acting on the resolution.
        Resolution::Continue(_) => Settlement::failed(
            ReasonCode::ExecutorError,
            Some("executor returned an unresolved continue".to_string()),
            ReleaseOutcome::Failed,
        ),
    };
    Settlement { usage, ..settlement }
}

async fn apply_settlement<E, N, C>(
    id: &WorkerId,
    deps: &WorkerDeps<E, N, C>,
    session: SessionId,
    app: ApplicationId,
    domain: &str,
    settlement: Settlement,
) where
    E: ExecutorAdapter,
    N: NotifyAdapter,
    C: Clock,
{
    let Settlement { status, reason, detail, event, release, usage, questions, calls, pre_events } =
        settlement;

    for kind in pre_events {
        let record = EventRecord::new(session, kind, deps.clock.epoch_ms())
            .application(app)
            .detail(format!("worker {id}"));
        if let Err(err) = deps.log.append(record).await {
            deps.governor.release(domain, release);
            report_fatal(deps, session, &err).await;
            return;
        }
    }

    for draft in questions {
        if let Err(err) = deps.repo.append_question(app, draft).await {
            tracing::warn!(application = %app, error = %err, "failed to record question");
        }
    }
    if usage != UsageTotals::default() {
        if let Err(err) = deps
            .repo
            .add_application_counters(app, usage.tokens_in, usage.tokens_out, usage.cost)
            .await
        {
            tracing::warn!(application = %app, error = %err, "failed to record item usage");
        }
    }
    for call in calls {
        let row = ModelUsage {
            session,
            application: Some(app),
            provider: call.provider,
            model: call.model,
            purpose: call.purpose,
            tokens_in: call.tokens_in,
            tokens_out: call.tokens_out,
            cost: call.cost,
            started_at_ms: call.started_at_ms,
            ended_at_ms: call.ended_at_ms,
            status: if call.ok { UsageStatus::Ok } else { UsageStatus::Error },
        };
        if let Err(err) = deps.repo.append_usage(row).await {
            tracing::warn!(application = %app, error = %err, "failed to record model call");
        }
    }

    let record = EventRecord::new(session, event, deps.clock.epoch_ms()).application(app);
    let record = match &detail {
        Some(detail) => record.detail(detail.clone()),
        None => record,
    };
    if let Err(err) = deps.log.transition(app, status, reason, detail, record).await {
        deps.governor.release(domain, release);
        report_fatal(deps, session, &err).await;
        return;
    }

    let mut delta = CounterDelta::settle(status);
    delta.tokens_in = usage.tokens_in as i64;
    delta.tokens_out = usage.tokens_out as i64;
    delta.cost = usage.cost;
    if let Err(err) = deps.repo.add_session_counters(session, delta).await {
        tracing::warn!(%session, error = %err, "failed to settle session counters");
    }

    if let Some(blocked_until) = deps.governor.release(domain, release) {
        let record = EventRecord::new(session, EventKind::DomainBlocked, deps.clock.epoch_ms())
            .application(app)
            .detail(domain.to_string())
            .payload(serde_json::json!({ "blocked_until_ms": blocked_until }));
        if let Err(err) = deps.log.append(record).await {
            tracing::warn!(domain, error = %err, "failed to record domain block");
        }
    }
}

async fn report_fatal<E, N, C>(deps: &WorkerDeps<E, N, C>, session: SessionId, err: &StorageError)
where
    E: ExecutorAdapter,
    N: NotifyAdapter,
    C: Clock,
{
    tracing::error!(%session, error = %err, "event log write failed, reporting fatal");
    let _ = deps.fatal_tx.send((session, err.to_string())).await;
}

/// Worker-side callback the executor uses for out-of-band events.
///
/// Pauses the item, surfaces the request through the bridge, and resumes
/// the item when a human says continue. The paused item keeps holding
/// its governor slot for the whole intervention.
struct ItemInterventionHandler<N: NotifyAdapter, C: Clock> {
    log: EventLog,
    bridge: Arc<InterventionBridge<N>>,
    clock: C,
    session: SessionId,
    application: ApplicationId,
}

#[async_trait::async_trait]
impl<N: NotifyAdapter, C: Clock> InterventionHandler for ItemInterventionHandler<N, C> {
    async fn request(&self, kind: InterventionKind, payload: serde_json::Value) -> Resolution {
        // The pause transition carries the kind-specific event.
        let pause_event = match kind {
            InterventionKind::Captcha => EventKind::CaptchaFailed,
            InterventionKind::TwoFactor => EventKind::TwoFactorRequested,
            InterventionKind::SuspiciousActivity => EventKind::InterventionRequested,
        };
        let record = EventRecord::new(self.session, pause_event, self.clock.epoch_ms())
            .application(self.application)
            .payload(payload.clone());
        if let Err(err) = self
            .log
            .transition(self.application, ApplicationStatus::Paused, None, None, record)
            .await
        {
            tracing::error!(application = %self.application, error = %err,
                "failed to pause item for intervention");
        }
        if pause_event != EventKind::InterventionRequested {
            let record =
                EventRecord::new(self.session, EventKind::InterventionRequested, self.clock.epoch_ms())
                    .application(self.application)
                    .detail(kind.label());
            if let Err(err) = self.log.append(record).await {
                tracing::error!(application = %self.application, error = %err,
                    "failed to record intervention request");
            }
        }

        let resolution = self.bridge.request(kind, self.application, payload).await;

        if matches!(resolution, Resolution::Continue(_)) {
            let resume_event = match kind {
                InterventionKind::Captcha => EventKind::CaptchaSolved,
                InterventionKind::TwoFactor => EventKind::TwoFactorSupplied,
                InterventionKind::SuspiciousActivity => EventKind::InterventionResolved,
            };
            let record = EventRecord::new(self.session, resume_event, self.clock.epoch_ms())
                .application(self.application);
            if let Err(err) = self
                .log
                .transition(self.application, ApplicationStatus::InProgress, None, None, record)
                .await
            {
                tracing::error!(application = %self.application, error = %err,
                    "failed to resume item after intervention");
            }
        }
        resolution
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
