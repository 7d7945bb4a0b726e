// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session controller: lifecycle, budgets, recovery, digest.
//!
//! The engine is the process's composition root for the control plane:
//! it owns the worker pool, the rate governor, and the intervention
//! bridge, and runs one dispatcher task per live session. Nothing here
//! is a global; callers hold the `Engine` value.

use crate::bridge::InterventionBridge;
use crate::dispatcher::{run_dispatcher, DispatchEnd, DispatcherCtx};
use crate::digest;
use crate::error::EngineError;
use crate::governor::{DomainSummary, RateGovernor};
use crate::worker::{WorkerDeps, WorkerPool};
use lw_adapters::{ExecutorAdapter, MatcherAdapter, NotifyAdapter, NotifyKind, Resolution};
use lw_core::{
    ApplicationId, ApplicationItem, ApplicationStatus, Clock, Effort, EventKind, EventRecord,
    ReasonCode, Session, SessionConfig, SessionId, SessionStatus, Signals,
};
use lw_policy::{EffortPolicy, StealthPolicy};
use lw_storage::{CounterDelta, EventLog, Repository, RetryPolicy};
use parking_lot::Mutex;
use sha2::{Digest as _, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio_util::sync::CancellationToken;

/// Per-effort cost ceilings used by the budget guard: dispatching an
/// item may overrun the budget by at most one ceiling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostCeilings {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl Default for CostCeilings {
    fn default() -> Self {
        Self { low: 0.02, medium: 0.10, high: 0.30 }
    }
}

impl CostCeilings {
    pub fn for_effort(&self, effort: Effort) -> f64 {
        match effort {
            Effort::Low => self.low,
            Effort::Medium => self.medium,
            Effort::High => self.high,
        }
    }
}

/// Engine-level tunables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Worker pool size (process-wide concurrency ceiling)
    pub pool_size: usize,
    /// Deadline for human interventions
    pub intervention_timeout: Duration,
    /// Heartbeat age beyond which a session counts as orphaned
    pub heartbeat_expiry: Duration,
    /// Event-log retry schedule
    pub retry: RetryPolicy,
    pub cost_ceilings: CostCeilings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_size: 5,
            intervention_timeout: Duration::from_secs(300),
            heartbeat_expiry: Duration::from_secs(90),
            retry: RetryPolicy::default(),
            cost_ceilings: CostCeilings::default(),
        }
    }
}

/// Live view returned by `status()`.
#[derive(Debug, Clone)]
pub struct SessionStatusReport {
    pub session: Session,
    pub in_flight: u32,
    pub domain_summary: Vec<DomainSummary>,
    pub pending_interventions: usize,
}

/// Per-session runtime state owned by the controller.
struct SessionHandle {
    status_tx: watch::Sender<SessionStatus>,
    cancel: CancellationToken,
    item_tx: mpsc::Sender<ApplicationItem>,
}

/// The execution control plane.
pub struct Engine<M, N, C>
where
    M: MatcherAdapter,
    N: NotifyAdapter,
    C: Clock,
{
    repo: Arc<dyn Repository>,
    log: EventLog,
    matcher: M,
    notifier: N,
    clock: C,
    config: EngineConfig,
    effort_policy: Arc<EffortPolicy>,
    stealth: Arc<StealthPolicy>,
    governor: Arc<RateGovernor<C>>,
    bridge: Arc<InterventionBridge<N>>,
    pool: Arc<WorkerPool>,
    sessions: Arc<Mutex<HashMap<SessionId, SessionHandle>>>,
    shutdown: CancellationToken,
}

impl<M, N, C> Engine<M, N, C>
where
    M: MatcherAdapter,
    N: NotifyAdapter,
    C: Clock,
{
    /// Build the engine and start its worker pool.
    pub fn new<E: ExecutorAdapter>(
        executor: E,
        matcher: M,
        notifier: N,
        clock: C,
        repo: Arc<dyn Repository>,
        effort_policy: EffortPolicy,
        stealth: StealthPolicy,
        config: EngineConfig,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let log = EventLog::new(Arc::clone(&repo), config.retry.clone());
        let governor = Arc::new(RateGovernor::new(clock.clone(), stealth.default.clone()));
        let bridge =
            Arc::new(InterventionBridge::new(notifier.clone(), config.intervention_timeout));
        let (fatal_tx, fatal_rx) = mpsc::channel(16);

        let pool = Arc::new(WorkerPool::start(
            config.pool_size,
            WorkerDeps {
                executor,
                repo: Arc::clone(&repo),
                log: log.clone(),
                governor: Arc::clone(&governor),
                bridge: Arc::clone(&bridge),
                clock: clock.clone(),
                fatal_tx,
            },
            shutdown.child_token(),
        ));

        let engine = Self {
            repo,
            log,
            matcher,
            notifier,
            clock,
            config,
            effort_policy: Arc::new(effort_policy),
            stealth: Arc::new(stealth),
            governor,
            bridge,
            pool,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            shutdown,
        };
        engine.spawn_fatal_monitor(fatal_rx);
        engine
    }

    /// Create a session in `planned` status.
    pub async fn create_session(&self, config: &SessionConfig) -> Result<SessionId, EngineError> {
        let session = Session::new(config, self.clock.epoch_ms());
        let id = session.id;
        self.repo.create_session(session).await?;
        tracing::info!(session = %id, user = %config.user_id, "session created");
        Ok(id)
    }

    /// Score and enqueue job URLs as application items.
    pub async fn enqueue_items(
        &self,
        session: SessionId,
        job_urls: &[String],
    ) -> Result<Vec<ApplicationId>, EngineError> {
        let row = self.repo.get_session(session).await?;
        if row.is_terminal() {
            return Err(EngineError::InvalidState(format!("session {session} is terminal")));
        }

        let mut ids = Vec::with_capacity(job_urls.len());
        for url in job_urls {
            let domain = lw_core::domain_from_url(url)?;
            let score = self.matcher.score(url).await?;
            let item = ApplicationItem::new(
                session,
                row.user_id.clone(),
                url.clone(),
                domain,
                Signals {
                    hint_effort: Effort::Medium,
                    match_score: score,
                    company_tier: String::new(),
                },
                self.clock.epoch_ms(),
            );
            let id = item.id;
            self.repo.create_application(item.clone()).await?;
            self.log
                .append(
                    EventRecord::new(session, EventKind::ItemQueued, self.clock.epoch_ms())
                        .application(id)
                        .detail(item.domain.clone()),
                )
                .await?;

            // Feed a live dispatcher directly.
            let item_tx =
                self.sessions.lock().get(&session).map(|handle| handle.item_tx.clone());
            if let Some(tx) = item_tx {
                let _ = tx.send(item).await;
            }
            ids.push(id);
        }
        Ok(ids)
    }

    /// Start dispatching: loads domain policies into the governor,
    /// snapshots config, spawns the dispatcher.
    pub async fn start(&self, session: SessionId) -> Result<(), EngineError> {
        let row = self.repo.get_session(session).await?;
        if row.status != SessionStatus::Planned {
            return Err(EngineError::InvalidState(format!(
                "session {session} is {}, expected planned",
                row.status
            )));
        }

        // File-configured stealth policies, overridden by repository rows.
        let mut policies = self.stealth.domains.clone();
        for (domain, policy) in self.repo.load_domain_policies().await? {
            policies.insert(domain, policy);
        }
        self.governor.load_policies(&policies);

        let config_hash = snapshot_hash(&row, &policies)?;
        self.repo.set_session_config_hash(session, config_hash).await?;

        let row = self
            .repo
            .update_session_status(session, SessionStatus::Running, self.clock.epoch_ms())
            .await?;

        let (status_tx, status_rx) = watch::channel(SessionStatus::Running);
        let (item_tx, item_rx) = mpsc::channel(256);
        let cancel = self.shutdown.child_token();
        let semaphore = Arc::new(Semaphore::new(row.limits.max_concurrency.max(1) as usize));

        let ctx = DispatcherCtx {
            repo: Arc::clone(&self.repo),
            log: self.log.clone(),
            governor: Arc::clone(&self.governor),
            clock: self.clock.clone(),
            effort_policy: Arc::clone(&self.effort_policy),
            cost_ceilings: self.config.cost_ceilings,
            session,
            limits: row.limits.clone(),
            tz_offset_minutes: row.timezone_offset_minutes,
            cancel: cancel.clone(),
            status_rx,
            item_rx,
            semaphore: Arc::clone(&semaphore),
        };

        self.sessions.lock().insert(session, SessionHandle { status_tx, cancel, item_tx });

        let finalizer = Finalizer {
            repo: Arc::clone(&self.repo),
            log: self.log.clone(),
            notifier: self.notifier.clone(),
            clock: self.clock.clone(),
            sessions: Arc::clone(&self.sessions),
            session,
            semaphore,
            max_concurrency: row.limits.max_concurrency.max(1),
        };
        let pool = Arc::clone(&self.pool);
        tokio::spawn(async move {
            let end = run_dispatcher(ctx, pool).await;
            finalizer.finish(end).await;
        });

        tracing::info!(session = %session, "session started");
        Ok(())
    }

    /// Stop picking new items; in-flight items complete.
    pub async fn pause(&self, session: SessionId) -> Result<(), EngineError> {
        self.repo
            .update_session_status(session, SessionStatus::Paused, self.clock.epoch_ms())
            .await?;
        self.with_handle(session, |handle| {
            let _ = handle.status_tx.send(SessionStatus::Paused);
        })?;
        self.log
            .append(EventRecord::new(session, EventKind::SessionPaused, self.clock.epoch_ms()))
            .await?;
        Ok(())
    }

    /// Resume a paused session.
    pub async fn resume(&self, session: SessionId) -> Result<(), EngineError> {
        self.repo
            .update_session_status(session, SessionStatus::Running, self.clock.epoch_ms())
            .await?;
        self.with_handle(session, |handle| {
            let _ = handle.status_tx.send(SessionStatus::Running);
        })?;
        self.log
            .append(EventRecord::new(session, EventKind::SessionResumed, self.clock.epoch_ms()))
            .await?;
        Ok(())
    }

    /// Graceful drain: no new items, wait for in-flight, then digest.
    pub async fn stop(&self, session: SessionId) -> Result<(), EngineError> {
        self.repo
            .update_session_status(session, SessionStatus::Draining, self.clock.epoch_ms())
            .await?;
        self.with_handle(session, |handle| {
            let _ = handle.status_tx.send(SessionStatus::Draining);
        })?;
        Ok(())
    }

    /// Cooperative cancellation: workers abandon their items.
    pub async fn cancel(&self, session: SessionId) -> Result<(), EngineError> {
        self.repo
            .update_session_status(session, SessionStatus::Cancelling, self.clock.epoch_ms())
            .await?;
        self.with_handle(session, |handle| {
            let _ = handle.status_tx.send(SessionStatus::Cancelling);
            handle.cancel.cancel();
        })?;
        Ok(())
    }

    /// Live counters, per-domain view, and pending interventions.
    pub async fn status(&self, session: SessionId) -> Result<SessionStatusReport, EngineError> {
        let row = self.repo.get_session(session).await?;
        Ok(SessionStatusReport {
            in_flight: row.counters.in_flight,
            session: row,
            domain_summary: self.governor.snapshot(),
            pending_interventions: self.bridge.pending_count(),
        })
    }

    /// Deliver a human resolution for a paused application.
    pub async fn resolve_intervention(
        &self,
        application: ApplicationId,
        resolution: Resolution,
    ) -> Result<bool, EngineError> {
        let item = self.repo.get_application(application).await?;
        let action = match &resolution {
            Resolution::Continue(_) => "continue",
            Resolution::Skip => "skip",
            Resolution::Abort => "abort",
            Resolution::Timeout => "timeout",
        };
        let delivered = self.bridge.resolve(application, resolution);
        if delivered {
            self.log
                .append(
                    EventRecord::new(
                        item.session,
                        EventKind::InterventionResolved,
                        self.clock.epoch_ms(),
                    )
                    .application(application)
                    .detail(action),
                )
                .await?;
        }
        Ok(delivered)
    }

    /// Block until the session reaches a terminal status.
    pub async fn wait(&self, session: SessionId) -> Result<Session, EngineError> {
        loop {
            let row = self.repo.get_session(session).await?;
            if row.is_terminal() {
                return Ok(row);
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    /// Recovery sweep: fail sessions whose owning process died.
    ///
    /// Never resumes work automatically; in-progress items of a dead
    /// session are failed as orphaned. Returns the number of sessions
    /// swept.
    pub async fn recover(&self) -> Result<u32, EngineError> {
        let now = self.clock.epoch_ms();
        let expiry_ms = self.config.heartbeat_expiry.as_millis() as u64;
        let mut swept = 0;

        for row in self.repo.list_non_terminal_sessions().await? {
            if self.sessions.lock().contains_key(&row.id) {
                continue; // owned by this process
            }
            if now.saturating_sub(row.heartbeat_at_ms) < expiry_ms {
                continue;
            }
            tracing::warn!(session = %row.id, "sweeping session from dead process");

            for item in self.repo.list_in_progress(row.id).await? {
                let record = EventRecord::new(row.id, EventKind::ItemFailed, now)
                    .application(item.id)
                    .detail("orphaned by process death");
                self.log
                    .transition(
                        item.id,
                        ApplicationStatus::Failed,
                        Some(ReasonCode::Orphaned),
                        None,
                        record,
                    )
                    .await?;
                self.repo
                    .add_session_counters(row.id, CounterDelta::settle(ApplicationStatus::Failed))
                    .await?;
            }

            fail_session_row(&self.repo, &self.log, &self.notifier, row.id, "process_died", now)
                .await;
            swept += 1;
        }
        Ok(swept)
    }

    /// Stop the pool and every live dispatcher.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.pool.shutdown();
    }

    fn with_handle(
        &self,
        session: SessionId,
        f: impl FnOnce(&SessionHandle),
    ) -> Result<(), EngineError> {
        let sessions = self.sessions.lock();
        match sessions.get(&session) {
            Some(handle) => {
                f(handle);
                Ok(())
            }
            None => Err(EngineError::UnknownSession(session.to_string())),
        }
    }

    fn spawn_fatal_monitor(&self, mut fatal_rx: mpsc::Receiver<(SessionId, String)>) {
        let repo = Arc::clone(&self.repo);
        let log = self.log.clone();
        let notifier = self.notifier.clone();
        let clock = self.clock.clone();
        let sessions = Arc::clone(&self.sessions);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    received = fatal_rx.recv() => received,
                };
                let Some((session, detail)) = received else { break };
                tracing::error!(%session, detail, "fatal session failure reported");
                {
                    let mut handles = sessions.lock();
                    if let Some(handle) = handles.remove(&session) {
                        let _ = handle.status_tx.send(SessionStatus::Failing);
                        handle.cancel.cancel();
                    }
                }
                // Workers report per item; only the first report fails
                // the session.
                let already_terminal = matches!(
                    repo.get_session(session).await,
                    Ok(row) if row.is_terminal()
                );
                if !already_terminal {
                    fail_session_row(&repo, &log, &notifier, session, &detail, clock.epoch_ms())
                        .await;
                }
            }
        });
    }
}

/// Config snapshot hash: canonical JSON of the limits plus the effective
/// domain-policy table, recorded so a digest can prove which policy
/// produced it.
fn snapshot_hash(
    row: &Session,
    policies: &std::collections::BTreeMap<String, lw_core::DomainPolicy>,
) -> Result<String, EngineError> {
    let snapshot = serde_json::json!({
        "limits": row.limits,
        "timezone_offset_minutes": row.timezone_offset_minutes,
        "domain_policies": policies,
    });
    let canonical = serde_json::to_string(&snapshot)
        .map_err(|err| EngineError::InvalidState(format!("unserializable config: {err}")))?;
    Ok(format!("{:x}", Sha256::digest(canonical.as_bytes())))
}

/// Move a session to `failed`, best-effort logging and notification.
async fn fail_session_row<N: NotifyAdapter>(
    repo: &Arc<dyn Repository>,
    log: &EventLog,
    notifier: &N,
    session: SessionId,
    detail: &str,
    now: u64,
) {
    if let Err(err) = repo.update_session_status(session, SessionStatus::Failing, now).await {
        tracing::warn!(%session, error = %err, "could not mark session failing");
    }
    if let Err(err) = repo.update_session_status(session, SessionStatus::Failed, now).await {
        tracing::warn!(%session, error = %err, "could not mark session failed");
    }
    let record =
        EventRecord::new(session, EventKind::SessionFailed, now).detail(detail.to_string());
    if let Err(err) = log.append(record).await {
        tracing::warn!(%session, error = %err, "could not log session failure");
    }
    let payload = serde_json::json!({ "session": session.to_string(), "detail": detail });
    if let Err(err) = notifier.notify(NotifyKind::FatalError, &payload).await {
        tracing::warn!(%session, error = %err, "fatal notification failed");
    }
}

/// Runs after the dispatcher returns: quiesce, finalize status, digest.
struct Finalizer<N: NotifyAdapter, C: Clock> {
    repo: Arc<dyn Repository>,
    log: EventLog,
    notifier: N,
    clock: C,
    sessions: Arc<Mutex<HashMap<SessionId, SessionHandle>>>,
    session: SessionId,
    semaphore: Arc<Semaphore>,
    max_concurrency: u32,
}

impl<N: NotifyAdapter, C: Clock> Finalizer<N, C> {
    async fn finish(self, end: DispatchEnd) {
        tracing::info!(session = %self.session, ?end, "dispatch ended");
        match end {
            DispatchEnd::QueueDrained | DispatchEnd::LimitsHit(_) | DispatchEnd::Stopped => {
                self.complete().await;
            }
            DispatchEnd::Cancelled => self.cancelled().await,
            DispatchEnd::Fatal(detail) => {
                self.quiesce().await;
                // The fatal monitor may already have failed the session.
                let already_terminal = matches!(
                    self.repo.get_session(self.session).await,
                    Ok(row) if row.is_terminal()
                );
                if !already_terminal {
                    fail_session_row(
                        &self.repo,
                        &self.log,
                        &self.notifier,
                        self.session,
                        &detail,
                        self.clock.epoch_ms(),
                    )
                    .await;
                }
            }
        }
        self.sessions.lock().remove(&self.session);
    }

    /// Wait for every in-flight worker to settle.
    async fn quiesce(&self) {
        match self.semaphore.acquire_many(self.max_concurrency).await {
            Ok(permits) => drop(permits),
            Err(_) => tracing::warn!(session = %self.session, "semaphore closed during drain"),
        }
    }

    async fn complete(&self) {
        let now = self.clock.epoch_ms();
        // stop() already moved the row to draining; limit/queue drains
        // arrive here still running.
        if let Ok(row) = self.repo.get_session(self.session).await {
            if matches!(row.status, SessionStatus::Running | SessionStatus::Paused) {
                if let Err(err) =
                    self.repo.update_session_status(self.session, SessionStatus::Draining, now).await
                {
                    tracing::warn!(session = %self.session, error = %err, "drain update failed");
                }
            }
        }
        self.quiesce().await;

        let now = self.clock.epoch_ms();
        let digest = match digest::build(&self.repo, self.session, now).await {
            Ok(digest) => digest,
            Err(err) => {
                fail_session_row(
                    &self.repo,
                    &self.log,
                    &self.notifier,
                    self.session,
                    &format!("digest build failed: {err}"),
                    now,
                )
                .await;
                return;
            }
        };
        if let Err(err) = self.repo.upsert_digest(digest.clone()).await {
            tracing::warn!(session = %self.session, error = %err, "digest persist failed");
        }
        if let Err(err) =
            self.repo.update_session_status(self.session, SessionStatus::Completed, now).await
        {
            tracing::warn!(session = %self.session, error = %err, "completion update failed");
        }
        if let Err(err) = self
            .log
            .append(EventRecord::new(self.session, EventKind::SessionCompleted, now))
            .await
        {
            tracing::warn!(session = %self.session, error = %err, "completion event failed");
        }
        let payload = serde_json::json!({
            "session": self.session.to_string(),
            "counters": digest.counters,
            "duration_ms": digest.duration_ms,
        });
        if let Err(err) = self.notifier.notify(NotifyKind::SessionDigest, &payload).await {
            tracing::warn!(session = %self.session, error = %err, "digest notification failed");
        }
        tracing::info!(session = %self.session, "session completed");
    }

    async fn cancelled(&self) {
        self.quiesce().await;
        let now = self.clock.epoch_ms();

        // Items never dispatched are closed out without counting as
        // attempts.
        match self.repo.list_queued(self.session, usize::MAX).await {
            Ok(queued) => {
                for item in queued {
                    let record = EventRecord::new(self.session, EventKind::SessionCancelled, now)
                        .application(item.id);
                    if let Err(err) = self
                        .log
                        .transition(
                            item.id,
                            ApplicationStatus::Cancelled,
                            Some(ReasonCode::SessionCancelled),
                            None,
                            record,
                        )
                        .await
                    {
                        tracing::warn!(application = %item.id, error = %err,
                            "failed to cancel queued item");
                    }
                }
            }
            Err(err) => {
                tracing::warn!(session = %self.session, error = %err, "queued sweep failed")
            }
        }

        if let Err(err) =
            self.repo.update_session_status(self.session, SessionStatus::Cancelled, now).await
        {
            tracing::warn!(session = %self.session, error = %err, "cancel update failed");
        }
        if let Err(err) = self
            .log
            .append(EventRecord::new(self.session, EventKind::SessionCancelled, now))
            .await
        {
            tracing::warn!(session = %self.session, error = %err, "cancel event failed");
        }
        tracing::info!(session = %self.session, "session cancelled");
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
