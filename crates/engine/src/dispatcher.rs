// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-session dispatch loop.
//!
//! Single logical loop: pick the best admissible item, evaluate policy,
//! consult the rate governor, and hand the item to a free worker. Items
//! the governor defers wait in a not-before queue; session limits are
//! checked before every acquire.

use crate::controller::CostCeilings;
use crate::governor::{Admission, RateGovernor};
use crate::worker::{Assignment, WorkerPool};
use lw_core::{
    ApplicationItem, Clock, EventKind, EventRecord, ReasonCode, SessionId, SessionLimits,
    SessionStatus,
};
use lw_policy::EffortPolicy;
use lw_storage::{CounterDelta, EventLog, Repository};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio_util::sync::CancellationToken;

/// Why the dispatch loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DispatchEnd {
    /// Ready and deferred queues empty with nothing in flight
    QueueDrained,
    /// One of the session limits tripped
    LimitsHit(&'static str),
    /// stop() or pause-into-drain requested
    Stopped,
    Cancelled,
    /// Event log unrecoverable; session must fail
    Fatal(String),
}

pub(crate) struct DispatcherCtx<C: Clock> {
    pub repo: Arc<dyn Repository>,
    pub log: EventLog,
    pub governor: Arc<RateGovernor<C>>,
    pub clock: C,
    pub effort_policy: Arc<EffortPolicy>,
    pub cost_ceilings: CostCeilings,
    pub session: SessionId,
    pub limits: SessionLimits,
    pub tz_offset_minutes: i32,
    pub cancel: CancellationToken,
    pub status_rx: watch::Receiver<SessionStatus>,
    pub item_rx: mpsc::Receiver<ApplicationItem>,
    pub semaphore: Arc<Semaphore>,
}

/// Heap entry ordered by `(score_bucket desc, enqueue_time asc)`, ties
/// broken by insertion order.
struct ReadyEntry {
    bucket: u8,
    enqueued_at_ms: u64,
    seq: u64,
    item: ApplicationItem,
}

impl ReadyEntry {
    fn key(&self) -> (u8, std::cmp::Reverse<u64>, std::cmp::Reverse<u64>) {
        (self.bucket, std::cmp::Reverse(self.enqueued_at_ms), std::cmp::Reverse(self.seq))
    }
}

impl PartialEq for ReadyEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ReadyEntry {}

impl PartialOrd for ReadyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReadyEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

struct DeferredEntry {
    not_before_ms: u64,
    entry: ReadyEntry,
}

pub(crate) async fn run_dispatcher<C: Clock>(
    mut ctx: DispatcherCtx<C>,
    pool: Arc<WorkerPool>,
) -> DispatchEnd {
    let mut ready: BinaryHeap<ReadyEntry> = BinaryHeap::new();
    let mut deferred: Vec<DeferredEntry> = Vec::new();
    let mut insert_seq: u64 = 0;
    // Guards against an enqueue racing the seed below: an item may arrive
    // both from list_queued and over item_rx.
    let mut seen: std::collections::HashSet<lw_core::ApplicationId> =
        std::collections::HashSet::new();
    let mut assignment_retries: HashMap<lw_core::ApplicationId, u32> = HashMap::new();

    // Seed from the persisted queue; later enqueues arrive on item_rx.
    match ctx.repo.list_queued(ctx.session, usize::MAX).await {
        Ok(items) => {
            for item in items {
                push_ready(&mut ready, &mut insert_seq, &mut seen, item);
            }
        }
        Err(err) => return DispatchEnd::Fatal(err.to_string()),
    }

    loop {
        // Fold in any newly enqueued items.
        while let Ok(item) = ctx.item_rx.try_recv() {
            push_ready(&mut ready, &mut insert_seq, &mut seen, item);
        }

        let status = *ctx.status_rx.borrow();
        match status {
            SessionStatus::Running => {}
            SessionStatus::Paused => {
                tokio::select! {
                    _ = ctx.cancel.cancelled() => return DispatchEnd::Cancelled,
                    changed = ctx.status_rx.changed() => {
                        if changed.is_err() {
                            return DispatchEnd::Stopped;
                        }
                    }
                }
                continue;
            }
            SessionStatus::Draining => return DispatchEnd::Stopped,
            SessionStatus::Cancelling => return DispatchEnd::Cancelled,
            SessionStatus::Failing => return DispatchEnd::Fatal(String::new()),
            _ => return DispatchEnd::Stopped,
        }

        let now = ctx.clock.epoch_ms();
        if let Err(err) = ctx.repo.heartbeat_session(ctx.session, now).await {
            tracing::warn!(session = %ctx.session, error = %err, "heartbeat failed");
        }

        // Session limit checks, before any admission.
        let session_row = match ctx.repo.get_session(ctx.session).await {
            Ok(row) => row,
            Err(err) => return DispatchEnd::Fatal(err.to_string()),
        };
        if session_row.counters.attempted >= ctx.limits.max_items {
            return DispatchEnd::LimitsHit("max_items");
        }
        if session_row.elapsed_ms(now) >= ctx.limits.max_duration.as_millis() as u64 {
            return DispatchEnd::LimitsHit("max_duration");
        }

        // Promote deferred items whose deadline passed.
        let mut idx = 0;
        while idx < deferred.len() {
            if deferred[idx].not_before_ms <= now {
                let promoted = deferred.swap_remove(idx);
                ready.push(promoted.entry);
            } else {
                idx += 1;
            }
        }

        let Some(entry) = ready.pop() else {
            let in_flight =
                ctx.limits.max_concurrency as usize - ctx.semaphore.available_permits();
            if deferred.is_empty() && in_flight == 0 {
                return DispatchEnd::QueueDrained;
            }
            // Nothing admissible right now: sleep until the earliest
            // deferral deadline (or a short beat), wake early for new
            // items, status changes, or cancellation.
            let earliest = deferred.iter().map(|d| d.not_before_ms).min();
            let wait_ms = earliest
                .map(|at| at.saturating_sub(now).clamp(10, 60_000))
                .unwrap_or(200);
            tokio::select! {
                _ = ctx.cancel.cancelled() => return DispatchEnd::Cancelled,
                _ = ctx.status_rx.changed() => {}
                item = ctx.item_rx.recv() => {
                    if let Some(item) = item {
                        push_ready(&mut ready, &mut insert_seq, &mut seen, item);
                    }
                }
                _ = tokio::time::sleep(Duration::from_millis(wait_ms)) => {}
            }
            continue;
        };
        let ReadyEntry { bucket, enqueued_at_ms, seq, item } = entry;
        let app_id = item.id;
        let domain = item.domain.clone();

        // Effort decision on frozen signals.
        let domain_policy = ctx.governor.policy_for(&item.domain);
        let decision = lw_policy::evaluate(&item.signals, &domain_policy, &ctx.effort_policy);

        if let Some(reason) = decision.skip_reason {
            if let Some(end) = mark_skipped(&ctx, &item, reason).await {
                return end;
            }
            continue;
        }

        // Budget guard: admitting this item at its effort ceiling must
        // not overrun the session budget.
        let ceiling = ctx.cost_ceilings.for_effort(decision.effort);
        if session_row.counters.cost + ceiling > ctx.limits.budget_cost {
            return DispatchEnd::LimitsHit("budget");
        }

        if let Err(err) = ctx
            .repo
            .set_application_decision(item.id, decision.effort, decision.qa_required)
            .await
        {
            return DispatchEnd::Fatal(err.to_string());
        }

        match ctx.governor.try_acquire(&item.domain, ctx.tz_offset_minutes) {
            Admission::Reject { reason } => {
                if let Some(end) = mark_skipped(&ctx, &item, reason).await {
                    return end;
                }
                continue;
            }
            Admission::Defer { earliest_epoch_ms } => {
                let record =
                    EventRecord::new(ctx.session, EventKind::RateLimitApplied, now)
                        .application(app_id)
                        .detail(domain.clone())
                        .payload(serde_json::json!({ "earliest_epoch_ms": earliest_epoch_ms }));
                if let Err(err) = ctx.log.append(record).await {
                    return DispatchEnd::Fatal(err.to_string());
                }
                deferred.push(DeferredEntry {
                    not_before_ms: earliest_epoch_ms,
                    entry: ReadyEntry { bucket, enqueued_at_ms, seq, item },
                });
                continue;
            }
            Admission::Admit => {}
        }

        // Hold the domain slot while waiting for capacity; both waits are
        // cancellation-aware.
        let permit = tokio::select! {
            _ = ctx.cancel.cancelled() => {
                ctx.governor.release(&domain, crate::governor::ReleaseOutcome::Cancelled);
                return DispatchEnd::Cancelled;
            }
            permit = Arc::clone(&ctx.semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return DispatchEnd::Stopped,
            },
        };
        let Some((worker, tx)) = pool.checkout(&ctx.cancel).await else {
            ctx.governor.release(&domain, crate::governor::ReleaseOutcome::Cancelled);
            return DispatchEnd::Cancelled;
        };

        // The waits above can outlive a pause or stop; never hand out
        // work unless the session is still running.
        if !ctx.status_rx.borrow().accepts_dispatch() {
            ctx.governor.release(&domain, crate::governor::ReleaseOutcome::Cancelled);
            drop(permit);
            ready.push(ReadyEntry { bucket, enqueued_at_ms, seq, item });
            continue;
        }

        if let Err(err) = ctx.repo.add_session_counters(ctx.session, CounterDelta::attempt()).await
        {
            ctx.governor.release(&domain, crate::governor::ReleaseOutcome::Failed);
            return DispatchEnd::Fatal(err.to_string());
        }

        let assignment = Assignment {
            item,
            effort: decision.effort,
            qa_required: decision.qa_required,
            max_item_duration: ctx.limits.max_item_duration,
            session_cancel: ctx.cancel.clone(),
            permit,
        };
        if let Err(send_err) = tx.send(assignment).await {
            // Worker died between announcing idle and receiving work.
            let item = send_err.0.item;
            ctx.governor.release(&domain, crate::governor::ReleaseOutcome::Failed);
            let rollback = CounterDelta { attempted: -1, in_flight: -1, ..Default::default() };
            if let Err(err) = ctx.repo.add_session_counters(ctx.session, rollback).await {
                tracing::warn!(session = %ctx.session, error = %err, "counter rollback failed");
            }

            let retries = assignment_retries.entry(app_id).or_insert(0);
            *retries += 1;
            if *retries == 1 {
                tracing::warn!(application = %app_id, worker = %worker,
                    "assignment failed, requeueing once with backoff");
                deferred.push(DeferredEntry {
                    not_before_ms: now + 500,
                    entry: ReadyEntry { bucket, enqueued_at_ms, seq, item },
                });
            } else if let Some(end) = mark_failed_unassignable(&ctx, &item).await {
                return end;
            }
            continue;
        }
        tracing::info!(application = %app_id, worker = %worker, session = %ctx.session,
            "item dispatched");
    }
}

fn push_ready(
    ready: &mut BinaryHeap<ReadyEntry>,
    insert_seq: &mut u64,
    seen: &mut std::collections::HashSet<lw_core::ApplicationId>,
    item: ApplicationItem,
) {
    if !seen.insert(item.id) {
        return;
    }
    *insert_seq += 1;
    ready.push(ReadyEntry {
        bucket: item.score_bucket(),
        enqueued_at_ms: item.enqueued_at_ms,
        seq: *insert_seq,
        item,
    });
}

/// Skip an item before dispatch. Skips count as attempts.
async fn mark_skipped<C: Clock>(
    ctx: &DispatcherCtx<C>,
    item: &ApplicationItem,
    reason: ReasonCode,
) -> Option<DispatchEnd> {
    let record = EventRecord::new(ctx.session, EventKind::ItemSkipped, ctx.clock.epoch_ms())
        .application(item.id)
        .detail(reason.label());
    if let Err(err) = ctx
        .log
        .transition(item.id, lw_core::ApplicationStatus::Skipped, Some(reason), None, record)
        .await
    {
        return Some(DispatchEnd::Fatal(err.to_string()));
    }
    let delta = CounterDelta { attempted: 1, skipped: 1, ..Default::default() };
    if let Err(err) = ctx.repo.add_session_counters(ctx.session, delta).await {
        return Some(DispatchEnd::Fatal(err.to_string()));
    }
    None
}

/// Second assignment failure for the same item: give up on it.
async fn mark_failed_unassignable<C: Clock>(
    ctx: &DispatcherCtx<C>,
    item: &ApplicationItem,
) -> Option<DispatchEnd> {
    let record = EventRecord::new(ctx.session, EventKind::ItemFailed, ctx.clock.epoch_ms())
        .application(item.id)
        .detail("worker assignment failed twice");
    if let Err(err) = ctx
        .log
        .transition(
            item.id,
            lw_core::ApplicationStatus::Failed,
            Some(ReasonCode::Unknown),
            Some("worker assignment failed".to_string()),
            record,
        )
        .await
    {
        return Some(DispatchEnd::Fatal(err.to_string()));
    }
    let delta = CounterDelta { attempted: 1, failed: 1, ..Default::default() };
    if let Err(err) = ctx.repo.add_session_counters(ctx.session, delta).await {
        return Some(DispatchEnd::Fatal(err.to_string()));
    }
    None
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
