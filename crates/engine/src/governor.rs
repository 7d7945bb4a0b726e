// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-domain admission control.
//!
//! One entry per target host enforces the daily cap, the minimum spacing
//! between starts, the concurrency ceiling, the avoid flag, and the
//! tripwire cooldown. All mutation happens inside the table lock; the
//! lock is never held across an await.

use lw_core::{Clock, DomainPolicy, ReasonCode};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

const MS_PER_DAY: u64 = 86_400_000;

/// Result of an admission attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    Admit,
    /// Come back no earlier than this instant (epoch ms, non-decreasing
    /// across racing attempts for the same domain)
    Defer { earliest_epoch_ms: u64 },
    /// Unrecoverable today (avoid flag, day cap reached)
    Reject { reason: ReasonCode },
}

/// Terminal outcome reported when a slot is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Submitted,
    Failed,
    /// Domain tripwire fired; starts the cooldown
    Blocked,
    Timeout,
    Cancelled,
}

/// Live per-domain view for `status()` reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainSummary {
    pub domain: String,
    pub applications_today: u32,
    pub in_flight: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_until_ms: Option<u64>,
    pub avoid: bool,
}

struct DomainEntry {
    policy: DomainPolicy,
    applications_today: u32,
    /// Local-day number `applications_today` belongs to
    day: i64,
    last_started_at_ms: Option<u64>,
    in_flight: u32,
    blocked_until_ms: Option<u64>,
}

impl DomainEntry {
    fn new(policy: DomainPolicy) -> Self {
        Self {
            policy,
            applications_today: 0,
            day: i64::MIN,
            last_started_at_ms: None,
            in_flight: 0,
            blocked_until_ms: None,
        }
    }

    /// Lazy daily reset: roll the counter when the local day changes.
    fn roll_day(&mut self, now_ms: u64, tz_offset_minutes: i32) {
        let local = now_ms as i64 + tz_offset_minutes as i64 * 60_000;
        let day = local.div_euclid(MS_PER_DAY as i64);
        if day != self.day {
            self.day = day;
            self.applications_today = 0;
        }
    }
}

/// Token-bucket-like admission per domain. Shared across sessions; a
/// single process owns all stealth accounting for its targets.
pub struct RateGovernor<C: Clock> {
    clock: C,
    default_policy: DomainPolicy,
    domains: Mutex<HashMap<String, DomainEntry>>,
}

impl<C: Clock> RateGovernor<C> {
    pub fn new(clock: C, default_policy: DomainPolicy) -> Self {
        Self { clock, default_policy, domains: Mutex::new(HashMap::new()) }
    }

    /// Install or replace policies (session start).
    pub fn load_policies(&self, policies: &BTreeMap<String, DomainPolicy>) {
        let mut domains = self.domains.lock();
        for (domain, policy) in policies {
            domains
                .entry(domain.clone())
                .and_modify(|entry| entry.policy = policy.clone())
                .or_insert_with(|| DomainEntry::new(policy.clone()));
        }
    }

    /// Effective policy for a domain (falls back to the default).
    pub fn policy_for(&self, domain: &str) -> DomainPolicy {
        self.domains
            .lock()
            .get(domain)
            .map(|entry| entry.policy.clone())
            .unwrap_or_else(|| self.default_policy.clone())
    }

    /// May one more request start on `domain` right now?
    ///
    /// On admit the slot is taken: `in_flight` incremented,
    /// `last_started_at` set, `applications_today` incremented. Exactly
    /// one of two racing callers can win.
    pub fn try_acquire(&self, domain: &str, tz_offset_minutes: i32) -> Admission {
        let now = self.clock.epoch_ms();
        let mut domains = self.domains.lock();
        let entry = domains
            .entry(domain.to_string())
            .or_insert_with(|| DomainEntry::new(self.default_policy.clone()));

        entry.roll_day(now, tz_offset_minutes);

        if entry.policy.avoid {
            return Admission::Reject { reason: ReasonCode::RateRejected };
        }
        if entry.applications_today >= entry.policy.max_per_day {
            return Admission::Reject { reason: ReasonCode::RateRejected };
        }
        if let Some(blocked_until) = entry.blocked_until_ms {
            if now < blocked_until {
                return Admission::Defer { earliest_epoch_ms: blocked_until };
            }
            entry.blocked_until_ms = None;
        }
        if entry.in_flight >= entry.policy.max_concurrent {
            // No slot-release time is knowable here; re-poll shortly.
            return Admission::Defer { earliest_epoch_ms: now + 1_000 };
        }
        if let Some(last) = entry.last_started_at_ms {
            let ready_at = last + entry.policy.min_interval.as_millis() as u64;
            if now < ready_at {
                return Admission::Defer { earliest_epoch_ms: ready_at };
            }
        }

        entry.in_flight += 1;
        entry.last_started_at_ms = Some(now);
        entry.applications_today += 1;
        Admission::Admit
    }

    /// Release a slot taken by `try_acquire`. Runs on every terminal
    /// path (success, failure, crash, timeout, cancellation) so a dead
    /// worker can never leak a slot.
    ///
    /// Returns the new `blocked_until` instant when the outcome tripped
    /// the domain cooldown; the caller emits the `domain_blocked` event.
    pub fn release(&self, domain: &str, outcome: ReleaseOutcome) -> Option<u64> {
        let now = self.clock.epoch_ms();
        let mut domains = self.domains.lock();
        let entry = domains.get_mut(domain)?;
        entry.in_flight = entry.in_flight.saturating_sub(1);
        if outcome == ReleaseOutcome::Blocked {
            let until = now + entry.policy.cooldown.as_millis() as u64;
            entry.blocked_until_ms = Some(until);
            tracing::warn!(domain, blocked_until_ms = until, "domain tripwire, cooling down");
            return Some(until);
        }
        None
    }

    /// Per-domain live summary, sorted by domain name.
    pub fn snapshot(&self) -> Vec<DomainSummary> {
        let domains = self.domains.lock();
        let mut summaries: Vec<DomainSummary> = domains
            .iter()
            .map(|(domain, entry)| DomainSummary {
                domain: domain.clone(),
                applications_today: entry.applications_today,
                in_flight: entry.in_flight,
                blocked_until_ms: entry.blocked_until_ms,
                avoid: entry.policy.avoid,
            })
            .collect();
        summaries.sort_by(|a, b| a.domain.cmp(&b.domain));
        summaries
    }
}

#[cfg(test)]
#[path = "governor_tests.rs"]
mod tests;
