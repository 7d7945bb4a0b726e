// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session: one bounded orchestrated run and its lifecycle state machine.

use crate::id::SessionId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lifecycle status of a session.
///
/// `Draining`, `Cancelling`, and `Failing` are transitional: dispatch has
/// stopped and in-flight workers are quiescing toward the matching terminal
/// status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Planned,
    Running,
    Paused,
    Draining,
    Cancelling,
    Failing,
    Completed,
    Failed,
    Cancelled,
}

crate::simple_display! {
    SessionStatus {
        Planned => "planned",
        Running => "running",
        Paused => "paused",
        Draining => "draining",
        Cancelling => "cancelling",
        Failing => "failing",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl SessionStatus {
    /// Check if this status is terminal. Once terminal, counters are frozen;
    /// only a digest and linked events may still be written.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }

    /// Whether the dispatcher may pick new items in this status.
    pub fn accepts_dispatch(&self) -> bool {
        matches!(self, SessionStatus::Running)
    }

    /// Legal session state machine.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        match self {
            Planned => matches!(next, Running | Cancelled | Failed),
            Running => matches!(next, Paused | Draining | Cancelling | Failing),
            Paused => matches!(next, Running | Draining | Cancelling | Failing),
            Draining => matches!(next, Completed | Cancelling | Failing),
            Cancelling => matches!(next, Cancelled | Failing),
            Failing => matches!(next, Failed),
            Completed | Failed | Cancelled => false,
        }
    }
}

/// Hard limits a session may not exceed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionLimits {
    /// Maximum number of items to attempt
    pub max_items: u32,
    /// Wall-clock ceiling for the whole session
    #[serde(with = "secs_serde")]
    pub max_duration: Duration,
    /// Worker pool size ceiling
    pub max_concurrency: u32,
    /// Estimated-cost budget in account currency
    pub budget_cost: f64,
    /// Hard ceiling for one item before the worker is abandoned
    #[serde(with = "secs_serde", default = "default_item_duration")]
    pub max_item_duration: Duration,
}

fn default_item_duration() -> Duration {
    Duration::from_secs(600)
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_items: 25,
            max_duration: Duration::from_secs(3600),
            max_concurrency: 5,
            budget_cost: 5.0,
            max_item_duration: default_item_duration(),
        }
    }
}

/// Additive counters on the session row.
///
/// Conservation invariant: `attempted == succeeded + failed + skipped +
/// cancelled + in_flight`, and `in_flight == 0` at terminal status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionCounters {
    pub attempted: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub skipped: u32,
    pub cancelled: u32,
    pub in_flight: u32,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost: f64,
}

impl SessionCounters {
    /// Check the conservation invariant.
    pub fn conserved(&self) -> bool {
        self.attempted
            == self.succeeded + self.failed + self.skipped + self.cancelled + self.in_flight
    }
}

/// Immutable configuration captured when the session is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub user_id: String,
    pub limits: SessionLimits,
    /// Fixed UTC offset of the session's local calendar, in minutes.
    /// Governs daily-cap rollover and digest day grouping.
    #[serde(default)]
    pub timezone_offset_minutes: i32,
    /// Name/path reference of the effort policy in use
    #[serde(default)]
    pub effort_policy_ref: String,
    /// Name/path reference of the stealth/domain policy in use
    #[serde(default)]
    pub stealth_policy_ref: String,
}

impl SessionConfig {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            limits: SessionLimits::default(),
            timezone_offset_minutes: 0,
            effort_policy_ref: String::new(),
            stealth_policy_ref: String::new(),
        }
    }

    pub fn limits(mut self, limits: SessionLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn timezone_offset_minutes(mut self, minutes: i32) -> Self {
        self.timezone_offset_minutes = minutes;
        self
    }

    pub fn effort_policy_ref(mut self, name: impl Into<String>) -> Self {
        self.effort_policy_ref = name.into();
        self
    }

    pub fn stealth_policy_ref(mut self, name: impl Into<String>) -> Self {
        self.stealth_policy_ref = name.into();
        self
    }
}

/// One bounded orchestrated run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: String,
    pub status: SessionStatus,
    pub limits: SessionLimits,
    pub counters: SessionCounters,
    #[serde(default)]
    pub timezone_offset_minutes: i32,
    /// sha256 of the canonical policy snapshot persisted at start()
    #[serde(default)]
    pub config_hash: String,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at_ms: Option<u64>,
    /// Liveness stamp; recovery marks sessions with expired heartbeats failed
    #[serde(default)]
    pub heartbeat_at_ms: u64,
}

impl Session {
    pub fn new(config: &SessionConfig, created_at_ms: u64) -> Self {
        Self {
            id: SessionId::new(),
            user_id: config.user_id.clone(),
            status: SessionStatus::Planned,
            limits: config.limits.clone(),
            counters: SessionCounters::default(),
            timezone_offset_minutes: config.timezone_offset_minutes,
            config_hash: String::new(),
            created_at_ms,
            started_at_ms: None,
            ended_at_ms: None,
            heartbeat_at_ms: created_at_ms,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a lifecycle transition. Returns false when illegal.
    pub fn transition(&mut self, next: SessionStatus, at_epoch_ms: u64) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        match next {
            SessionStatus::Running if self.started_at_ms.is_none() => {
                self.started_at_ms = Some(at_epoch_ms);
            }
            s if s.is_terminal() => {
                self.ended_at_ms = Some(at_epoch_ms);
            }
            _ => {}
        }
        true
    }

    /// Elapsed wall-clock since start, zero if never started.
    pub fn elapsed_ms(&self, now_epoch_ms: u64) -> u64 {
        match self.started_at_ms {
            Some(start) => now_epoch_ms.saturating_sub(start),
            None => 0,
        }
    }
}

/// Test fixture builder: a session row in an arbitrary lifecycle state,
/// bypassing the transition machinery. Used by other crates' tests to
/// seed repositories (e.g. recovery sweeps over rows this process never
/// owned).
#[cfg(any(test, feature = "test-support"))]
pub struct SessionBuilder {
    user_id: String,
    status: SessionStatus,
    limits: SessionLimits,
    counters: SessionCounters,
    created_at_ms: u64,
    started_at_ms: Option<u64>,
    heartbeat_at_ms: u64,
}

#[cfg(any(test, feature = "test-support"))]
impl Default for SessionBuilder {
    fn default() -> Self {
        Self {
            user_id: "user-1".to_string(),
            status: SessionStatus::Planned,
            limits: SessionLimits::default(),
            counters: SessionCounters::default(),
            created_at_ms: 1_000_000,
            started_at_ms: None,
            heartbeat_at_ms: 1_000_000,
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
impl SessionBuilder {
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn status(mut self, status: SessionStatus) -> Self {
        self.status = status;
        self
    }

    pub fn limits(mut self, limits: SessionLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn counters(mut self, counters: SessionCounters) -> Self {
        self.counters = counters;
        self
    }

    pub fn created_at_ms(mut self, ms: u64) -> Self {
        self.created_at_ms = ms;
        self
    }

    pub fn started_at_ms(mut self, ms: u64) -> Self {
        self.started_at_ms = Some(ms);
        self
    }

    pub fn heartbeat_at_ms(mut self, ms: u64) -> Self {
        self.heartbeat_at_ms = ms;
        self
    }

    pub fn build(self) -> Session {
        Session {
            id: SessionId::new(),
            user_id: self.user_id,
            status: self.status,
            limits: self.limits,
            counters: self.counters,
            timezone_offset_minutes: 0,
            config_hash: String::new(),
            created_at_ms: self.created_at_ms,
            started_at_ms: self.started_at_ms,
            ended_at_ms: None,
            heartbeat_at_ms: self.heartbeat_at_ms,
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
impl Session {
    /// Create a builder with test defaults.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }
}

mod secs_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
        duration.as_secs().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
