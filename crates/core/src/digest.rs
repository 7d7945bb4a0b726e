// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session terminal summary persisted at completion.

use crate::application::{Effort, ReasonCode};
use crate::id::{ApplicationId, SessionId};
use crate::session::SessionCounters;
use serde::{Deserialize, Serialize};

/// Per-domain attempt breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainBreakdown {
    pub domain: String,
    pub attempted: u32,
    pub submitted: u32,
    pub failed: u32,
    pub skipped: u32,
}

/// Per-effort attempt breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffortBreakdown {
    pub effort: Effort,
    pub attempted: u32,
    pub submitted: u32,
    pub failed: u32,
}

/// One failure-taxonomy bucket with up to three example items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureBucket {
    pub reason: ReasonCode,
    pub count: u32,
    /// At most three example application ids
    pub examples: Vec<ApplicationId>,
}

/// The digest record written exactly once when a session reaches a
/// terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDigest {
    pub session: SessionId,
    pub generated_at_ms: u64,
    pub duration_ms: u64,
    pub counters: SessionCounters,
    pub per_domain: Vec<DomainBreakdown>,
    pub per_effort: Vec<EffortBreakdown>,
    pub failures: Vec<FailureBucket>,
    /// sha256 of the policy snapshot the session ran with
    #[serde(default)]
    pub config_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_serde_round_trip() {
        let digest = SessionDigest {
            session: SessionId::from_string("ses-d"),
            generated_at_ms: 2_000_000,
            duration_ms: 600_000,
            counters: SessionCounters { attempted: 3, succeeded: 2, failed: 1, ..Default::default() },
            per_domain: vec![DomainBreakdown {
                domain: "ats.company.com".to_string(),
                attempted: 3,
                submitted: 2,
                failed: 1,
                skipped: 0,
            }],
            per_effort: vec![EffortBreakdown {
                effort: Effort::Medium,
                attempted: 3,
                submitted: 2,
                failed: 1,
            }],
            failures: vec![FailureBucket {
                reason: ReasonCode::Timeout,
                count: 1,
                examples: vec![ApplicationId::from_string("app-x")],
            }],
            config_hash: "deadbeef".to_string(),
        };
        let json = serde_json::to_string(&digest).unwrap();
        let restored: SessionDigest = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, digest);
    }
}
