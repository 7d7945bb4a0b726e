// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal session summary.

use lw_core::{
    ApplicationStatus, DomainBreakdown, Effort, EffortBreakdown, FailureBucket, ReasonCode,
    SessionDigest, SessionId,
};
use lw_storage::{Repository, StorageError};
use std::collections::BTreeMap;
use std::sync::Arc;

const MAX_EXAMPLES: usize = 3;

/// Fold the session row and its application rows into the digest record.
pub(crate) async fn build(
    repo: &Arc<dyn Repository>,
    session: SessionId,
    generated_at_ms: u64,
) -> Result<SessionDigest, StorageError> {
    let row = repo.get_session(session).await?;
    let items = repo.list_applications(session).await?;

    let mut per_domain: BTreeMap<String, DomainBreakdown> = BTreeMap::new();
    let mut per_effort: BTreeMap<Effort, EffortBreakdown> = BTreeMap::new();
    let mut failures: Vec<FailureBucket> = Vec::new();

    for item in &items {
        // Items still queued (or cancelled before any attempt) are not
        // part of the attempt breakdowns.
        let attempted = !matches!(item.status, ApplicationStatus::Queued)
            && (item.started_at_ms.is_some()
                || matches!(item.status, ApplicationStatus::Skipped | ApplicationStatus::Failed));
        if !attempted {
            continue;
        }

        let domain = per_domain.entry(item.domain.clone()).or_insert_with(|| DomainBreakdown {
            domain: item.domain.clone(),
            attempted: 0,
            submitted: 0,
            failed: 0,
            skipped: 0,
        });
        domain.attempted += 1;
        match item.status {
            ApplicationStatus::Submitted => domain.submitted += 1,
            ApplicationStatus::Failed => domain.failed += 1,
            ApplicationStatus::Skipped => domain.skipped += 1,
            _ => {}
        }

        if let Some(effort) = item.effort {
            let bucket = per_effort.entry(effort).or_insert_with(|| EffortBreakdown {
                effort,
                attempted: 0,
                submitted: 0,
                failed: 0,
            });
            bucket.attempted += 1;
            match item.status {
                ApplicationStatus::Submitted => bucket.submitted += 1,
                ApplicationStatus::Failed => bucket.failed += 1,
                _ => {}
            }
        }

        if matches!(item.status, ApplicationStatus::Failed | ApplicationStatus::Skipped) {
            let reason = item.reason.unwrap_or(ReasonCode::Unknown);
            match failures.iter_mut().find(|bucket| bucket.reason == reason) {
                Some(bucket) => {
                    bucket.count += 1;
                    if bucket.examples.len() < MAX_EXAMPLES {
                        bucket.examples.push(item.id);
                    }
                }
                None => failures.push(FailureBucket {
                    reason,
                    count: 1,
                    examples: vec![item.id],
                }),
            }
        }
    }

    failures.sort_by(|a, b| b.count.cmp(&a.count));

    let duration_ms = match (row.started_at_ms, row.ended_at_ms) {
        (Some(start), Some(end)) => end.saturating_sub(start),
        (Some(start), None) => generated_at_ms.saturating_sub(start),
        _ => 0,
    };

    Ok(SessionDigest {
        session,
        generated_at_ms,
        duration_ms,
        counters: row.counters,
        per_domain: per_domain.into_values().collect(),
        per_effort: per_effort.into_values().collect(),
        failures,
        config_hash: row.config_hash,
    })
}

#[cfg(test)]
#[path = "digest_tests.rs"]
mod tests;
