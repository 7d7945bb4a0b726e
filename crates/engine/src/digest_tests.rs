// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use lw_core::test_support::queued_item;
use lw_core::{EventKind, EventRecord, Session, SessionConfig};
use lw_storage::InMemoryRepository;

async fn seeded() -> (Arc<dyn Repository>, InMemoryRepository, SessionId) {
    let repo = InMemoryRepository::new();
    let session = Session::new(&SessionConfig::new("user-1"), 1_000_000);
    let id = session.id;
    repo.create_session(session).await.unwrap();
    repo.update_session_status(id, lw_core::SessionStatus::Running, 1_010_000).await.unwrap();
    (Arc::new(repo.clone()), repo, id)
}

async fn finish_item(
    repo: &InMemoryRepository,
    session: SessionId,
    domain: &str,
    effort: Effort,
    terminal: ApplicationStatus,
    reason: Option<ReasonCode>,
    at: u64,
) -> lw_core::ApplicationId {
    let item = queued_item(session, domain, 0.8);
    let id = item.id;
    repo.create_application(item).await.unwrap();
    repo.set_application_decision(id, effort, false).await.unwrap();
    if terminal != ApplicationStatus::Skipped {
        repo.transition_application(
            id,
            ApplicationStatus::InProgress,
            None,
            None,
            EventRecord::new(session, EventKind::ItemStarted, at).application(id),
        )
        .await
        .unwrap();
    }
    repo.transition_application(
        id,
        terminal,
        reason,
        None,
        EventRecord::new(session, EventKind::ItemSubmitted, at + 100).application(id),
    )
    .await
    .unwrap();
    id
}

#[tokio::test]
async fn digest_breaks_down_by_domain_effort_and_reason() {
    let (dyn_repo, repo, session) = seeded().await;

    finish_item(&repo, session, "a.example.com", Effort::High, ApplicationStatus::Submitted, None, 1_020_000).await;
    finish_item(&repo, session, "a.example.com", Effort::Low, ApplicationStatus::Failed, Some(ReasonCode::Timeout), 1_030_000).await;
    finish_item(&repo, session, "b.example.com", Effort::Low, ApplicationStatus::Failed, Some(ReasonCode::Timeout), 1_040_000).await;
    finish_item(&repo, session, "b.example.com", Effort::Low, ApplicationStatus::Skipped, Some(ReasonCode::LowMatch), 1_050_000).await;

    let digest = build(&dyn_repo, session, 2_000_000).await.unwrap();

    assert_eq!(digest.per_domain.len(), 2);
    let a = digest.per_domain.iter().find(|d| d.domain == "a.example.com").unwrap();
    assert_eq!((a.attempted, a.submitted, a.failed, a.skipped), (2, 1, 1, 0));
    let b = digest.per_domain.iter().find(|d| d.domain == "b.example.com").unwrap();
    assert_eq!((b.attempted, b.submitted, b.failed, b.skipped), (2, 0, 1, 1));

    let high = digest.per_effort.iter().find(|e| e.effort == Effort::High).unwrap();
    assert_eq!((high.attempted, high.submitted), (1, 1));
    let low = digest.per_effort.iter().find(|e| e.effort == Effort::Low).unwrap();
    assert_eq!((low.attempted, low.failed), (3, 2));

    let timeout = digest.failures.iter().find(|f| f.reason == ReasonCode::Timeout).unwrap();
    assert_eq!(timeout.count, 2);
    assert_eq!(timeout.examples.len(), 2);
    let low_match = digest.failures.iter().find(|f| f.reason == ReasonCode::LowMatch).unwrap();
    assert_eq!(low_match.count, 1);
}

#[tokio::test]
async fn failure_examples_cap_at_three() {
    let (dyn_repo, repo, session) = seeded().await;
    for i in 0..5 {
        finish_item(
            &repo,
            session,
            "a.example.com",
            Effort::Low,
            ApplicationStatus::Failed,
            Some(ReasonCode::ExecutorError),
            1_020_000 + i * 1000,
        )
        .await;
    }

    let digest = build(&dyn_repo, session, 2_000_000).await.unwrap();
    let bucket = digest.failures.iter().find(|f| f.reason == ReasonCode::ExecutorError).unwrap();
    assert_eq!(bucket.count, 5);
    assert_eq!(bucket.examples.len(), 3);
}

#[tokio::test]
async fn queued_items_do_not_appear_in_breakdowns() {
    let (dyn_repo, repo, session) = seeded().await;
    let item = queued_item(session, "a.example.com", 0.8);
    repo.create_application(item).await.unwrap();

    let digest = build(&dyn_repo, session, 2_000_000).await.unwrap();
    assert!(digest.per_domain.is_empty());
    assert!(digest.failures.is_empty());
}

#[tokio::test]
async fn duration_uses_generation_time_while_running() {
    let (dyn_repo, _repo, session) = seeded().await;
    let digest = build(&dyn_repo, session, 1_310_000).await.unwrap();
    // started at 1_010_000
    assert_eq!(digest.duration_ms, 300_000);
}
