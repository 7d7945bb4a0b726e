// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::repo::CounterDelta;
use lw_core::test_support::queued_item;
use lw_core::{
    EventKind, FieldDescriptor, FieldKind, QuestionDraft, Session, SessionConfig, ValueSource,
};

fn repo() -> InMemoryRepository {
    InMemoryRepository::new()
}

async fn seeded_session(repo: &InMemoryRepository) -> SessionId {
    let session = Session::new(&SessionConfig::new("user-1"), 1_000_000);
    let id = session.id;
    repo.create_session(session).await.unwrap();
    id
}

async fn seeded_item(repo: &InMemoryRepository, session: SessionId) -> ApplicationId {
    let item = queued_item(session, "ats.company.com", 0.8);
    let id = item.id;
    repo.create_application(item).await.unwrap();
    id
}

fn event(session: SessionId, app: ApplicationId, kind: EventKind) -> EventRecord {
    EventRecord::new(session, kind, 1_000_500).application(app)
}

#[tokio::test]
async fn duplicate_session_is_rejected() {
    let repo = repo();
    let session = Session::new(&SessionConfig::new("user-1"), 1_000_000);
    repo.create_session(session.clone()).await.unwrap();
    assert!(matches!(
        repo.create_session(session).await,
        Err(StorageError::Duplicate(_))
    ));
}

#[tokio::test]
async fn session_status_update_validates_transition() {
    let repo = repo();
    let id = seeded_session(&repo).await;

    let updated = repo.update_session_status(id, SessionStatus::Running, 1_001_000).await.unwrap();
    assert_eq!(updated.status, SessionStatus::Running);
    assert_eq!(updated.started_at_ms, Some(1_001_000));

    assert!(matches!(
        repo.update_session_status(id, SessionStatus::Completed, 1_002_000).await,
        Err(StorageError::IllegalSessionTransition { .. })
    ));
}

#[tokio::test]
async fn counters_are_additive_and_frozen_at_terminal() {
    let repo = repo();
    let id = seeded_session(&repo).await;

    repo.add_session_counters(id, CounterDelta::attempt()).await.unwrap();
    repo.add_session_counters(id, CounterDelta::settle(ApplicationStatus::Submitted))
        .await
        .unwrap();
    let session = repo.get_session(id).await.unwrap();
    assert_eq!(session.counters.attempted, 1);
    assert_eq!(session.counters.succeeded, 1);
    assert_eq!(session.counters.in_flight, 0);
    assert!(session.counters.conserved());

    repo.update_session_status(id, SessionStatus::Running, 1_001_000).await.unwrap();
    repo.update_session_status(id, SessionStatus::Draining, 1_002_000).await.unwrap();
    repo.update_session_status(id, SessionStatus::Completed, 1_003_000).await.unwrap();
    assert!(matches!(
        repo.add_session_counters(id, CounterDelta::attempt()).await,
        Err(StorageError::SessionFrozen(_))
    ));
}

#[tokio::test]
async fn transition_writes_row_history_and_event_atomically() {
    let repo = repo();
    let session = seeded_session(&repo).await;
    let app = seeded_item(&repo, session).await;

    let stored = repo
        .transition_application(
            app,
            ApplicationStatus::InProgress,
            None,
            None,
            event(session, app, EventKind::ItemStarted),
        )
        .await
        .unwrap();
    assert_eq!(stored.seq, 1);

    let item = repo.get_application(app).await.unwrap();
    assert_eq!(item.status, ApplicationStatus::InProgress);
    assert_eq!(item.status_history.len(), 2);

    let events = repo.list_events(session).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::ItemStarted);
}

#[tokio::test]
async fn illegal_transition_writes_nothing() {
    let repo = repo();
    let session = seeded_session(&repo).await;
    let app = seeded_item(&repo, session).await;

    let result = repo
        .transition_application(
            app,
            ApplicationStatus::Submitted,
            None,
            None,
            event(session, app, EventKind::ItemSubmitted),
        )
        .await;
    assert!(matches!(result, Err(StorageError::IllegalTransition { .. })));

    // No event leaked from the failed transaction.
    assert!(repo.list_events(session).await.unwrap().is_empty());
    let item = repo.get_application(app).await.unwrap();
    assert_eq!(item.status_history.len(), 1);
}

#[tokio::test]
async fn event_sequences_are_strictly_increasing_per_session() {
    let repo = repo();
    let session = seeded_session(&repo).await;
    let other = seeded_session(&repo).await;

    for _ in 0..3 {
        repo.append_event(EventRecord::new(session, EventKind::RateLimitApplied, 1)).await.unwrap();
    }
    repo.append_event(EventRecord::new(other, EventKind::SessionPaused, 1)).await.unwrap();

    let seqs: Vec<u64> =
        repo.list_events(session).await.unwrap().iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3]);
    // Sequences are per-session, not global.
    assert_eq!(repo.list_events(other).await.unwrap()[0].seq, 1);
}

#[tokio::test]
async fn question_step_index_is_assigned_and_increasing() {
    let repo = repo();
    let session = seeded_session(&repo).await;
    let app = seeded_item(&repo, session).await;

    let field = FieldDescriptor {
        kind: FieldKind::Text,
        label: "name".to_string(),
        raw_label: "Name".to_string(),
        required: true,
    };
    let first = repo
        .append_question(app, QuestionDraft::new(field.clone(), "Ada", ValueSource::Profile))
        .await
        .unwrap();
    let second = repo
        .append_question(app, QuestionDraft::new(field, "Lovelace", ValueSource::Profile))
        .await
        .unwrap();
    assert_eq!(first.step_index, 0);
    assert_eq!(second.step_index, 1);

    let rows = repo.list_questions(app).await.unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn question_for_unknown_application_is_rejected() {
    let repo = repo();
    let field = FieldDescriptor {
        kind: FieldKind::Text,
        label: "x".to_string(),
        raw_label: "x".to_string(),
        required: false,
    };
    let result = repo
        .append_question(
            ApplicationId::from_string("app-ghost"),
            QuestionDraft::new(field, "v", ValueSource::Default),
        )
        .await;
    assert!(matches!(result, Err(StorageError::ApplicationNotFound(_))));
}

#[tokio::test]
async fn list_queued_orders_by_enqueue_time_and_limits() {
    let repo = repo();
    let session = seeded_session(&repo).await;

    let mut older = queued_item(session, "a.example.com", 0.5);
    older.enqueued_at_ms = 500;
    let mut newer = queued_item(session, "b.example.com", 0.9);
    newer.enqueued_at_ms = 900;
    repo.create_application(newer.clone()).await.unwrap();
    repo.create_application(older.clone()).await.unwrap();

    let queued = repo.list_queued(session, 10).await.unwrap();
    assert_eq!(queued.len(), 2);
    assert_eq!(queued[0].id, older.id);

    let limited = repo.list_queued(session, 1).await.unwrap();
    assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn list_in_progress_includes_paused() {
    let repo = repo();
    let session = seeded_session(&repo).await;
    let app = seeded_item(&repo, session).await;
    repo.transition_application(
        app,
        ApplicationStatus::InProgress,
        None,
        None,
        event(session, app, EventKind::ItemStarted),
    )
    .await
    .unwrap();
    repo.transition_application(
        app,
        ApplicationStatus::Paused,
        None,
        None,
        event(session, app, EventKind::CaptchaDetected),
    )
    .await
    .unwrap();

    let in_progress = repo.list_in_progress(session).await.unwrap();
    assert_eq!(in_progress.len(), 1);
    assert_eq!(in_progress[0].status, ApplicationStatus::Paused);
}

#[tokio::test]
async fn digest_upsert_overwrites() {
    let repo = repo();
    let session = seeded_session(&repo).await;
    let base = lw_core::SessionDigest {
        session,
        generated_at_ms: 1,
        duration_ms: 10,
        counters: Default::default(),
        per_domain: Vec::new(),
        per_effort: Vec::new(),
        failures: Vec::new(),
        config_hash: String::new(),
    };
    repo.upsert_digest(base.clone()).await.unwrap();
    let mut updated = base.clone();
    updated.generated_at_ms = 2;
    repo.upsert_digest(updated).await.unwrap();

    let stored = repo.get_digest(session).await.unwrap().unwrap();
    assert_eq!(stored.generated_at_ms, 2);
}

#[tokio::test]
async fn domain_policies_round_trip() {
    let repo = repo();
    repo.upsert_domain_policy("ats.company.com".to_string(), DomainPolicy::default())
        .await
        .unwrap();
    let policies = repo.load_domain_policies().await.unwrap();
    assert!(policies.contains_key("ats.company.com"));
}

#[tokio::test]
async fn usage_is_scoped_by_session() {
    let repo = repo();
    let session = seeded_session(&repo).await;
    let other = seeded_session(&repo).await;
    let usage = lw_core::ModelUsage {
        session,
        application: None,
        provider: "anthropic".to_string(),
        model: "claude".to_string(),
        purpose: lw_core::CallPurpose::Embedding,
        tokens_in: 10,
        tokens_out: 0,
        cost: 0.001,
        started_at_ms: 1,
        ended_at_ms: 2,
        status: lw_core::UsageStatus::Ok,
    };
    repo.append_usage(usage).await.unwrap();
    assert_eq!(repo.list_usage(session).await.unwrap().len(), 1);
    assert!(repo.list_usage(other).await.unwrap().is_empty());
}
