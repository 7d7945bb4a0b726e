// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use lw_adapters::FakeNotifyAdapter;
use std::sync::Arc;

fn bridge(notifier: &FakeNotifyAdapter, timeout_secs: u64) -> Arc<InterventionBridge<FakeNotifyAdapter>> {
    Arc::new(InterventionBridge::new(notifier.clone(), Duration::from_secs(timeout_secs)))
}

#[tokio::test(start_paused = true)]
async fn request_resolves_when_resolution_arrives() {
    let notifier = FakeNotifyAdapter::new();
    let bridge = bridge(&notifier, 300);
    let app = ApplicationId::from_string("app-1");

    let waiter = {
        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move {
            bridge.request(InterventionKind::Captcha, app, serde_json::json!({})).await
        })
    };
    tokio::task::yield_now().await;
    assert_eq!(bridge.pending_count(), 1);

    assert!(bridge.resolve(app, Resolution::Continue(None)));
    let resolution = waiter.await.unwrap();
    assert_eq!(resolution, Resolution::Continue(None));
    assert_eq!(bridge.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn request_times_out_without_resolution() {
    let notifier = FakeNotifyAdapter::new();
    let bridge = bridge(&notifier, 30);
    let app = ApplicationId::from_string("app-1");

    let resolution =
        bridge.request(InterventionKind::Captcha, app, serde_json::json!({})).await;
    assert_eq!(resolution, Resolution::Timeout);
    assert_eq!(bridge.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn notification_sent_exactly_once_per_request() {
    let notifier = FakeNotifyAdapter::new();
    let bridge = bridge(&notifier, 30);
    let app = ApplicationId::from_string("app-1");

    bridge.request(InterventionKind::Captcha, app, serde_json::json!({})).await;

    let calls = notifier.calls_of(lw_adapters::NotifyKind::CaptchaManual);
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].payload["application"], "app-1");
    assert_eq!(calls[0].payload["kind"], "captcha");
}

#[tokio::test(start_paused = true)]
async fn two_factor_routes_to_its_own_notify_kind() {
    let notifier = FakeNotifyAdapter::new();
    let bridge = bridge(&notifier, 30);
    let app = ApplicationId::from_string("app-2fa");

    bridge.request(InterventionKind::TwoFactor, app, serde_json::json!({})).await;

    assert_eq!(notifier.calls_of(lw_adapters::NotifyKind::TwoFactorNeeded).len(), 1);
    assert_eq!(notifier.calls_of(lw_adapters::NotifyKind::CaptchaManual).len(), 0);
}

#[tokio::test(start_paused = true)]
async fn second_resolve_is_ignored() {
    let notifier = FakeNotifyAdapter::new();
    let bridge = bridge(&notifier, 300);
    let app = ApplicationId::from_string("app-1");

    let waiter = {
        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move {
            bridge.request(InterventionKind::Captcha, app, serde_json::json!({})).await
        })
    };
    tokio::task::yield_now().await;

    assert!(bridge.resolve(app, Resolution::Skip));
    assert!(!bridge.resolve(app, Resolution::Abort));
    assert_eq!(waiter.await.unwrap(), Resolution::Skip);
}

#[tokio::test(start_paused = true)]
async fn resolve_without_pending_request_is_ignored() {
    let notifier = FakeNotifyAdapter::new();
    let bridge = bridge(&notifier, 300);
    assert!(!bridge.resolve(ApplicationId::from_string("app-ghost"), Resolution::Skip));
}

#[tokio::test(start_paused = true)]
async fn concurrent_requests_for_different_applications() {
    let notifier = FakeNotifyAdapter::new();
    let bridge = bridge(&notifier, 300);
    let first = ApplicationId::from_string("app-1");
    let second = ApplicationId::from_string("app-2");

    let waiter_one = {
        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move {
            bridge.request(InterventionKind::Captcha, first, serde_json::json!({})).await
        })
    };
    let waiter_two = {
        let bridge = Arc::clone(&bridge);
        tokio::spawn(async move {
            bridge.request(InterventionKind::TwoFactor, second, serde_json::json!({})).await
        })
    };
    tokio::task::yield_now().await;
    assert_eq!(bridge.pending_count(), 2);

    assert!(bridge.resolve(second, Resolution::Continue(None)));
    assert!(bridge.resolve(first, Resolution::Skip));
    assert_eq!(waiter_one.await.unwrap(), Resolution::Skip);
    assert_eq!(waiter_two.await.unwrap(), Resolution::Continue(None));
}
