// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-way notification sinks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from notify operations
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// What the notification is about. Real-time sinks only ever receive
/// intervention requests and fatal errors; everything else arrives with
/// the digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyKind {
    CaptchaManual,
    TwoFactorNeeded,
    SessionDigest,
    FatalError,
}

lw_core::simple_display! {
    NotifyKind {
        CaptchaManual => "captcha_manual",
        TwoFactorNeeded => "two_factor_needed",
        SessionDigest => "session_digest",
        FatalError => "fatal_error",
    }
}

/// Adapter for sending notifications
#[async_trait]
pub trait NotifyAdapter: Clone + Send + Sync + 'static {
    /// Send a notification of the given kind with a structured payload
    async fn notify(&self, kind: NotifyKind, payload: &serde_json::Value)
        -> Result<(), NotifyError>;
}

/// Desktop notification adapter using notify-rust.
///
/// Human-in-the-loop events (CAPTCHA on screen, 2FA prompt) need to reach
/// the operator's desktop promptly; everything else is low-urgency.
#[derive(Clone, Copy, Debug, Default)]
pub struct DesktopNotifyAdapter;

impl DesktopNotifyAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotifyAdapter for DesktopNotifyAdapter {
    async fn notify(
        &self,
        kind: NotifyKind,
        payload: &serde_json::Value,
    ) -> Result<(), NotifyError> {
        let title = match kind {
            NotifyKind::CaptchaManual => "CAPTCHA needs you",
            NotifyKind::TwoFactorNeeded => "2FA code needed",
            NotifyKind::SessionDigest => "Session finished",
            NotifyKind::FatalError => "Session failed",
        };
        let body = payload
            .get("detail")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| payload.to_string());
        // notify_rust::Notification::show() is synchronous. Fire-and-forget
        // on tokio's bounded blocking thread pool to avoid blocking the
        // async runtime while capping OS thread count.
        tokio::task::spawn_blocking(move || {
            tracing::info!(%title, %body, "sending desktop notification");
            match notify_rust::Notification::new().summary(title).body(&body).show() {
                Ok(_) => {
                    tracing::info!(%title, "desktop notification sent");
                }
                Err(e) => {
                    tracing::warn!(%title, error = %e, "desktop notification failed");
                }
            }
        });
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{NotifyAdapter, NotifyError, NotifyKind};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Recorded notification
    #[derive(Debug, Clone)]
    pub struct NotifyCall {
        pub kind: NotifyKind,
        pub payload: serde_json::Value,
    }

    struct FakeNotifyState {
        calls: Vec<NotifyCall>,
    }

    /// Fake notification adapter for testing
    #[derive(Clone)]
    pub struct FakeNotifyAdapter {
        inner: Arc<Mutex<FakeNotifyState>>,
    }

    impl Default for FakeNotifyAdapter {
        fn default() -> Self {
            Self { inner: Arc::new(Mutex::new(FakeNotifyState { calls: Vec::new() })) }
        }
    }

    impl FakeNotifyAdapter {
        pub fn new() -> Self {
            Self::default()
        }

        /// Get all recorded notifications
        pub fn calls(&self) -> Vec<NotifyCall> {
            self.inner.lock().calls.clone()
        }

        /// Recorded notifications of one kind
        pub fn calls_of(&self, kind: NotifyKind) -> Vec<NotifyCall> {
            self.inner.lock().calls.iter().filter(|c| c.kind == kind).cloned().collect()
        }
    }

    #[async_trait]
    impl NotifyAdapter for FakeNotifyAdapter {
        async fn notify(
            &self,
            kind: NotifyKind,
            payload: &serde_json::Value,
        ) -> Result<(), NotifyError> {
            self.inner.lock().calls.push(NotifyCall { kind, payload: payload.clone() });
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeNotifyAdapter, NotifyCall};

#[cfg(test)]
#[path = "notify_tests.rs"]
mod tests;
