// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Human-in-the-loop mediation.
//!
//! Workers park here when the executor hits a CAPTCHA, a 2FA prompt, or
//! a suspicious-activity wall. The bridge fans the request out to the
//! notification sinks and parks the worker on a oneshot until an
//! external `resolve` arrives or the deadline passes. State is
//! process-scoped and keyed by application id, so requests from many
//! workers and sessions coexist.

use lw_adapters::{InterventionKind, NotifyAdapter, NotifyKind, Resolution};
use lw_core::{ApplicationId, InterventionId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::oneshot;

struct PendingIntervention {
    id: InterventionId,
    kind: InterventionKind,
    tx: oneshot::Sender<Resolution>,
}

/// Process-scoped intervention broker.
pub struct InterventionBridge<N: NotifyAdapter> {
    notifier: N,
    timeout: Duration,
    pending: Mutex<HashMap<ApplicationId, PendingIntervention>>,
}

impl<N: NotifyAdapter> InterventionBridge<N> {
    pub fn new(notifier: N, timeout: Duration) -> Self {
        Self { notifier, timeout, pending: Mutex::new(HashMap::new()) }
    }

    /// Surface an intervention and await its resolution.
    ///
    /// Notifies the sinks exactly once per request. Returns
    /// [`Resolution::Timeout`] when nothing arrives within the deadline.
    pub async fn request(
        &self,
        kind: InterventionKind,
        application: ApplicationId,
        payload: serde_json::Value,
    ) -> Resolution {
        let id = InterventionId::new();
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock();
            if pending.insert(application, PendingIntervention { id, kind, tx }).is_some() {
                tracing::warn!(%application, "replacing an unresolved intervention request");
            }
        }

        let notify_kind = match kind {
            InterventionKind::TwoFactor => NotifyKind::TwoFactorNeeded,
            InterventionKind::Captcha | InterventionKind::SuspiciousActivity => {
                NotifyKind::CaptchaManual
            }
        };
        let notify_payload = serde_json::json!({
            "intervention": id.to_string(),
            "application": application.to_string(),
            "kind": kind.to_string(),
            "detail": payload,
        });
        if let Err(err) = self.notifier.notify(notify_kind, &notify_payload).await {
            tracing::warn!(%application, error = %err, "intervention notification failed");
        }

        let resolution = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(resolution)) => resolution,
            // Sender dropped or deadline passed: either way nobody is coming.
            Ok(Err(_)) | Err(_) => {
                self.pending.lock().remove(&application);
                Resolution::Timeout
            }
        };
        tracing::info!(%application, %kind, ?resolution, "intervention finished");
        resolution
    }

    /// Deliver a resolution for an application's pending request.
    ///
    /// Idempotent: a second resolve (or one for an unknown application)
    /// is ignored and logged. Returns whether a waiter was resolved.
    pub fn resolve(&self, application: ApplicationId, resolution: Resolution) -> bool {
        let entry = self.pending.lock().remove(&application);
        match entry {
            Some(pending) => {
                tracing::info!(%application, intervention = %pending.id, kind = %pending.kind,
                    "resolving intervention");
                if pending.tx.send(resolution).is_err() {
                    tracing::warn!(%application, "intervention waiter already gone");
                    return false;
                }
                true
            }
            None => {
                tracing::info!(%application, "ignoring resolve with no pending intervention");
                false
            }
        }
    }

    /// Number of requests currently awaiting resolution.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;
