// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! lw-adapters: boundary traits for the external collaborators.
//!
//! The control plane consumes the browser executor, the semantic matcher,
//! and the notification sinks exclusively through these traits. Fake
//! implementations for tests live behind the `test-support` feature.

mod executor;
mod matcher;
mod notify;

pub use executor::{
    ExecutorAdapter, ExecutorError, ExecutorInstance, InterventionHandler, InterventionKind,
    ModelCall, Resolution, RunOutcome, RunRequest, UsageTotals,
};
pub use matcher::{MatchError, MatcherAdapter};
pub use notify::{DesktopNotifyAdapter, NotifyAdapter, NotifyError, NotifyKind};

#[cfg(any(test, feature = "test-support"))]
pub use executor::{FakeBehavior, FakeExecutorAdapter};
#[cfg(any(test, feature = "test-support"))]
pub use matcher::FakeMatcherAdapter;
#[cfg(any(test, feature = "test-support"))]
pub use notify::{FakeNotifyAdapter, NotifyCall};
