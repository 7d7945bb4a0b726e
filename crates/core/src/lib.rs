// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! lw-core: Domain model for the Legwork application orchestrator

pub mod macros;

pub mod application;
pub mod clock;
pub mod digest;
pub mod domain;
pub mod event;
pub mod id;
pub mod question;
pub mod session;
pub mod usage;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use application::{
    ApplicationItem, ApplicationStatus, Effort, ReasonCode, Signals, StatusChange,
};
pub use clock::{Clock, FakeClock, SystemClock};
pub use digest::{DomainBreakdown, EffortBreakdown, FailureBucket, SessionDigest};
pub use domain::{domain_from_url, DomainError, DomainPolicy};
pub use event::{EventKind, EventRecord};
pub use id::{ApplicationId, InterventionId, SessionId, WorkerId};
pub use question::{FieldDescriptor, FieldKind, Question, QuestionDraft, ValueSource};
pub use session::{Session, SessionConfig, SessionCounters, SessionLimits, SessionStatus};
#[cfg(any(test, feature = "test-support"))]
pub use session::SessionBuilder;
pub use usage::{CallPurpose, ModelUsage, UsageStatus};
