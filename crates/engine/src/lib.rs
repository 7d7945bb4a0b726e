// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! lw-engine: the execution control plane.
//!
//! Composes the rate governor, the worker pool, the per-session
//! dispatcher, the intervention bridge, and the session controller on
//! top of the repository contract and the adapter boundaries.

mod bridge;
mod controller;
mod digest;
mod dispatcher;
mod error;
mod governor;
mod worker;

pub use bridge::InterventionBridge;
pub use controller::{CostCeilings, Engine, EngineConfig, SessionStatusReport};
pub use error::EngineError;
pub use governor::{Admission, DomainSummary, RateGovernor, ReleaseOutcome};
pub use worker::WorkerPool;
