// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! lw-policy: declarative effort and stealth policies.
//!
//! Effort policies are ordered rule lists whose predicates are written in
//! a small total expression language (no side effects, no loops, no
//! unknown identifiers). Evaluation is a pure function of the per-item
//! signals; the same inputs always produce the same decision.

mod error;
mod evaluator;
mod expr;
mod rules;
mod stealth;

pub use error::PolicyError;
pub use evaluator::{evaluate, Decision};
pub use expr::{Expr, Value};
pub use rules::{CompiledRule, EffortPolicy, RuleAction};
pub use stealth::{ProfileTruth, StealthPolicy};
