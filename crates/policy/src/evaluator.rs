// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The pure effort decision function.

use crate::expr::Value;
use crate::rules::{CompiledRule, EffortPolicy};
use lw_core::{DomainPolicy, Effort, ReasonCode, Signals};
use std::collections::BTreeMap;

/// Outcome of policy evaluation for one item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub effort: Effort,
    pub qa_required: bool,
    pub skip_reason: Option<ReasonCode>,
}

impl Decision {
    fn skip(reason: ReasonCode) -> Self {
        Self { effort: Effort::Low, qa_required: false, skip_reason: Some(reason) }
    }
}

/// Evaluate the effort policy for one item. Pure: no I/O, no clock, and
/// identical inputs always yield identical decisions.
///
/// Phase order: built-in avoid check, built-in low-match check, skip
/// rules, upgrade rules, downgrade rules, QA rules. Within a phase the
/// first matching rule wins (QA rules are or-ed instead). A predicate
/// that fails to evaluate counts as a non-match.
pub fn evaluate(signals: &Signals, domain: &DomainPolicy, policy: &EffortPolicy) -> Decision {
    if signals.company_tier == "avoid" {
        return Decision::skip(ReasonCode::AvoidCompany);
    }
    if signals.match_score < policy.skip_threshold {
        return Decision::skip(ReasonCode::LowMatch);
    }

    let vars = variables(signals, domain);

    for rule in policy.skips() {
        if matches(rule, &vars) {
            return Decision::skip(ReasonCode::PolicySkip);
        }
    }

    let mut effort = signals.hint_effort;

    for (rule, target) in policy.upgrades() {
        if matches(rule, &vars) {
            // Upgrades only ever raise
            effort = effort.max(target);
            break;
        }
    }

    for (rule, target) in policy.downgrades() {
        if matches(rule, &vars) {
            effort = effort.min(target);
            break;
        }
    }

    let qa_required = policy.qa_rules().any(|rule| matches(rule, &vars));

    Decision { effort, qa_required, skip_reason: None }
}

fn matches(rule: &CompiledRule, vars: &BTreeMap<String, Value>) -> bool {
    match &rule.expr {
        Some(expr) => expr.eval_bool(vars).unwrap_or(false),
        None => false,
    }
}

/// Frozen variable map the predicates see.
fn variables(signals: &Signals, domain: &DomainPolicy) -> BTreeMap<String, Value> {
    let mut vars = BTreeMap::new();
    vars.insert("hint_effort".to_string(), Value::Str(signals.hint_effort.to_string()));
    vars.insert("match_score".to_string(), Value::Num(signals.match_score));
    vars.insert("company_tier".to_string(), Value::Str(signals.company_tier.clone()));
    vars.insert("domain_avoid".to_string(), Value::Bool(domain.avoid));
    vars.insert("domain_max_per_day".to_string(), Value::Num(domain.max_per_day as f64));
    vars.insert(
        "domain_min_interval_seconds".to_string(),
        Value::Num(domain.min_interval.as_secs() as f64),
    );
    vars.insert("domain_max_concurrent".to_string(), Value::Num(domain.max_concurrent as f64));
    vars
}

#[cfg(test)]
#[path = "evaluator_tests.rs"]
mod tests;
