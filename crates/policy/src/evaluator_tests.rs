// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::rules::EffortPolicy;
use lw_core::{DomainPolicy, Effort, ReasonCode, Signals};

fn signals(hint: Effort, score: f64, tier: &str) -> Signals {
    Signals { hint_effort: hint, match_score: score, company_tier: tier.to_string() }
}

fn policy(src: &str) -> EffortPolicy {
    EffortPolicy::from_toml_str(src).unwrap()
}

const FULL: &str = r#"
skip_threshold = 0.2

[[rule]]
when = "company_tier in ['spam']"
skip = true

[[rule]]
when = "match_score >= 0.85"
upgrade_to = "high"

[[rule]]
when = "match_score >= 0.6"
upgrade_to = "medium"

[[rule]]
when = "company_tier == 'stretch'"
downgrade_to = "low"

[[rule]]
when = "match_score >= 0.9"
require_qa = true
"#;

#[test]
fn avoid_tier_short_circuits_everything() {
    let decision = evaluate(
        &signals(Effort::High, 0.95, "avoid"),
        &DomainPolicy::default(),
        &policy(FULL),
    );
    assert_eq!(decision.skip_reason, Some(ReasonCode::AvoidCompany));
    assert_eq!(decision.effort, Effort::Low);
    assert!(!decision.qa_required);
}

#[test]
fn below_threshold_skips_with_low_match() {
    let decision =
        evaluate(&signals(Effort::Medium, 0.15, ""), &DomainPolicy::default(), &policy(FULL));
    assert_eq!(decision.skip_reason, Some(ReasonCode::LowMatch));
}

#[test]
fn threshold_is_exclusive() {
    // Exactly at the threshold is not "below".
    let decision =
        evaluate(&signals(Effort::Low, 0.2, ""), &DomainPolicy::default(), &policy(FULL));
    assert_eq!(decision.skip_reason, None);
}

#[test]
fn skip_rule_fires_before_upgrades() {
    let decision =
        evaluate(&signals(Effort::Low, 0.95, "spam"), &DomainPolicy::default(), &policy(FULL));
    assert_eq!(decision.skip_reason, Some(ReasonCode::PolicySkip));
}

#[test]
fn first_matching_upgrade_wins() {
    // 0.87 matches both upgrade rules; the first (high) applies and
    // iteration stops.
    let decision =
        evaluate(&signals(Effort::Low, 0.87, ""), &DomainPolicy::default(), &policy(FULL));
    assert_eq!(decision.effort, Effort::High);
}

#[test]
fn upgrade_never_lowers() {
    // Hint is high; the 0.6 upgrade-to-medium rule matches first for a
    // 0.7 score but must not drop the effort.
    let decision =
        evaluate(&signals(Effort::High, 0.7, ""), &DomainPolicy::default(), &policy(FULL));
    assert_eq!(decision.effort, Effort::High);
}

#[test]
fn downgrade_after_upgrade() {
    // Stretch-tier downgrade applies after the upgrade phase.
    let decision =
        evaluate(&signals(Effort::Medium, 0.87, "stretch"), &DomainPolicy::default(), &policy(FULL));
    assert_eq!(decision.effort, Effort::Low);
}

#[test]
fn qa_evaluated_once_at_end() {
    let decision =
        evaluate(&signals(Effort::Low, 0.92, ""), &DomainPolicy::default(), &policy(FULL));
    assert_eq!(decision.effort, Effort::High);
    assert!(decision.qa_required);

    let decision =
        evaluate(&signals(Effort::Low, 0.87, ""), &DomainPolicy::default(), &policy(FULL));
    assert!(!decision.qa_required);
}

#[test]
fn empty_policy_returns_hint() {
    let decision = evaluate(
        &signals(Effort::Medium, 0.5, ""),
        &DomainPolicy::default(),
        &EffortPolicy::default(),
    );
    assert_eq!(decision.effort, Effort::Medium);
    assert!(!decision.qa_required);
    assert_eq!(decision.skip_reason, None);
}

#[test]
fn unparseable_rule_counts_as_non_match() {
    let src = r#"
[[rule]]
when = "match_score >>> 1"
upgrade_to = "high"
"#;
    let decision =
        evaluate(&signals(Effort::Low, 0.9, ""), &DomainPolicy::default(), &policy(src));
    assert_eq!(decision.effort, Effort::Low);
}

#[test]
fn type_error_in_predicate_counts_as_non_match() {
    // company_tier is a string; ordering on it fails at eval time and the
    // rule must simply not fire.
    let src = r#"
[[rule]]
when = "company_tier > 'a'"
upgrade_to = "high"
"#;
    let decision =
        evaluate(&signals(Effort::Low, 0.9, "target"), &DomainPolicy::default(), &policy(src));
    assert_eq!(decision.effort, Effort::Low);
}

#[test]
fn domain_variables_are_visible_to_rules() {
    let src = r#"
[[rule]]
when = "domain_max_concurrent == 1 and not domain_avoid"
require_qa = true
"#;
    let decision =
        evaluate(&signals(Effort::Low, 0.5, ""), &DomainPolicy::default(), &policy(src));
    assert!(decision.qa_required);
}

#[test]
fn evaluation_is_deterministic() {
    let sig = signals(Effort::Medium, 0.87, "stretch");
    let domain = DomainPolicy::default();
    let pol = policy(FULL);
    let first = evaluate(&sig, &domain, &pol);
    for _ in 0..10 {
        assert_eq!(evaluate(&sig, &domain, &pol), first);
    }
}
