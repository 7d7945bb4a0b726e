// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Effort-policy rule files: TOML in, compiled rule list out.
//!
//! A rule file looks like:
//!
//! ```toml
//! skip_threshold = 0.2
//!
//! [[rule]]
//! when = "match_score >= 0.85"
//! upgrade_to = "high"
//!
//! [[rule]]
//! when = "company_tier == 'stretch'"
//! downgrade_to = "low"
//!
//! [[rule]]
//! when = "company_tier in ['spam', 'recruiter_farm']"
//! skip = true
//!
//! [[rule]]
//! when = "match_score >= 0.9"
//! require_qa = true
//! ```
//!
//! Rules are compiled once at load. A predicate that fails to parse is
//! logged once and compiled to never-matches; an unknown identifier is a
//! load error.

use crate::error::PolicyError;
use crate::expr::Expr;
use lw_core::Effort;
use serde::Deserialize;
use std::path::Path;

/// Identifiers a predicate may reference.
const KNOWN_IDENTIFIERS: &[&str] = &[
    "hint_effort",
    "match_score",
    "company_tier",
    "domain_avoid",
    "domain_max_per_day",
    "domain_min_interval_seconds",
    "domain_max_concurrent",
];

/// Action taken when a rule's predicate matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    UpgradeTo(Effort),
    DowngradeTo(Effort),
    Skip,
    RequireQa,
}

/// A rule with its predicate compiled.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    /// Source text of the predicate, kept for diagnostics
    pub when: String,
    /// None when the predicate failed to parse; such a rule never matches
    pub expr: Option<Expr>,
    pub action: RuleAction,
}

/// An ordered effort policy.
#[derive(Debug, Clone)]
pub struct EffortPolicy {
    pub skip_threshold: f64,
    pub rules: Vec<CompiledRule>,
}

impl Default for EffortPolicy {
    fn default() -> Self {
        Self { skip_threshold: 0.2, rules: Vec::new() }
    }
}

#[derive(Debug, Deserialize)]
struct RawPolicy {
    #[serde(default = "default_skip_threshold")]
    skip_threshold: f64,
    #[serde(default, rename = "rule")]
    rules: Vec<RawRule>,
}

fn default_skip_threshold() -> f64 {
    0.2
}

#[derive(Debug, Deserialize)]
struct RawRule {
    when: String,
    #[serde(default)]
    upgrade_to: Option<Effort>,
    #[serde(default)]
    downgrade_to: Option<Effort>,
    #[serde(default)]
    skip: Option<bool>,
    #[serde(default)]
    require_qa: Option<bool>,
}

impl RawRule {
    fn action(&self, index: usize) -> Result<RuleAction, PolicyError> {
        let mut actions = Vec::new();
        if let Some(effort) = self.upgrade_to {
            actions.push(RuleAction::UpgradeTo(effort));
        }
        if let Some(effort) = self.downgrade_to {
            actions.push(RuleAction::DowngradeTo(effort));
        }
        if self.skip == Some(true) {
            actions.push(RuleAction::Skip);
        }
        if self.require_qa == Some(true) {
            actions.push(RuleAction::RequireQa);
        }
        match actions.as_slice() {
            [single] => Ok(*single),
            _ => Err(PolicyError::AmbiguousAction { index }),
        }
    }
}

impl EffortPolicy {
    /// Parse and compile a policy from TOML source.
    pub fn from_toml_str(src: &str) -> Result<Self, PolicyError> {
        let raw: RawPolicy = toml::from_str(src)?;
        if !(0.0..=1.0).contains(&raw.skip_threshold) {
            return Err(PolicyError::BadThreshold(raw.skip_threshold));
        }

        let mut rules = Vec::with_capacity(raw.rules.len());
        for (index, raw_rule) in raw.rules.into_iter().enumerate() {
            let action = raw_rule.action(index)?;
            let expr = match Expr::parse(&raw_rule.when) {
                Ok(expr) => {
                    let mut idents = Vec::new();
                    expr.identifiers(&mut idents);
                    if let Some(unknown) =
                        idents.iter().find(|name| !KNOWN_IDENTIFIERS.contains(&name.as_str()))
                    {
                        return Err(PolicyError::UnknownIdentifier {
                            index,
                            ident: unknown.clone(),
                            predicate: raw_rule.when.clone(),
                        });
                    }
                    Some(expr)
                }
                Err(err) => {
                    // Logged once here at load; the rule simply never fires.
                    tracing::warn!(rule = index, predicate = %raw_rule.when, error = %err,
                        "unparseable policy predicate, treating as false");
                    None
                }
            };
            rules.push(CompiledRule { when: raw_rule.when, expr, action });
        }

        Ok(Self { skip_threshold: raw.skip_threshold, rules })
    }

    /// Load a policy file from disk.
    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let src = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&src)
    }

    /// Rules in declared order whose action is an upgrade.
    pub fn upgrades(&self) -> impl Iterator<Item = (&CompiledRule, Effort)> {
        self.rules.iter().filter_map(|rule| match rule.action {
            RuleAction::UpgradeTo(effort) => Some((rule, effort)),
            _ => None,
        })
    }

    /// Rules in declared order whose action is a downgrade.
    pub fn downgrades(&self) -> impl Iterator<Item = (&CompiledRule, Effort)> {
        self.rules.iter().filter_map(|rule| match rule.action {
            RuleAction::DowngradeTo(effort) => Some((rule, effort)),
            _ => None,
        })
    }

    /// Rules in declared order whose action is a skip.
    pub fn skips(&self) -> impl Iterator<Item = &CompiledRule> {
        self.rules.iter().filter(|rule| rule.action == RuleAction::Skip)
    }

    /// Rules in declared order whose action requires QA.
    pub fn qa_rules(&self) -> impl Iterator<Item = &CompiledRule> {
        self.rules.iter().filter(|rule| rule.action == RuleAction::RequireQa)
    }
}

#[cfg(test)]
#[path = "rules_tests.rs"]
mod tests;
