// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stealth/domain policy and profile-truth config files.

use crate::error::PolicyError;
use lw_core::DomainPolicy;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Per-domain stealth policy map with a fallback default.
///
/// ```toml
/// [default]
/// max_per_day = 20
/// min_interval_seconds = 60
///
/// [domains."ats.company.com"]
/// min_interval_seconds = 120
/// max_concurrent = 1
///
/// [domains."blocked.example.com"]
/// avoid = true
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StealthPolicy {
    #[serde(default)]
    pub default: DomainPolicy,
    #[serde(default)]
    pub domains: BTreeMap<String, DomainPolicy>,
}

impl StealthPolicy {
    pub fn from_toml_str(src: &str) -> Result<Self, PolicyError> {
        Ok(toml::from_str(src)?)
    }

    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let src = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&src)
    }

    /// Policy for a domain, falling back to the default entry.
    pub fn for_domain(&self, domain: &str) -> &DomainPolicy {
        self.domains.get(domain).unwrap_or(&self.default)
    }
}

/// Ground truth about the user's skills, surfaced to the QA gate as a
/// read-only reference. Consumed by the external generator; the core
/// never interprets the entries.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileTruth {
    #[serde(default)]
    pub skills_true: Vec<String>,
    #[serde(default)]
    pub skills_false: Vec<String>,
}

impl ProfileTruth {
    pub fn from_toml_str(src: &str) -> Result<Self, PolicyError> {
        Ok(toml::from_str(src)?)
    }

    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let src = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&src)
    }
}

#[cfg(test)]
#[path = "stealth_tests.rs"]
mod tests;
