// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-target-host stealth policy and job-URL host canonicalization.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Per-domain admission policy, loaded at session start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainPolicy {
    /// Applications allowed per local calendar day
    #[serde(default = "default_max_per_day")]
    pub max_per_day: u32,
    /// Minimum spacing between two starts on the same domain
    #[serde(with = "secs_serde", rename = "min_interval_seconds", default = "default_min_interval")]
    pub min_interval: Duration,
    /// Concurrent in-flight ceiling for the domain
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: u32,
    /// Never apply here
    #[serde(default)]
    pub avoid: bool,
    /// Cooldown applied when the domain trips (block page, rate response)
    #[serde(with = "secs_serde", rename = "cooldown_seconds", default = "default_cooldown")]
    pub cooldown: Duration,
}

fn default_max_per_day() -> u32 {
    20
}

fn default_min_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_max_concurrent() -> u32 {
    1
}

fn default_cooldown() -> Duration {
    Duration::from_secs(30 * 60)
}

impl Default for DomainPolicy {
    fn default() -> Self {
        Self {
            max_per_day: default_max_per_day(),
            min_interval: default_min_interval(),
            max_concurrent: default_max_concurrent(),
            avoid: false,
            cooldown: default_cooldown(),
        }
    }
}

/// Errors from job-URL canonicalization.
#[derive(Debug, Error, PartialEq)]
pub enum DomainError {
    #[error("not an http(s) URL: {0}")]
    UnsupportedScheme(String),
    #[error("URL has no host: {0}")]
    MissingHost(String),
}

/// Derive the rate-policy key from a job URL.
///
/// Canonicalization: scheme must be http(s); userinfo and port are
/// stripped; the host is lowercased; a trailing dot and a single leading
/// `www.` label are removed.
pub fn domain_from_url(url: &str) -> Result<String, DomainError> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| DomainError::UnsupportedScheme(url.to_string()))?;

    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    // Strip userinfo, then port
    let host = authority.rsplit('@').next().unwrap_or_default();
    let host = match host.split_once(':') {
        Some((h, _port)) => h,
        None => host,
    };
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();

    if host.is_empty() {
        return Err(DomainError::MissingHost(url.to_string()));
    }
    Ok(host)
}

mod secs_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
        duration.as_secs().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
#[path = "domain_tests.rs"]
mod tests;
