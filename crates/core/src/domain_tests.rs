// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    plain        = { "https://careers.example.com/jobs/1",      "careers.example.com" },
    http         = { "http://ats.company.com/apply",            "ats.company.com" },
    uppercase    = { "https://ATS.Company.COM/apply",           "ats.company.com" },
    port         = { "https://careers.example.com:8443/x",      "careers.example.com" },
    www          = { "https://www.greenhouse.io/acme/jobs/2",   "greenhouse.io" },
    userinfo     = { "https://user:pw@careers.example.com/x",   "careers.example.com" },
    trailing_dot = { "https://careers.example.com./jobs",       "careers.example.com" },
    query_only   = { "https://lever.co?posting=9",              "lever.co" },
    fragment     = { "https://lever.co#top",                    "lever.co" },
    bare_host    = { "https://workday.com",                     "workday.com" },
)]
fn canonicalizes_host(url: &str, expected: &str) {
    assert_eq!(domain_from_url(url).unwrap(), expected);
}

#[test]
fn rejects_non_http_schemes() {
    assert!(matches!(
        domain_from_url("ftp://careers.example.com/x"),
        Err(DomainError::UnsupportedScheme(_))
    ));
    assert!(matches!(domain_from_url("careers.example.com"), Err(DomainError::UnsupportedScheme(_))));
}

#[test]
fn rejects_missing_host() {
    assert!(matches!(domain_from_url("https:///jobs/1"), Err(DomainError::MissingHost(_))));
    assert!(matches!(domain_from_url("https://"), Err(DomainError::MissingHost(_))));
}

#[test]
fn policy_defaults_match_stealth_baseline() {
    let policy = DomainPolicy::default();
    assert_eq!(policy.max_per_day, 20);
    assert_eq!(policy.min_interval, Duration::from_secs(60));
    assert_eq!(policy.max_concurrent, 1);
    assert!(!policy.avoid);
    assert_eq!(policy.cooldown, Duration::from_secs(1800));
}

#[test]
fn policy_serde_uses_second_fields() {
    let json = serde_json::json!({
        "max_per_day": 5,
        "min_interval_seconds": 120,
        "max_concurrent": 2,
        "avoid": false,
        "cooldown_seconds": 600,
    });
    let policy: DomainPolicy = serde_json::from_value(json).unwrap();
    assert_eq!(policy.min_interval, Duration::from_secs(120));
    assert_eq!(policy.cooldown, Duration::from_secs(600));

    let back = serde_json::to_value(&policy).unwrap();
    assert_eq!(back["min_interval_seconds"], 120);
}

#[test]
fn partial_policy_fills_defaults() {
    let policy: DomainPolicy = serde_json::from_value(serde_json::json!({"avoid": true})).unwrap();
    assert!(policy.avoid);
    assert_eq!(policy.max_per_day, 20);
}
