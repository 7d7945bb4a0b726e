// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

const SAMPLE: &str = r#"
[default]
max_per_day = 30
min_interval_seconds = 45

[domains."ats.company.com"]
min_interval_seconds = 120
max_concurrent = 1

[domains."blocked.example.com"]
avoid = true
"#;

#[test]
fn known_domain_uses_its_entry() {
    let stealth = StealthPolicy::from_toml_str(SAMPLE).unwrap();
    let policy = stealth.for_domain("ats.company.com");
    assert_eq!(policy.min_interval, Duration::from_secs(120));
    // Unset fields take serde defaults, not the [default] section.
    assert_eq!(policy.max_per_day, 20);
}

#[test]
fn unknown_domain_falls_back_to_default() {
    let stealth = StealthPolicy::from_toml_str(SAMPLE).unwrap();
    let policy = stealth.for_domain("careers.example.com");
    assert_eq!(policy.max_per_day, 30);
    assert_eq!(policy.min_interval, Duration::from_secs(45));
}

#[test]
fn avoid_flag_parses() {
    let stealth = StealthPolicy::from_toml_str(SAMPLE).unwrap();
    assert!(stealth.for_domain("blocked.example.com").avoid);
}

#[test]
fn empty_file_is_all_defaults() {
    let stealth = StealthPolicy::from_toml_str("").unwrap();
    assert_eq!(stealth.for_domain("any.example.com").max_per_day, 20);
    assert!(stealth.domains.is_empty());
}

#[test]
fn profile_truth_parses() {
    let truth = ProfileTruth::from_toml_str(
        r#"
skills_true = ["rust", "sql"]
skills_false = ["cobol"]
"#,
    )
    .unwrap();
    assert_eq!(truth.skills_true, vec!["rust", "sql"]);
    assert_eq!(truth.skills_false, vec!["cobol"]);
}

#[test]
fn load_reads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stealth.toml");
    std::fs::write(&path, SAMPLE).unwrap();
    let stealth = StealthPolicy::load(&path).unwrap();
    assert_eq!(stealth.domains.len(), 2);
}
