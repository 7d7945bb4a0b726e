// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn minted_ids_carry_their_kind_prefix() {
    assert!(SessionId::new().as_str().starts_with("ses-"));
    assert!(ApplicationId::new().as_str().starts_with("app-"));
    assert!(WorkerId::new().as_str().starts_with("wkr-"));
    assert!(InterventionId::new().as_str().starts_with("itv-"));
}

#[test]
fn minted_ids_fill_the_inline_buffer() {
    let id = ApplicationId::new();
    assert_eq!(id.as_str().len(), ID_CAP);
    assert_eq!(id.suffix().len(), ID_CAP - ApplicationId::PREFIX.len());
}

#[test]
fn minted_ids_are_unique() {
    let a = ApplicationId::new();
    let b = ApplicationId::new();
    assert_ne!(a, b);
}

#[test]
fn from_string_round_trips() {
    let id = ApplicationId::from_string("app-fixed");
    assert_eq!(id.as_str(), "app-fixed");
    assert_eq!(id.suffix(), "fixed");
}

#[test]
fn suffix_without_prefix_is_whole_string() {
    let id = ApplicationId::from_string("legacy-row");
    assert_eq!(id.suffix(), "legacy-row");
}

#[test]
fn overlong_input_truncates_at_capacity() {
    let id = SessionId::from_string("ses-".repeat(20));
    assert_eq!(id.as_str().len(), 24);
}

#[test]
fn truncation_never_splits_a_character() {
    // 24 ASCII bytes would cut the 'é' (2 bytes) in half; the id must
    // stop one byte earlier and stay valid UTF-8.
    let raw = format!("{}é tail", "x".repeat(23));
    let id = SessionId::from_string(&raw);
    assert_eq!(id.as_str(), "x".repeat(23));
}

#[test]
fn id_serde_is_a_plain_string() {
    let id = SessionId::from_string("ses-abc");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"ses-abc\"");
    let parsed: SessionId = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, id);
}

#[test]
fn id_deserializes_from_an_owned_value() {
    // serde_json::from_value hands the visitor a transient str.
    let parsed: ApplicationId =
        serde_json::from_value(serde_json::Value::String("app-x".to_string())).unwrap();
    assert_eq!(parsed.as_str(), "app-x");
}

#[test]
fn oversized_id_rejected_on_deserialize() {
    let long = format!("\"{}\"", "x".repeat(ID_CAP + 1));
    let parsed: Result<SessionId, _> = serde_json::from_str(&long);
    assert!(parsed.is_err());
}

#[test]
fn borrow_matches_str_hash_for_map_lookups() {
    use std::collections::HashMap;
    let mut map: HashMap<ApplicationId, u32> = HashMap::new();
    map.insert(ApplicationId::from_string("app-x"), 1);
    assert_eq!(map.get("app-x"), Some(&1));
}

#[test]
fn kinds_do_not_unify() {
    // Compile-time property really, but keep the string forms distinct
    // too: the prefixes are the wire-level kind tag.
    assert_ne!(SessionId::PREFIX, ApplicationId::PREFIX);
    assert_ne!(WorkerId::PREFIX, InterventionId::PREFIX);
}
