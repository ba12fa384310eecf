// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;
use std::collections::HashMap;

// --- generate_id() tests ---

#[test]
fn generated_ids_are_21_chars() {
    for _ in 0..100 {
        assert_eq!(generate_id().len(), ID_LEN);
    }
}

#[test]
fn generated_ids_are_unique() {
    let a = generate_id();
    let b = generate_id();
    assert_ne!(a, b);
}

#[test]
fn generated_ids_have_alphanumeric_boundaries() {
    for _ in 0..500 {
        let id = generate_id();
        let bytes = id.as_bytes();
        assert!(bytes[0].is_ascii_alphanumeric(), "bad first char in {id}");
        assert!(bytes[ID_LEN - 1].is_ascii_alphanumeric(), "bad last char in {id}");
        assert!(
            bytes.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'_' || *b == b'-'),
            "bad interior char in {id}"
        );
    }
}

proptest! {
    #[test]
    fn id_round_trips_through_idbuf(s in "[A-Za-z0-9_-]{1,21}") {
        let buf = IdBuf::new(&s);
        prop_assert_eq!(buf.as_str(), s.as_str());
    }
}

// --- define_id! macro tests ---

#[test]
fn define_id_hash_map_lookup() {
    let mut map = HashMap::new();
    map.insert(SessionId::from_string("k"), 42);
    assert_eq!(map.get("k"), Some(&42));
}

#[test]
fn define_id_new_is_valid() {
    let id = SessionId::new();
    assert_eq!(id.as_str().len(), ID_LEN);
}

#[test]
fn define_id_short_truncates() {
    let id = SessionId::from_string("abcdefghijklmnop");
    assert_eq!(id.short(12), "abcdefghijkl");
    assert_eq!(id.short(100), "abcdefghijklmnop");
}

#[test]
fn define_id_serde_is_transparent() {
    let id = FileId::from_string("file-abc");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"file-abc\"");
    let back: FileId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}

#[test]
fn oversized_id_rejected_on_deserialize() {
    let json = format!("\"{}\"", "x".repeat(40));
    assert!(serde_json::from_str::<SessionId>(&json).is_err());
}

// --- short() tests ---

#[test]
fn short_fn_on_str() {
    let s = "abcdefghijklmnop";
    assert_eq!(short(s, 8), "abcdefgh");
    assert_eq!(short(s, 100), s);
    assert_eq!(short("abc", 8), "abc");
}
