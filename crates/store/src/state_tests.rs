// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn hash_is_sha256_hex() {
    // sha256("") and sha256("abc") are well-known vectors
    assert_eq!(
        state_hash_hex(b""),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
    assert_eq!(
        state_hash_hex(b"abc"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn hash_is_over_raw_bytes_not_base64() {
    let raw = b"\x02binary state";
    let encoded = base64::engine::general_purpose::STANDARD.encode(raw);
    assert_ne!(state_hash_hex(raw), state_hash_hex(encoded.as_bytes()));
}

#[test]
fn meta_round_trips() {
    let meta = StateMeta {
        size_bytes: 1234,
        hash: state_hash_hex(b"x"),
        created_at: "2026-01-01T00:00:00+00:00".into(),
        from_upload: true,
    };
    let json = serde_json::to_string(&meta).unwrap();
    let back: StateMeta = serde_json::from_str(&json).unwrap();
    assert_eq!(back.size_bytes, 1234);
    assert!(back.from_upload);
}
