// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for the hash-field serialization. Registry behavior against a live
//! store is covered by the in-memory double's tests and the workspace specs.

use super::*;

fn sample_session() -> Session {
    let now = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
    let mut meta = HashMap::new();
    meta.insert("entity_id".to_string(), "agent-1".to_string());
    Session::new(now, 3600, meta)
}

#[test]
fn fields_round_trip() {
    let session = sample_session();
    let fields: HashMap<String, String> = session_to_fields(&session).into_iter().collect();
    let back = session_from_fields(&fields).unwrap();
    assert_eq!(back, session);
}

#[test]
fn missing_metadata_parses_as_empty() {
    let session = sample_session();
    let mut fields: HashMap<String, String> = session_to_fields(&session).into_iter().collect();
    fields.insert("metadata".into(), String::new());
    let back = session_from_fields(&fields).unwrap();
    assert!(back.metadata.is_empty());
}

#[test]
fn missing_timestamp_is_an_error() {
    let session = sample_session();
    let mut fields: HashMap<String, String> = session_to_fields(&session).into_iter().collect();
    fields.remove("expires_at");
    let err = session_from_fields(&fields).unwrap_err();
    assert!(err.contains("expires_at"), "{err}");
}

#[test]
fn unknown_status_is_an_error() {
    let session = sample_session();
    let mut fields: HashMap<String, String> = session_to_fields(&session).into_iter().collect();
    fields.insert("status".into(), "zombie".into());
    let err = session_from_fields(&fields).unwrap_err();
    assert!(err.contains("bad status"), "{err}");
}

#[test]
fn timestamps_are_rfc3339() {
    let session = sample_session();
    let fields: HashMap<String, String> = session_to_fields(&session).into_iter().collect();
    let created = fields.get("created_at").unwrap();
    assert!(DateTime::parse_from_rfc3339(created).is_ok(), "{created}");
}
