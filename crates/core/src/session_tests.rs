// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn now() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
}

#[test]
fn new_session_is_active_and_expires_after_creation() {
    let session = Session::new(now(), 3600, HashMap::new());
    assert!(session.is_active());
    assert!(session.expires_at > session.created_at);
    assert_eq!(session.last_activity, session.created_at);
}

#[test]
fn zero_ttl_still_expires_strictly_after_creation() {
    let session = Session::new(now(), 0, HashMap::new());
    assert!(session.expires_at > session.created_at);
}

#[test]
fn expiry_check_uses_wall_clock() {
    let session = Session::new(now(), 60, HashMap::new());
    assert!(!session.is_expired(now()));
    assert!(session.is_expired(now() + Duration::seconds(61)));
}

#[test]
fn metadata_accessors() {
    let mut meta = HashMap::new();
    meta.insert("entity_id".to_string(), "agent-7".to_string());
    meta.insert("user_id".to_string(), "u-1".to_string());
    let session = Session::new(now(), 60, meta);
    assert_eq!(session.entity_id(), Some("agent-7"));
    assert_eq!(session.user_id(), Some("u-1"));
}

#[test]
fn status_round_trips_through_str() {
    for status in [
        SessionStatus::Active,
        SessionStatus::Idle,
        SessionStatus::Terminated,
        SessionStatus::Error,
    ] {
        assert_eq!(SessionStatus::parse(status.as_str()), Some(status));
    }
    assert_eq!(SessionStatus::parse("zombie"), None);
}
