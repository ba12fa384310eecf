// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn key_schema_is_stable() {
    let sid = SessionId::from_string("s1");
    let fid = FileId::from_string("f1");
    assert_eq!(session_key(&sid), "sessions:s1");
    assert_eq!(entity_sessions_key("agent-9"), "entity_sessions:agent-9");
    assert_eq!(file_meta_key(&sid, &fid), "files:s1:f1");
    assert_eq!(session_files_key(&sid), "session_files:s1");
    assert_eq!(state_key(&sid), "session:state:s1");
    assert_eq!(state_hash_key(&sid), "session:state:hash:s1");
    assert_eq!(state_meta_key(&sid), "session:state:meta:s1");
    assert_eq!(state_upload_marker_key(&sid), "session:state:uploaded:s1");
    assert_eq!(object_file_key(&sid, FileOrigin::Upload, &fid), "sessions/s1/uploads/f1");
    assert_eq!(object_file_key(&sid, FileOrigin::Output, &fid), "sessions/s1/outputs/f1");
    assert_eq!(object_state_key(&sid), "states/s1/state.dat");
}

#[parameterized(
    upload = { "sessions/abc/uploads/f1", Some("abc") },
    output = { "sessions/abc/outputs/f2", Some("abc") },
    bare_session = { "sessions/abc", None },
    wrong_root = { "states/abc/state.dat", None },
    empty_sid = { "sessions//uploads/f1", None },
)]
fn object_key_parsing(key: &str, expected: Option<&str>) {
    assert_eq!(session_from_object_key(key), expected);
}

#[test]
fn state_key_parsing_excludes_sibling_keys() {
    let sid = SessionId::from_string("abc");
    assert_eq!(session_from_state_key(&state_key(&sid)), Some(sid));
    assert_eq!(session_from_state_key(&state_hash_key(&sid)), None);
    assert_eq!(session_from_state_key(&state_meta_key(&sid)), None);
    assert_eq!(session_from_state_key(&state_upload_marker_key(&sid)), None);
    assert_eq!(session_from_state_key("other:key"), None);
}

#[test]
fn state_object_key_parsing() {
    assert_eq!(session_from_state_object_key("states/abc/state.dat"), Some("abc"));
    assert_eq!(session_from_state_object_key("sessions/abc/uploads/f"), None);
    assert_eq!(session_from_state_object_key("states//state.dat"), None);
}
