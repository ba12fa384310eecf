// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Redis key and object-store key schema.
//!
//! Every key used by the storage layer is built here so the schema lives in
//! one place:
//!
//! - `sessions:<id>` (hash), `sessions:index` (set), `entity_sessions:<eid>` (set)
//! - `files:<sid>:<fid>` (hash), `session_files:<sid>` (set)
//! - `session:state:<sid>`, `session:state:hash:<sid>`,
//!   `session:state:meta:<sid>`, `session:state:uploaded:<sid>`
//! - objects: `sessions/<sid>/{uploads|outputs}/<fid>`, `states/<sid>/state.dat`

use runcell_core::{FileId, FileOrigin, SessionId};

pub const SESSION_INDEX_KEY: &str = "sessions:index";
pub const SESSION_PREFIX: &str = "sessions:";
pub const STATE_PREFIX: &str = "session:state:";

pub fn session_key(id: &SessionId) -> String {
    format!("sessions:{id}")
}

pub fn entity_sessions_key(entity_id: &str) -> String {
    format!("entity_sessions:{entity_id}")
}

pub fn file_meta_key(session_id: &SessionId, file_id: &FileId) -> String {
    format!("files:{session_id}:{file_id}")
}

pub fn session_files_key(session_id: &SessionId) -> String {
    format!("session_files:{session_id}")
}

pub fn state_key(session_id: &SessionId) -> String {
    format!("session:state:{session_id}")
}

pub fn state_hash_key(session_id: &SessionId) -> String {
    format!("session:state:hash:{session_id}")
}

pub fn state_meta_key(session_id: &SessionId) -> String {
    format!("session:state:meta:{session_id}")
}

pub fn state_upload_marker_key(session_id: &SessionId) -> String {
    format!("session:state:uploaded:{session_id}")
}

/// Session id embedded in a hot-state key, if the key matches the schema.
/// Hash/meta/marker keys share the prefix and must not match.
pub fn session_from_state_key(key: &str) -> Option<SessionId> {
    let rest = key.strip_prefix(STATE_PREFIX)?;
    if rest.is_empty() || rest.contains(':') {
        return None;
    }
    Some(SessionId::from_string(rest))
}

// --- object store keys ---

pub const OBJECT_SESSIONS_PREFIX: &str = "sessions/";
pub const OBJECT_STATES_PREFIX: &str = "states/";

pub fn object_file_key(session_id: &SessionId, origin: FileOrigin, file_id: &FileId) -> String {
    format!("sessions/{session_id}/{}/{file_id}", origin.key_segment())
}

pub fn object_state_key(session_id: &SessionId) -> String {
    format!("states/{session_id}/state.dat")
}

/// Parse `sessions/<sid>/<segment>/<fid>` back into its session id.
pub fn session_from_object_key(key: &str) -> Option<&str> {
    let mut parts = key.split('/');
    if parts.next() != Some("sessions") {
        return None;
    }
    let sid = parts.next()?;
    // Require at least the type segment so bare `sessions/<sid>` is ignored.
    parts.next()?;
    if sid.is_empty() {
        return None;
    }
    Some(sid)
}

/// Parse `states/<sid>/state.dat` back into its session id.
pub fn session_from_state_object_key(key: &str) -> Option<&str> {
    let mut parts = key.split('/');
    if parts.next() != Some("states") {
        return None;
    }
    let sid = parts.next()?;
    if sid.is_empty() {
        return None;
    }
    Some(sid)
}

#[cfg(test)]
#[path = "keys_tests.rs"]
mod tests;
