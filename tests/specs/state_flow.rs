// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interpreter-state persistence specs: hot cache, upload marker, and
//! cold-archive rehydration.

use crate::specs::prelude::*;
use base64::Engine as _;
use runcell_store::{state_hash_hex, StateArchive as _};

fn b64(raw: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(raw)
}

#[tokio::test]
async fn state_round_trip_across_two_executions() {
    let captured = b64(b"\x02x=41");
    let backend = ScriptedBackend::new(Script::stdout("").with_state(&captured));
    let world = World::new(backend.clone());

    let first = world.exec(request("x = 41", "py")).await.unwrap();
    assert!(first.has_state);
    assert_eq!(first.state_size, Some(5));
    assert_eq!(first.state_hash.as_deref(), Some(state_hash_hex(b"\x02x=41").as_str()));

    backend.set_script(Script::stdout("42\n"));
    let mut req = request("print(x+1)", "py");
    req.session_id = Some(first.session_id.clone());
    let second = world.exec(req).await.unwrap();
    assert!(second.stdout.starts_with("42"));

    let replay = &backend.executed.lock()[1];
    assert_eq!(replay.initial_state.as_deref(), Some(captured.as_str()));
}

#[tokio::test]
async fn hash_always_matches_stored_bytes() {
    let backend = ScriptedBackend::new(Script::stdout(""));
    let world = World::new(backend);
    let sid = SessionId::new();

    for payload in [&b"\x02tiny"[..], &b"\x02a much larger state blob with more bytes"[..]] {
        world.state.save_state_raw(&sid, payload, None, false).await.unwrap();
        let hash = world.state.state_hash(&sid).await.unwrap().unwrap();
        assert_eq!(hash, state_hash_hex(payload));
        let raw = world.state.get_state_raw(&sid).await.unwrap().unwrap();
        assert_eq!(raw, payload);
    }
}

#[tokio::test]
async fn archived_state_is_rehydrated_on_next_execution() {
    let backend = ScriptedBackend::new(Script::stdout(""));
    let world = World::new(backend.clone());

    // a session whose hot state expired but whose archive survives
    use runcell_store::SessionStore as _;
    let session = world.sessions.create(Default::default()).await.unwrap();
    let sid = session.session_id;
    let archived = b64(b"\x02cold state");
    world.archive.archive(&sid, &archived).await.unwrap();
    assert!(world.state.get_state(&sid).await.unwrap().is_none());

    let mut req = request("print(x)", "py");
    req.session_id = Some(sid.to_string());
    world.exec(req).await.unwrap();

    let exec = &backend.executed.lock()[0];
    assert_eq!(exec.initial_state.as_deref(), Some(archived.as_str()));
    // restore rehydrated the hot cache
    assert_eq!(world.state.get_state(&sid).await.unwrap().unwrap(), archived);
}

#[tokio::test]
async fn inactive_states_migrate_to_the_archive() {
    let backend = ScriptedBackend::new(Script::stdout(""));
    let world = World::new(backend);
    let sid = SessionId::new();
    world.state.save_state_raw(&sid, b"\x02idle", None, false).await.unwrap();

    let sweep = world.archive.archive_inactive().await.unwrap();
    assert_eq!(sweep.archived, 1);
    assert!(world.archive.exists(&sid).await.unwrap());

    // a second sweep is a no-op
    let sweep = world.archive.archive_inactive().await.unwrap();
    assert_eq!(sweep.archived, 0);
    assert_eq!(sweep.already_archived, 1);
}
