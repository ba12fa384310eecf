// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end execution specs over the orchestrator pipeline.

use crate::specs::prelude::*;
use runcell_sandbox::{SidecarFile, SidecarResult};

#[tokio::test]
async fn python_sum_round_trip() {
    let backend = ScriptedBackend::new(Script::stdout("py: 55\n"));
    let world = World::new(backend.clone());

    let response = world
        .exec(request("s=0\nfor i in range(1,11): s+=i\nprint('py:',s)", "py"))
        .await
        .unwrap();
    assert_eq!(response.stdout, "py: 55\n");
    assert_eq!(response.stderr, "");
    assert_eq!(world.sessions.len(), 1);
}

#[tokio::test]
async fn go_sum_exact_output() {
    let backend = ScriptedBackend::new(Script::stdout("go: sum(1..10)=55\n"));
    let world = World::new(backend);

    let code = "package main\n\nimport (\n\t\"fmt\"\n)\n\nfunc main() {\n\ts := 0\n\tfor i := 1; i <= 10; i++ {\n\t\ts += i\n\t}\n\tfmt.Printf(\"go: sum(1..10)=%d\\n\", s)\n}";
    let response = world.exec(request(code, "go")).await.unwrap();
    assert_eq!(response.stdout, "go: sum(1..10)=55\n");
}

#[tokio::test]
async fn unknown_language_does_not_leak_sessions_or_sandboxes() {
    let backend = ScriptedBackend::new(Script::stdout("x"));
    let world = World::new(backend.clone());

    let err = world.exec(request("print('x')", "fortranXX")).await.unwrap_err();
    assert_eq!(err.status_code(), 400);
    assert_eq!(world.sessions.len(), 0);
    assert!(backend.executed.lock().is_empty());
}

#[tokio::test]
async fn timeout_scenario_destroys_the_sandbox() {
    let backend = ScriptedBackend::new(Script {
        result: SidecarResult::timed_out(2),
        listed: Vec::new(),
        with_handle: true,
    });
    let world = World::new(backend.clone());

    let response = world
        .exec(request("import time\ntime.sleep(300)", "py"))
        .await
        .unwrap();
    assert!(response.stderr.contains("timed out"));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(backend.destroyed.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn generated_file_lands_in_the_file_store() {
    let backend = ScriptedBackend::new(Script {
        listed: vec![SidecarFile { path: "/mnt/data/out.txt".into(), size: 5 }],
        ..Script::stdout("")
    });
    backend.fetchable.lock().insert("/mnt/data/out.txt".into(), b"hello".to_vec());
    let world = World::new(backend);

    let response = world
        .exec(request("open('out.txt','w').write('hello')", "py"))
        .await
        .unwrap();
    assert_eq!(response.files.len(), 1);
    assert_eq!(response.files[0].name, "out.txt");

    let sid = SessionId::from_string(&response.session_id);
    let fid = runcell_core::FileId::from_string(&response.files[0].id);
    use runcell_store::FileStore as _;
    let content = world.files.content(&sid, &fid).await.unwrap().unwrap();
    assert_eq!(content, b"hello");
}

#[tokio::test]
async fn entity_sessions_are_reused_until_expiry() {
    let backend = ScriptedBackend::new(Script::stdout("1\n"));
    let world = World::new(backend);

    let mut req = request("print(1)", "py");
    req.entity_id = Some("assistant-1".into());

    let first = world.exec(req.clone()).await.unwrap();
    let second = world.exec(req.clone()).await.unwrap();
    assert_eq!(first.session_id, second.session_id);

    // after the TTL passes and the sweep runs, a new session is created
    world.clock.advance(Duration::from_secs(4000));
    use runcell_store::SessionStore as _;
    world.sessions.cleanup_expired().await.unwrap();
    let third = world.exec(req).await.unwrap();
    assert_ne!(first.session_id, third.session_id);
}
