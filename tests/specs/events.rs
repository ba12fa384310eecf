// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event bus isolation and the session-deleted cleanup reaction.

use crate::specs::prelude::*;
use runcell_engine::{CleanupScheduler, CleanupSchedulerConfig};
use runcell_store::FileStore as _;
use std::sync::atomic::{AtomicUsize, Ordering};

#[tokio::test]
async fn a_panicking_handler_equivalent_does_not_starve_peers() {
    let bus = EventBus::new();
    let delivered = Arc::new(AtomicUsize::new(0));

    bus.subscribe(EventKind::ExecutionCompleted, |_| async {
        Err("handler blew up".to_string())
    });
    {
        let delivered = delivered.clone();
        bus.subscribe(EventKind::ExecutionCompleted, move |_| {
            let delivered = delivered.clone();
            async move {
                delivered.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
    }

    let event = Event::ExecutionCompleted {
        execution_id: runcell_core::ExecutionId::new(),
        session_id: SessionId::new(),
        success: true,
        execution_time_ms: Some(5),
    };
    bus.publish(event.clone()).await;
    assert_eq!(delivered.load(Ordering::SeqCst), 1);

    // publish_and_wait reports exactly the one failure
    let errors = bus.publish_and_wait(event).await;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0], "handler blew up");
}

#[tokio::test]
async fn execution_completed_is_published_after_each_run() {
    let backend = ScriptedBackend::new(Script::stdout("ok\n"));
    let world = World::new(backend);
    let completions = Arc::new(AtomicUsize::new(0));
    {
        let completions = completions.clone();
        world.bus.subscribe(EventKind::ExecutionCompleted, move |_| {
            let completions = completions.clone();
            async move {
                completions.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
    }

    world.exec(request("print('ok')", "py")).await.unwrap();
    world.exec(request("print('ok')", "py")).await.unwrap();
    assert_eq!(completions.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn deleting_a_session_cleans_its_files_via_the_bus() {
    let backend = ScriptedBackend::new(Script::stdout(""));
    let world = World::new(backend);
    let scheduler = CleanupScheduler::new(
        world.files.clone(),
        None,
        CleanupSchedulerConfig { archive_enabled: false, ..Default::default() },
    );
    scheduler.clone().start(&world.bus);

    let sid = SessionId::new();
    world
        .files
        .store_uploaded_file(&sid, "doomed.txt", b"x".to_vec(), None)
        .await
        .unwrap();
    assert_eq!(world.files.file_count(), 1);

    world.bus.publish(Event::SessionDeleted { session_id: sid }).await;
    assert_eq!(world.files.file_count(), 0);
    scheduler.stop(&world.bus);
}
