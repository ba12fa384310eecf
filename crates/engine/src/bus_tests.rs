// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use runcell_core::SessionId;
use std::sync::atomic::AtomicUsize;

fn deleted(id: &str) -> Event {
    Event::SessionDeleted { session_id: SessionId::from_string(id) }
}

#[tokio::test]
async fn publish_reaches_all_handlers_for_the_kind() {
    let bus = EventBus::new();
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let calls = calls.clone();
        bus.subscribe(EventKind::SessionDeleted, move |_| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
    }
    // a handler for a different kind must not fire
    let other = Arc::new(AtomicUsize::new(0));
    {
        let other = other.clone();
        bus.subscribe(EventKind::PoolWarmed, move |_| {
            let other = other.clone();
            async move {
                other.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
    }

    bus.publish(deleted("s1")).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(other.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failing_handler_does_not_abort_peers() {
    let bus = EventBus::new();
    let survivors = Arc::new(AtomicUsize::new(0));

    bus.subscribe(EventKind::SessionDeleted, |_| async {
        Err("first handler exploded".to_string())
    });
    for _ in 0..2 {
        let survivors = survivors.clone();
        bus.subscribe(EventKind::SessionDeleted, move |_| {
            let survivors = survivors.clone();
            async move {
                survivors.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
    }

    bus.publish(deleted("s1")).await;
    assert_eq!(survivors.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn publish_and_wait_collects_exactly_the_failures() {
    let bus = EventBus::new();
    bus.subscribe(EventKind::SessionDeleted, |_| async { Ok(()) });
    bus.subscribe(EventKind::SessionDeleted, |_| async { Err("boom".to_string()) });
    bus.subscribe(EventKind::SessionDeleted, |_| async { Ok(()) });

    let errors = bus.publish_and_wait(deleted("s1")).await;
    assert_eq!(errors, vec!["boom".to_string()]);
}

#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let bus = EventBus::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let id = {
        let calls = calls.clone();
        bus.subscribe(EventKind::SessionDeleted, move |_| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    };

    assert!(bus.unsubscribe(EventKind::SessionDeleted, id));
    assert!(!bus.unsubscribe(EventKind::SessionDeleted, id));
    bus.publish(deleted("s1")).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn clear_removes_one_kind_or_all() {
    let bus = EventBus::new();
    let calls = Arc::new(AtomicUsize::new(0));
    for kind in [EventKind::SessionDeleted, EventKind::PoolWarmed] {
        let calls = calls.clone();
        bus.subscribe(kind, move |_| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
    }

    bus.clear(Some(EventKind::SessionDeleted));
    bus.publish(deleted("s1")).await;
    bus.publish(Event::PoolWarmed { language: runcell_core::Language::Py, count: 1 }).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    bus.clear(None);
    bus.publish(Event::PoolWarmed { language: runcell_core::Language::Py, count: 1 }).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn forwarder_bridges_channel_to_bus() {
    let bus = Arc::new(EventBus::new());
    let calls = Arc::new(AtomicUsize::new(0));
    {
        let calls = calls.clone();
        bus.subscribe(EventKind::SessionDeleted, move |_| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let task = spawn_event_forwarder(rx, bus.clone());
    tx.send(deleted("s1")).unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    task.abort();
}
