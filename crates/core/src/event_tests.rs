// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn events_serialize_with_type_tag() {
    let event = Event::SessionDeleted { session_id: SessionId::from_string("s-1") };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "session:deleted");
    assert_eq!(json["session_id"], "s-1");

    let back: Event = serde_json::from_value(json).unwrap();
    assert_eq!(back, event);
}

#[test]
fn kind_matches_name_prefixing() {
    let events = [
        Event::SessionCreated {
            session_id: SessionId::new(),
            entity_id: None,
            user_id: None,
        },
        Event::PoolWarmed { language: Language::Py, count: 3 },
        Event::SandboxCreatedFresh {
            session_id: SessionId::new(),
            language: Language::Go,
            reason: FreshSandboxReason::LanguageNotPooled,
        },
    ];
    for event in events {
        // name() is stable and kind() is usable as a map key
        assert!(!event.name().is_empty());
        let mut map = std::collections::HashMap::new();
        map.insert(event.kind(), 1);
        assert_eq!(map.get(&event.kind()), Some(&1));
    }
}

#[test]
fn session_id_accessor_covers_session_events() {
    let sid = SessionId::from_string("sess-abc");
    let event = Event::ExecutionCompleted {
        execution_id: ExecutionId::new(),
        session_id: sid,
        success: true,
        execution_time_ms: Some(20),
    };
    assert_eq!(event.session_id(), Some(&sid));

    let warm = Event::PoolWarmed { language: Language::Js, count: 2 };
    assert_eq!(warm.session_id(), None);
}

#[test]
fn log_summary_is_compact() {
    let event = Event::PoolExhausted {
        language: Language::Py,
        session_id: SessionId::from_string("0123456789abcdefghijk"),
    };
    let summary = event.log_summary();
    assert!(summary.starts_with("pool:exhausted"));
    assert!(summary.contains("lang=py"));
    assert!(summary.contains("session=0123456789ab"));
}
