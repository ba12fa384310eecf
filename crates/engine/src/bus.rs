// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event bus for decoupling services.
//!
//! Services publish [`Event`]s without knowing who reacts; the cleanup
//! scheduler subscribes to session deletions, metrics consumers to
//! execution completions, and so on. This removes the back-pointer wiring
//! between the session registry and the file store.
//!
//! `publish` runs all handlers for the event's kind concurrently and
//! isolates failures — a failing handler is logged and never prevents its
//! peers from running. `publish_and_wait` runs handlers sequentially in
//! registration order and returns the collected errors.

use futures_util::future::{join_all, BoxFuture};
use parking_lot::Mutex;
use runcell_core::{Event, EventKind};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

type Handler = Arc<dyn Fn(Event) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// Token returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Typed publish/subscribe bus. Cheap to clone behind an `Arc`.
#[derive(Default)]
pub struct EventBus {
    handlers: Mutex<HashMap<EventKind, Vec<(HandlerId, Handler)>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event kind. Handlers receive a clone of
    /// the published event.
    pub fn subscribe<F, Fut>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let handler: Handler = Arc::new(move |event| Box::pin(handler(event)));
        self.handlers.lock().entry(kind).or_default().push((id, handler));
        tracing::debug!(?kind, handler_id = id.0, "registered event handler");
        id
    }

    /// Remove a handler. Returns true when it was found.
    pub fn unsubscribe(&self, kind: EventKind, id: HandlerId) -> bool {
        let mut handlers = self.handlers.lock();
        let Some(list) = handlers.get_mut(&kind) else { return false };
        let before = list.len();
        list.retain(|(hid, _)| *hid != id);
        list.len() != before
    }

    /// Drop handlers for one kind, or all of them.
    pub fn clear(&self, kind: Option<EventKind>) {
        let mut handlers = self.handlers.lock();
        match kind {
            Some(kind) => {
                handlers.remove(&kind);
            }
            None => handlers.clear(),
        }
    }

    fn handlers_for(&self, kind: EventKind) -> Vec<(HandlerId, Handler)> {
        self.handlers.lock().get(&kind).cloned().unwrap_or_default()
    }

    /// Invoke all handlers concurrently. Failures are logged; none aborts
    /// delivery to its peers.
    pub async fn publish(&self, event: Event) {
        let handlers = self.handlers_for(event.kind());
        if handlers.is_empty() {
            tracing::debug!(event = event.name(), "no handlers for event");
            return;
        }
        tracing::debug!(
            event = event.name(),
            handler_count = handlers.len(),
            "publishing event"
        );

        let name = event.name();
        join_all(handlers.into_iter().map(|(id, handler)| {
            let event = event.clone();
            async move {
                if let Err(e) = handler(event).await {
                    tracing::error!(event = name, handler_id = id.0, error = e, "event handler error");
                }
            }
        }))
        .await;
    }

    /// Invoke handlers sequentially in registration order, returning every
    /// error for the caller to react to.
    pub async fn publish_and_wait(&self, event: Event) -> Vec<String> {
        let handlers = self.handlers_for(event.kind());
        let mut errors = Vec::new();
        for (id, handler) in handlers {
            if let Err(e) = handler(event.clone()).await {
                tracing::error!(
                    event = event.name(),
                    handler_id = id.0,
                    error = e,
                    "event handler error"
                );
                errors.push(e);
            }
        }
        errors
    }
}

/// Forward events from a channel onto the bus. The sandbox layer emits
/// through plain channels so it does not depend on the bus.
pub fn spawn_event_forwarder(
    mut rx: mpsc::UnboundedReceiver<Event>,
    bus: Arc<EventBus>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            tracing::debug!(summary = event.log_summary(), "forwarding event");
            bus.publish(event).await;
        }
    })
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
