// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event-driven cleanup and the periodic archival sweep.
//!
//! Sandboxes are destroyed right after execution by the orchestrator, so
//! this scheduler only handles the remaining reactive work: deleting a
//! session's files when the session goes away, and moving inactive hot
//! states into the cold archive on a timer.

use crate::bus::{EventBus, HandlerId};
use parking_lot::Mutex;
use runcell_core::{Event, EventKind, SessionId};
use runcell_store::{FileStore, StateArchive};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Bound on the remembered already-cleaned set.
const CLEANED_SET_CAP: usize = 1000;
/// Expired-archive sweep runs every this many archival ticks.
const ARCHIVE_CLEANUP_EVERY: u32 = 6;
/// Pause after an archival loop error before retrying.
const ERROR_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct CleanupSchedulerConfig {
    pub archive_enabled: bool,
    pub archive_check_interval: Duration,
}

impl Default for CleanupSchedulerConfig {
    fn default() -> Self {
        Self { archive_enabled: true, archive_check_interval: Duration::from_secs(300) }
    }
}

/// Reacts to lifecycle events and runs the archival loop.
pub struct CleanupScheduler {
    files: Arc<dyn FileStore>,
    archive: Option<Arc<dyn StateArchive>>,
    config: CleanupSchedulerConfig,
    cleaned: Mutex<HashSet<SessionId>>,
    subscriptions: Mutex<Vec<(EventKind, HandlerId)>>,
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl CleanupScheduler {
    pub fn new(
        files: Arc<dyn FileStore>,
        archive: Option<Arc<dyn StateArchive>>,
        config: CleanupSchedulerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            files,
            archive,
            config,
            cleaned: Mutex::new(HashSet::new()),
            subscriptions: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Subscribe to lifecycle events and start the archival loop. Takes
    /// an `Arc` so handlers can hold the scheduler; callers pass a clone.
    pub fn start(self: Arc<Self>, bus: &Arc<EventBus>) {
        let scheduler = Arc::clone(&self);
        let id = bus.subscribe(EventKind::SessionDeleted, move |event| {
            let scheduler = Arc::clone(&scheduler);
            async move {
                if let Event::SessionDeleted { session_id } = event {
                    scheduler.on_session_deleted(session_id).await;
                }
                Ok(())
            }
        });
        self.subscriptions.lock().push((EventKind::SessionDeleted, id));

        // Sandboxes are already destroyed by the orchestrator's cleanup
        // step; this handler only exists for the log trail.
        let id = bus.subscribe(EventKind::ExecutionCompleted, |event| async move {
            if let Event::ExecutionCompleted { execution_id, session_id, .. } = event {
                tracing::debug!(
                    execution_id = %execution_id.short(8),
                    session_id = %session_id.short(12),
                    "execution completed"
                );
            }
            Ok(())
        });
        self.subscriptions.lock().push((EventKind::ExecutionCompleted, id));

        if self.config.archive_enabled {
            if self.archive.is_some() {
                let scheduler = Arc::clone(&self);
                self.tasks.lock().push(tokio::spawn(async move {
                    scheduler.archival_loop().await;
                }));
                tracing::info!(
                    interval_secs = self.config.archive_check_interval.as_secs(),
                    "state archival task started"
                );
            }
        }
        tracing::info!("cleanup scheduler started");
    }

    /// Unsubscribe and stop background work.
    pub fn stop(&self, bus: &EventBus) {
        for (kind, id) in self.subscriptions.lock().drain(..) {
            bus.unsubscribe(kind, id);
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.cleaned.lock().clear();
        tracing::info!("cleanup scheduler stopped");
    }

    async fn on_session_deleted(&self, session_id: SessionId) {
        {
            let mut cleaned = self.cleaned.lock();
            // Bound the memory of the remembered set.
            if cleaned.len() >= CLEANED_SET_CAP {
                cleaned.clear();
            }
            cleaned.insert(session_id);
        }

        match self.files.cleanup_session_files(&session_id).await {
            Ok(deleted) => {
                tracing::debug!(
                    session_id = %session_id.short(12),
                    deleted,
                    "cleaned up files for deleted session"
                );
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id.short(12),
                    error = %e,
                    "failed to cleanup session files"
                );
            }
        }
    }

    /// One archival tick: archive inactive states, and on every sixth tick
    /// also sweep expired archives. Returns false when no archive is wired.
    pub async fn archival_tick(&self, counter: u32) -> bool {
        let Some(archive) = &self.archive else { return false };

        match archive.archive_inactive().await {
            Ok(sweep) if sweep.archived > 0 || sweep.failed > 0 => {
                tracing::info!(
                    archived = sweep.archived,
                    failed = sweep.failed,
                    "state archival cycle completed"
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "state archival cycle failed");
                return false;
            }
        }

        if counter % ARCHIVE_CLEANUP_EVERY == ARCHIVE_CLEANUP_EVERY - 1 {
            match archive.cleanup_expired().await {
                Ok(deleted) if deleted > 0 => {
                    tracing::info!(deleted, "expired archive cleanup completed");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "expired archive cleanup failed");
                    return false;
                }
            }
        }
        true
    }

    async fn archival_loop(self: Arc<Self>) {
        let mut counter: u32 = 0;
        loop {
            tokio::time::sleep(self.config.archive_check_interval).await;
            if self.archival_tick(counter).await {
                counter = counter.wrapping_add(1);
            } else {
                tokio::time::sleep(ERROR_BACKOFF).await;
            }
        }
    }

    /// Sessions whose files were already cleaned (test support).
    pub fn cleaned_count(&self) -> usize {
        self.cleaned.lock().len()
    }
}

#[cfg(test)]
#[path = "cleanup_tests.rs"]
mod tests;
