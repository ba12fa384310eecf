// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cold archive for interpreter state.
//!
//! Hot states that have been inactive for a while are copied to the object
//! store at `states/<sid>/state.dat` and survive the Redis TTL. A restore
//! rehydrates the hot cache so subsequent executions hit Redis again.

use crate::error::StoreError;
use crate::keys;
use crate::object::ObjectStore;
use crate::traits::{ArchiveSweep, StateArchive, StateStore};
use async_trait::async_trait;
use runcell_core::{Clock, SessionId, SystemClock};
use std::sync::Arc;

/// Tuning for the archival sweeps.
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Hot TTL configured on the state cache.
    pub state_ttl_seconds: u64,
    /// Inactivity window after which a hot state becomes archivable.
    pub archive_after_seconds: u64,
    /// Lifetime of archived blobs.
    pub archive_ttl_days: u64,
    /// Max states archived per sweep.
    pub batch_limit: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            state_ttl_seconds: 7200,
            archive_after_seconds: 1800,
            archive_ttl_days: 7,
            batch_limit: 100,
        }
    }
}

/// Object-store-backed state archive.
pub struct StateArchiveStore<C: Clock = SystemClock> {
    objects: ObjectStore,
    hot: Arc<dyn StateStore>,
    config: ArchiveConfig,
    clock: C,
}

impl StateArchiveStore<SystemClock> {
    pub fn new(objects: ObjectStore, hot: Arc<dyn StateStore>, config: ArchiveConfig) -> Self {
        Self::with_clock(objects, hot, config, SystemClock)
    }
}

impl<C: Clock> StateArchiveStore<C> {
    pub fn with_clock(
        objects: ObjectStore,
        hot: Arc<dyn StateStore>,
        config: ArchiveConfig,
        clock: C,
    ) -> Self {
        Self { objects, hot, config, clock }
    }
}

#[async_trait]
impl<C: Clock + 'static> StateArchive for StateArchiveStore<C> {
    async fn archive(&self, session_id: &SessionId, state_b64: &str) -> Result<(), StoreError> {
        let key = keys::object_state_key(session_id);
        self.objects
            .put(&key, state_b64.as_bytes().to_vec(), "application/octet-stream")
            .await?;
        tracing::info!(
            session_id = %session_id.short(12),
            size_bytes = state_b64.len(),
            object_key = key,
            "archived state"
        );
        Ok(())
    }

    async fn restore(&self, session_id: &SessionId) -> Result<Option<String>, StoreError> {
        let key = keys::object_state_key(session_id);
        let Some(bytes) = self.objects.get(&key).await? else {
            tracing::debug!(session_id = %session_id.short(12), "no archived state found");
            return Ok(None);
        };
        let state_b64 = String::from_utf8(bytes)
            .map_err(|e| StoreError::corrupt(key, format!("archived state not utf-8: {e}")))?;

        // Rehydrate the hot cache so the next execution skips the archive.
        self.hot.save_state(session_id, &state_b64, None, false).await?;

        tracing::info!(
            session_id = %session_id.short(12),
            size_bytes = state_b64.len(),
            "restored state from archive"
        );
        Ok(Some(state_b64))
    }

    async fn delete(&self, session_id: &SessionId) -> Result<(), StoreError> {
        self.objects.delete(&keys::object_state_key(session_id)).await?;
        tracing::debug!(session_id = %session_id.short(12), "deleted archived state");
        Ok(())
    }

    async fn exists(&self, session_id: &SessionId) -> Result<bool, StoreError> {
        Ok(self.objects.stat(&keys::object_state_key(session_id)).await?.is_some())
    }

    async fn archive_inactive(&self) -> Result<ArchiveSweep, StoreError> {
        let threshold = self
            .config
            .state_ttl_seconds
            .saturating_sub(self.config.archive_after_seconds);
        let candidates = self
            .hot
            .archival_candidates(threshold, self.config.batch_limit)
            .await?;

        let mut sweep = ArchiveSweep::default();
        for (session_id, _remaining_ttl, _size) in candidates {
            match self.exists(&session_id).await {
                Ok(true) => {
                    sweep.already_archived += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(session_id = %session_id.short(12), error = %e, "archive existence check failed");
                    sweep.failed += 1;
                    continue;
                }
            }

            let state = match self.hot.get_state(&session_id).await {
                Ok(Some(state)) => state,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(session_id = %session_id.short(12), error = %e, "state read failed during archival");
                    sweep.failed += 1;
                    continue;
                }
            };

            match self.archive(&session_id, &state).await {
                Ok(()) => sweep.archived += 1,
                Err(e) => {
                    tracing::warn!(session_id = %session_id.short(12), error = %e, "failed to archive state");
                    sweep.failed += 1;
                }
            }
        }

        if sweep.archived > 0 {
            tracing::info!(
                archived = sweep.archived,
                failed = sweep.failed,
                already_archived = sweep.already_archived,
                "completed state archival batch"
            );
        }
        Ok(sweep)
    }

    async fn cleanup_expired(&self) -> Result<usize, StoreError> {
        let cutoff =
            self.clock.now_utc() - chrono::Duration::days(self.config.archive_ttl_days as i64);
        let objects = self.objects.list_prefix(keys::OBJECT_STATES_PREFIX).await?;

        let mut deleted = 0usize;
        for obj in objects {
            let Some(modified) = obj.last_modified else { continue };
            if modified >= cutoff {
                continue;
            }
            let Some(sid) = keys::session_from_state_object_key(&obj.key) else { continue };
            match self.delete(&SessionId::from_string(sid)).await {
                Ok(()) => deleted += 1,
                Err(e) => {
                    tracing::warn!(object_key = obj.key, error = %e, "failed to delete expired archive");
                }
            }
        }

        if deleted > 0 {
            tracing::info!(deleted, "cleaned up expired archived states");
        }
        Ok(deleted)
    }
}
