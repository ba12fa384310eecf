// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Redis-backed session registry.
//!
//! Layout per session: a hash at `sessions:<id>` with one entry per field
//! (timestamps as RFC 3339 strings, metadata as a JSON string), membership
//! in the `sessions:index` set, and membership in `entity_sessions:<eid>`
//! when the session carries an `entity_id`. Creation and deletion run as
//! transactional pipelines so the hash and the sets never diverge.

use crate::error::StoreError;
use crate::keys;
use crate::traits::{FileStore, SessionChanges, SessionStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_redis::redis::{self, AsyncCommands};
use deadpool_redis::Pool;
use runcell_core::{Clock, Session, SessionId, SessionStatus, SystemClock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for the background expiry sweep.
#[derive(Debug, Clone)]
pub struct SessionSweepConfig {
    pub interval: Duration,
    pub orphan_cleanup_enabled: bool,
    pub orphan_batch_limit: usize,
}

impl Default for SessionSweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            orphan_cleanup_enabled: true,
            orphan_batch_limit: 1000,
        }
    }
}

/// Redis session registry. See module docs for the key layout.
pub struct SessionRegistry<C: Clock = SystemClock> {
    pool: Pool,
    /// File store asked to free session-scoped blobs on delete. Injected
    /// top-down; the file store never points back at the registry.
    files: Option<Arc<dyn FileStore>>,
    ttl_seconds: u64,
    clock: C,
}

impl SessionRegistry<SystemClock> {
    pub fn new(pool: Pool, files: Option<Arc<dyn FileStore>>, ttl_seconds: u64) -> Self {
        Self::with_clock(pool, files, ttl_seconds, SystemClock)
    }
}

impl<C: Clock> SessionRegistry<C> {
    pub fn with_clock(
        pool: Pool,
        files: Option<Arc<dyn FileStore>>,
        ttl_seconds: u64,
        clock: C,
    ) -> Self {
        Self { pool, files, ttl_seconds, clock }
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, StoreError> {
        Ok(self.pool.get().await?)
    }

    /// Read a session hash without touching `last_activity`.
    async fn read(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        let mut conn = self.conn().await?;
        let fields: HashMap<String, String> = conn.hgetall(keys::session_key(id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        match session_from_fields(&fields) {
            Ok(session) => Ok(Some(session)),
            Err(reason) => {
                tracing::error!(session_id = %id.short(12), %reason, "corrupt session record");
                Err(StoreError::corrupt(keys::session_key(id), reason))
            }
        }
    }

    async fn touch_activity(&self, id: &SessionId) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let now = self.clock.now_utc().to_rfc3339();
        let _: () = conn.hset(keys::session_key(id), "last_activity", now).await?;
        Ok(())
    }

    /// Remove an orphaned index entry (hash already expired) and any files
    /// still keyed by the session.
    async fn cleanup_orphaned(&self, id: &SessionId) -> Result<(), StoreError> {
        if let Some(files) = &self.files {
            if let Err(e) = files.cleanup_session_files(id).await {
                tracing::error!(session_id = %id.short(12), error = %e, "orphan file cleanup failed");
            }
        }
        let mut conn = self.conn().await?;
        let _: i64 = conn.srem(keys::SESSION_INDEX_KEY, id.as_str()).await?;
        Ok(())
    }

    /// Run one sweep iteration plus the opportunistic orphan-object prune.
    async fn sweep_once(&self, config: &SessionSweepConfig)
    where
        C: 'static,
    {
        match self.cleanup_expired().await {
            Ok(0) => tracing::debug!("no expired sessions to clean up"),
            Ok(count) => tracing::info!(count, "cleaned up expired sessions"),
            Err(e) => {
                tracing::error!(error = %e, "session sweep failed");
                return;
            }
        }

        if config.orphan_cleanup_enabled {
            if let Some(files) = &self.files {
                match files.cleanup_orphans(config.orphan_batch_limit).await {
                    Ok(0) => {}
                    Ok(deleted) => tracing::info!(deleted, "pruned orphan objects"),
                    Err(e) => tracing::error!(error = %e, "orphan object prune failed"),
                }
            }
        }
    }

    /// Spawn the periodic expiry sweep. The task never panics; Redis being
    /// down turns the iteration into a logged no-op with a shorter retry.
    pub fn spawn_sweep(self: Arc<Self>, config: SessionSweepConfig) -> tokio::task::JoinHandle<()>
    where
        C: 'static,
    {
        tokio::spawn(async move {
            tracing::info!(
                interval_secs = config.interval.as_secs(),
                "session cleanup task started"
            );
            loop {
                let reachable = match self.pool.get().await {
                    Ok(mut conn) => {
                        let pong: Result<String, _> =
                            redis::cmd("PING").query_async(&mut conn).await;
                        pong.is_ok()
                    }
                    Err(_) => false,
                };
                if !reachable {
                    tracing::warn!("session cleanup skipped: redis not available");
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    continue;
                }

                self.sweep_once(&config).await;
                tokio::time::sleep(config.interval).await;
            }
        })
    }
}

#[async_trait]
impl<C: Clock + 'static> SessionStore for SessionRegistry<C> {
    async fn create(&self, metadata: HashMap<String, String>) -> Result<Session, StoreError> {
        let session = Session::new(self.clock.now_utc(), self.ttl_seconds as i64, metadata);
        let entity_id = session.entity_id().map(str::to_string);
        let fields = session_to_fields(&session);

        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset_multiple(keys::session_key(&session.session_id), &fields)
            .expire(keys::session_key(&session.session_id), self.ttl_seconds as i64)
            .sadd(keys::SESSION_INDEX_KEY, session.session_id.as_str());
        if let Some(entity) = &entity_id {
            pipe.sadd(keys::entity_sessions_key(entity), session.session_id.as_str());
        }
        let _: () = pipe.query_async(&mut conn).await?;

        tracing::info!(
            session_id = %session.session_id,
            expires_at = %session.expires_at.to_rfc3339(),
            "session created"
        );
        Ok(session)
    }

    async fn get(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        let session = self.read(id).await?;
        if let Some(session) = &session {
            if session.is_active() {
                self.touch_activity(id).await?;
            }
        }
        Ok(session)
    }

    async fn update(
        &self,
        id: &SessionId,
        changes: SessionChanges,
    ) -> Result<Option<Session>, StoreError> {
        let mut conn = self.conn().await?;
        let exists: bool = conn.exists(keys::session_key(id)).await?;
        if !exists {
            return Ok(None);
        }

        let mut updates: Vec<(String, String)> = Vec::new();
        if let Some(status) = changes.status {
            updates.push(("status".into(), status.as_str().into()));
        }
        if let Some(metadata) = &changes.metadata {
            updates.push(("metadata".into(), serde_json::to_string(metadata)?));
        }
        updates.push(("last_activity".into(), self.clock.now_utc().to_rfc3339()));

        let _: () = conn.hset_multiple(keys::session_key(id), &updates).await?;
        drop(conn);
        self.read(id).await
    }

    async fn delete(&self, id: &SessionId) -> Result<bool, StoreError> {
        let entity_id = match self.read(id).await {
            Ok(Some(session)) => session.entity_id().map(str::to_string),
            _ => None,
        };

        // Free session-scoped file resources before dropping the record so
        // a crash leaves the session discoverable by the sweep.
        if let Some(files) = &self.files {
            if let Err(e) = files.cleanup_session_files(id).await {
                tracing::error!(session_id = %id.short(12), error = %e, "file cleanup on delete failed");
            }
        }

        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        pipe.atomic()
            .del(keys::session_key(id))
            .srem(keys::SESSION_INDEX_KEY, id.as_str());
        let deleted = if let Some(entity) = &entity_id {
            pipe.srem(keys::entity_sessions_key(entity), id.as_str());
            let (del_count, _, _): (i64, i64, i64) = pipe.query_async(&mut conn).await?;
            del_count > 0
        } else {
            let (del_count, _): (i64, i64) = pipe.query_async(&mut conn).await?;
            del_count > 0
        };

        if deleted {
            tracing::info!(session_id = %id, entity_id = entity_id.as_deref().unwrap_or(""), "session deleted");
        }
        Ok(deleted)
    }

    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Session>, StoreError> {
        let mut conn = self.conn().await?;
        let mut ids: Vec<String> = conn.smembers(keys::SESSION_INDEX_KEY).await?;
        drop(conn);
        ids.sort_unstable();

        let mut sessions = Vec::new();
        for id in ids.into_iter().skip(offset).take(limit) {
            if let Some(session) = self.read(&SessionId::from_string(&id)).await? {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }

    async fn list_by_entity(
        &self,
        entity_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Session>, StoreError> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn.smembers(keys::entity_sessions_key(entity_id)).await?;
        drop(conn);

        let mut sessions = Vec::new();
        for id in ids {
            if let Some(session) = self.read(&SessionId::from_string(&id)).await? {
                sessions.push(session);
            }
        }
        // Most recent first, so callers can take the head for reuse.
        sessions.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(sessions.into_iter().skip(offset).take(limit).collect())
    }

    async fn cleanup_expired(&self) -> Result<usize, StoreError> {
        let now = self.clock.now_utc();
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn.smembers(keys::SESSION_INDEX_KEY).await?;
        drop(conn);

        let mut cleaned = 0usize;
        for raw_id in ids {
            let id = SessionId::from_string(&raw_id);
            let session = match self.read(&id).await {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(session_id = %id.short(12), error = %e, "sweep read failed");
                    continue;
                }
            };
            match session {
                // Hash gone (TTL fired) but the index still references it.
                None => {
                    tracing::info!(session_id = %id.short(12), "cleaning up orphaned session");
                    if let Err(e) = self.cleanup_orphaned(&id).await {
                        tracing::error!(session_id = %id.short(12), error = %e, "orphan cleanup failed");
                        continue;
                    }
                    cleaned += 1;
                }
                Some(session) if session.is_expired(now) => {
                    tracing::info!(
                        session_id = %id.short(12),
                        expired_at = %session.expires_at.to_rfc3339(),
                        "cleaning up expired session"
                    );
                    if self.delete(&id).await? {
                        cleaned += 1;
                    }
                }
                Some(_) => {}
            }
        }
        Ok(cleaned)
    }
}

/// Serialize a session into Redis hash fields. Missing scalars become
/// empty strings, mappings become JSON.
pub fn session_to_fields(session: &Session) -> Vec<(String, String)> {
    vec![
        ("session_id".into(), session.session_id.to_string()),
        ("status".into(), session.status.as_str().into()),
        ("created_at".into(), session.created_at.to_rfc3339()),
        ("last_activity".into(), session.last_activity.to_rfc3339()),
        ("expires_at".into(), session.expires_at.to_rfc3339()),
        (
            "metadata".into(),
            serde_json::to_string(&session.metadata).unwrap_or_else(|_| "{}".into()),
        ),
    ]
}

/// Parse a session back from Redis hash fields.
pub fn session_from_fields(fields: &HashMap<String, String>) -> Result<Session, String> {
    fn parse_ts(fields: &HashMap<String, String>, key: &str) -> Result<DateTime<Utc>, String> {
        let raw = fields.get(key).filter(|v| !v.is_empty()).ok_or_else(|| format!("missing {key}"))?;
        DateTime::parse_from_rfc3339(raw)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| format!("bad {key}: {e}"))
    }

    let session_id = fields
        .get("session_id")
        .filter(|v| !v.is_empty())
        .ok_or("missing session_id")?;
    let status_raw = fields.get("status").map(String::as_str).unwrap_or("");
    let status = SessionStatus::parse(status_raw).ok_or_else(|| format!("bad status: {status_raw}"))?;

    let metadata = match fields.get("metadata").filter(|v| !v.is_empty()) {
        Some(raw) => serde_json::from_str(raw).map_err(|e| format!("bad metadata: {e}"))?,
        None => HashMap::new(),
    };

    Ok(Session {
        session_id: SessionId::from_string(session_id),
        status,
        created_at: parse_ts(fields, "created_at")?,
        last_activity: parse_ts(fields, "last_activity")?,
        expires_at: parse_ts(fields, "expires_at")?,
        metadata,
    })
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
