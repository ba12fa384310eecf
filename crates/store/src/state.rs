// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hot cache for serialized interpreter state.
//!
//! State arrives as an opaque compressed blob, base64-encoded inside the
//! sidecar's JSON envelope. The cache never inspects it beyond the SHA-256
//! (computed over the raw decoded bytes), the size, and the version byte
//! checked at the HTTP boundary. Storage layout per session:
//!
//! - `session:state:<sid>` — base64 payload (SETEX)
//! - `session:state:hash:<sid>` — sha256 hex
//! - `session:state:meta:<sid>` — JSON `{size_bytes, hash, created_at, from_upload}`
//! - `session:state:uploaded:<sid>` — 30 s marker after a client upload

use crate::error::StoreError;
use crate::keys;
use crate::traits::{StateInfo, StateStore};
use async_trait::async_trait;
use base64::Engine;
use chrono::Duration as ChronoDuration;
use deadpool_redis::redis::{self, AsyncCommands};
use deadpool_redis::Pool;
use runcell_core::{Clock, SessionId, SystemClock};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Lifetime of the post-upload marker consulted by the orchestrator.
pub const UPLOAD_MARKER_TTL_SECS: u64 = 30;

/// SHA-256 hex digest of raw state bytes. Used for ETags and change
/// detection.
pub fn state_hash_hex(raw: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[derive(Debug, Serialize, Deserialize)]
struct StateMeta {
    size_bytes: u64,
    hash: String,
    created_at: String,
    #[serde(default)]
    from_upload: bool,
}

/// Redis-backed hot state cache.
pub struct StateCache<C: Clock = SystemClock> {
    pool: Pool,
    default_ttl_seconds: u64,
    clock: C,
}

impl StateCache<SystemClock> {
    pub fn new(pool: Pool, default_ttl_seconds: u64) -> Self {
        Self::with_clock(pool, default_ttl_seconds, SystemClock)
    }
}

impl<C: Clock> StateCache<C> {
    pub fn with_clock(pool: Pool, default_ttl_seconds: u64, clock: C) -> Self {
        Self { pool, default_ttl_seconds, clock }
    }

    pub fn default_ttl_seconds(&self) -> u64 {
        self.default_ttl_seconds
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, StoreError> {
        Ok(self.pool.get().await?)
    }
}

#[async_trait]
impl<C: Clock + 'static> StateStore for StateCache<C> {
    async fn get_state(&self, session_id: &SessionId) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn().await?;
        let state: Option<String> = conn.get(keys::state_key(session_id)).await?;
        if let Some(state) = &state {
            tracing::debug!(
                session_id = %session_id.short(12),
                state_size = state.len(),
                "retrieved state from redis"
            );
        }
        Ok(state)
    }

    async fn get_state_raw(&self, session_id: &SessionId) -> Result<Option<Vec<u8>>, StoreError> {
        let Some(state_b64) = self.get_state(session_id).await? else {
            return Ok(None);
        };
        let raw = base64::engine::general_purpose::STANDARD
            .decode(state_b64.as_bytes())
            .map_err(|e| StoreError::corrupt(keys::state_key(session_id), e.to_string()))?;
        Ok(Some(raw))
    }

    async fn save_state(
        &self,
        session_id: &SessionId,
        state_b64: &str,
        ttl_seconds: Option<u64>,
        from_upload: bool,
    ) -> Result<(), StoreError> {
        if state_b64.is_empty() {
            return Ok(());
        }
        let ttl = ttl_seconds.unwrap_or(self.default_ttl_seconds);
        let raw = base64::engine::general_purpose::STANDARD
            .decode(state_b64.as_bytes())
            .map_err(|e| StoreError::corrupt(keys::state_key(session_id), e.to_string()))?;
        let hash = state_hash_hex(&raw);
        let meta = serde_json::to_string(&StateMeta {
            size_bytes: raw.len() as u64,
            hash: hash.clone(),
            created_at: self.clock.now_utc().to_rfc3339(),
            from_upload,
        })?;

        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        pipe.atomic()
            .set_ex(keys::state_key(session_id), state_b64, ttl)
            .set_ex(keys::state_hash_key(session_id), &hash, ttl)
            .set_ex(keys::state_meta_key(session_id), meta, ttl);
        if from_upload {
            pipe.set_ex(keys::state_upload_marker_key(session_id), "1", UPLOAD_MARKER_TTL_SECS);
        }
        let _: () = pipe.query_async(&mut conn).await?;

        tracing::info!(
            session_id = %session_id.short(12),
            state_size = raw.len(),
            hash = &hash[..12],
            ttl_seconds = ttl,
            from_upload,
            "saved state to redis"
        );
        Ok(())
    }

    async fn save_state_raw(
        &self,
        session_id: &SessionId,
        raw: &[u8],
        ttl_seconds: Option<u64>,
        from_upload: bool,
    ) -> Result<(), StoreError> {
        let state_b64 = base64::engine::general_purpose::STANDARD.encode(raw);
        self.save_state(session_id, &state_b64, ttl_seconds, from_upload).await
    }

    async fn delete_state(&self, session_id: &SessionId) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _: i64 = conn
            .del(&[
                keys::state_key(session_id),
                keys::state_hash_key(session_id),
                keys::state_meta_key(session_id),
                keys::state_upload_marker_key(session_id),
            ])
            .await?;
        tracing::debug!(session_id = %session_id.short(12), "deleted state from redis");
        Ok(())
    }

    async fn state_hash(&self, session_id: &SessionId) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(conn.get(keys::state_hash_key(session_id)).await?)
    }

    async fn state_info(&self, session_id: &SessionId) -> Result<Option<StateInfo>, StoreError> {
        let mut conn = self.conn().await?;
        let (size, ttl, meta_raw): (u64, i64, Option<String>) = redis::pipe()
            .strlen(keys::state_key(session_id))
            .ttl(keys::state_key(session_id))
            .get(keys::state_meta_key(session_id))
            .query_async(&mut conn)
            .await?;

        if size == 0 {
            return Ok(None);
        }

        let meta: Option<StateMeta> =
            meta_raw.as_deref().and_then(|raw| serde_json::from_str(raw).ok());
        let expires_at = (ttl > 0)
            .then(|| self.clock.now_utc() + ChronoDuration::seconds(ttl));

        Ok(Some(StateInfo {
            size_bytes: meta.as_ref().map(|m| m.size_bytes).unwrap_or(size),
            hash: meta.as_ref().map(|m| m.hash.clone()),
            created_at: meta
                .as_ref()
                .and_then(|m| chrono::DateTime::parse_from_rfc3339(&m.created_at).ok())
                .map(|d| d.with_timezone(&chrono::Utc)),
            expires_at,
        }))
    }

    async fn has_recent_upload(&self, session_id: &SessionId) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let marker: Option<String> = conn.get(keys::state_upload_marker_key(session_id)).await?;
        Ok(marker.is_some())
    }

    async fn clear_upload_marker(&self, session_id: &SessionId) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _: i64 = conn.del(keys::state_upload_marker_key(session_id)).await?;
        Ok(())
    }

    async fn archival_candidates(
        &self,
        ttl_threshold_seconds: u64,
        limit: usize,
    ) -> Result<Vec<(SessionId, u64, u64)>, StoreError> {
        let mut conn = self.conn().await?;
        let pattern = format!("{}*", keys::STATE_PREFIX);
        let mut cursor: u64 = 0;
        let mut results = Vec::new();

        loop {
            let (next, found): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            cursor = next;

            for key in found {
                if results.len() >= limit {
                    break;
                }
                // The pattern also matches hash/meta/marker keys.
                let Some(session_id) = keys::session_from_state_key(&key) else { continue };
                let ttl: i64 = conn.ttl(&key).await?;
                if ttl > 0 && (ttl as u64) <= ttl_threshold_seconds {
                    let size: u64 = conn.strlen(&key).await?;
                    results.push((session_id, ttl as u64, size));
                }
            }

            if cursor == 0 || results.len() >= limit {
                break;
            }
        }

        tracing::debug!(
            count = results.len(),
            ttl_threshold = ttl_threshold_seconds,
            "found states for archival"
        );
        Ok(results)
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
