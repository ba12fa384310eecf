// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Service-facing storage traits.
//!
//! The orchestrator and HTTP layer depend on these traits only, never on
//! the Redis/S3 implementations. The in-memory doubles in [`crate::memory`]
//! implement the same contracts for tests.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use runcell_core::{FileEntry, FileId, Session, SessionId, SessionStatus};
use std::collections::HashMap;

/// Partial update applied by [`SessionStore::update`]. `last_activity` is
/// always refreshed regardless of which fields are set.
#[derive(Debug, Clone, Default)]
pub struct SessionChanges {
    pub status: Option<SessionStatus>,
    pub metadata: Option<HashMap<String, String>>,
}

/// Session registry backed by a KV store.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a new active session with the given metadata.
    async fn create(&self, metadata: HashMap<String, String>) -> Result<Session, StoreError>;

    /// Fetch a session. Refreshes `last_activity` when the session is active.
    async fn get(&self, id: &SessionId) -> Result<Option<Session>, StoreError>;

    /// Merge changes into a session. Returns the updated session, or `None`
    /// when it does not exist.
    async fn update(
        &self,
        id: &SessionId,
        changes: SessionChanges,
    ) -> Result<Option<Session>, StoreError>;

    /// Delete a session and release its session-scoped resources.
    /// Returns `true` when a session was actually removed.
    async fn delete(&self, id: &SessionId) -> Result<bool, StoreError>;

    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Session>, StoreError>;

    async fn list_by_entity(
        &self,
        entity_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Session>, StoreError>;

    /// Remove expired and orphaned sessions. Returns the number cleaned.
    async fn cleanup_expired(&self) -> Result<usize, StoreError>;
}

/// File storage: blobs in the object store, metadata in the KV store.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Presign an upload. Returns the new file id and a PUT URL valid 1 h.
    async fn upload_url(
        &self,
        session_id: &SessionId,
        filename: &str,
        content_type: Option<&str>,
    ) -> Result<(FileId, String), StoreError>;

    /// Stat the uploaded object and fix up the metadata size.
    async fn confirm_upload(
        &self,
        session_id: &SessionId,
        file_id: &FileId,
    ) -> Result<Option<FileEntry>, StoreError>;

    /// Store an uploaded file directly (non-presigned path).
    async fn store_uploaded_file(
        &self,
        session_id: &SessionId,
        filename: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<FileId, StoreError>;

    /// Store a file generated by executed code under `outputs/`.
    async fn store_output_file(
        &self,
        session_id: &SessionId,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<FileId, StoreError>;

    async fn entry(
        &self,
        session_id: &SessionId,
        file_id: &FileId,
    ) -> Result<Option<FileEntry>, StoreError>;

    async fn content(
        &self,
        session_id: &SessionId,
        file_id: &FileId,
    ) -> Result<Option<Vec<u8>>, StoreError>;

    /// Presigned GET URL valid 1 h, or `None` when the file is unknown.
    async fn download_url(
        &self,
        session_id: &SessionId,
        file_id: &FileId,
    ) -> Result<Option<String>, StoreError>;

    /// All files of a session sorted by creation time.
    async fn list(&self, session_id: &SessionId) -> Result<Vec<FileEntry>, StoreError>;

    async fn delete(&self, session_id: &SessionId, file_id: &FileId) -> Result<bool, StoreError>;

    /// Delete every file of a session. Returns the number deleted.
    async fn cleanup_session_files(&self, session_id: &SessionId) -> Result<usize, StoreError>;

    /// Delete objects whose sessions no longer exist. See the safety guards
    /// on the implementation. Returns the number of objects deleted.
    async fn cleanup_orphans(&self, batch_limit: usize) -> Result<usize, StoreError>;
}

/// Where a state blob was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StateSource {
    Redis,
    Archive,
}

/// Metadata about a stored state blob.
#[derive(Debug, Clone, PartialEq)]
pub struct StateInfo {
    pub size_bytes: u64,
    pub hash: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Hot cache of serialized interpreter state.
///
/// States are stored base64-encoded with their SHA-256 (computed over the
/// raw decoded bytes) and a JSON metadata record, all with one TTL.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Base64 state, or `None` when absent.
    async fn get_state(&self, session_id: &SessionId) -> Result<Option<String>, StoreError>;

    /// Raw decoded state bytes (wire form).
    async fn get_state_raw(&self, session_id: &SessionId) -> Result<Option<Vec<u8>>, StoreError>;

    /// Save base64 state. `from_upload` additionally sets the short-lived
    /// upload marker consulted by the orchestrator.
    async fn save_state(
        &self,
        session_id: &SessionId,
        state_b64: &str,
        ttl_seconds: Option<u64>,
        from_upload: bool,
    ) -> Result<(), StoreError>;

    /// Save raw bytes (wire form), encoding to base64 for storage.
    async fn save_state_raw(
        &self,
        session_id: &SessionId,
        raw: &[u8],
        ttl_seconds: Option<u64>,
        from_upload: bool,
    ) -> Result<(), StoreError>;

    /// Delete state, hash, metadata, and the upload marker. Idempotent.
    async fn delete_state(&self, session_id: &SessionId) -> Result<(), StoreError>;

    /// SHA-256 hex of the stored state, for ETag support.
    async fn state_hash(&self, session_id: &SessionId) -> Result<Option<String>, StoreError>;

    async fn state_info(&self, session_id: &SessionId) -> Result<Option<StateInfo>, StoreError>;

    async fn has_recent_upload(&self, session_id: &SessionId) -> Result<bool, StoreError>;

    async fn clear_upload_marker(&self, session_id: &SessionId) -> Result<(), StoreError>;

    /// States whose remaining TTL is at or below `ttl_threshold_seconds`,
    /// i.e. inactive long enough to archive. Returns
    /// `(session, remaining_ttl_seconds, stored_size_bytes)` tuples.
    async fn archival_candidates(
        &self,
        ttl_threshold_seconds: u64,
        limit: usize,
    ) -> Result<Vec<(SessionId, u64, u64)>, StoreError>;
}

/// Summary of one archival sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveSweep {
    pub archived: usize,
    pub failed: usize,
    pub already_archived: usize,
}

/// Cold archive of state blobs in the object store.
#[async_trait]
pub trait StateArchive: Send + Sync {
    /// Archive one session's base64 state.
    async fn archive(&self, session_id: &SessionId, state_b64: &str) -> Result<(), StoreError>;

    /// Restore a session's state, rehydrating the hot cache on a hit.
    async fn restore(&self, session_id: &SessionId) -> Result<Option<String>, StoreError>;

    /// Delete an archived state. Idempotent.
    async fn delete(&self, session_id: &SessionId) -> Result<(), StoreError>;

    async fn exists(&self, session_id: &SessionId) -> Result<bool, StoreError>;

    /// Archive every inactive hot state (the periodic sweep body).
    async fn archive_inactive(&self) -> Result<ArchiveSweep, StoreError>;

    /// Delete archives older than the archive TTL. Returns the number deleted.
    async fn cleanup_expired(&self) -> Result<usize, StoreError>;
}
