// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory store doubles for tests.
//!
//! These implement the same traits as the Redis/S3 stores with the same
//! observable semantics (activity refresh, TTLs driven by the clock, upload
//! markers, entity grouping) so the engine and HTTP layers can be tested
//! without infrastructure.

use crate::error::StoreError;
use crate::traits::{
    ArchiveSweep, FileStore, SessionChanges, SessionStore, StateArchive, StateInfo, StateStore,
};
use crate::state::state_hash_hex;
use async_trait::async_trait;
use base64::Engine;
use parking_lot::Mutex;
use runcell_core::{Clock, FakeClock, FileEntry, FileId, FileOrigin, Session, SessionId};
use std::collections::HashMap;
use std::sync::Arc;

// --- sessions ---

/// In-memory [`SessionStore`].
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<SessionId, Session>>,
    files: Option<Arc<dyn FileStore>>,
    ttl_seconds: u64,
    clock: FakeClock,
}

impl MemorySessionStore {
    pub fn new(ttl_seconds: u64, clock: FakeClock) -> Self {
        Self { sessions: Mutex::new(HashMap::new()), files: None, ttl_seconds, clock }
    }

    pub fn with_files(mut self, files: Arc<dyn FileStore>) -> Self {
        self.files = Some(files);
        self
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Insert a prepared session directly (test setup helper).
    pub fn insert(&self, session: Session) {
        self.sessions.lock().insert(session.session_id, session);
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, metadata: HashMap<String, String>) -> Result<Session, StoreError> {
        let session = Session::new(self.clock.now_utc(), self.ttl_seconds as i64, metadata);
        self.sessions.lock().insert(session.session_id, session.clone());
        Ok(session)
    }

    async fn get(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        let mut sessions = self.sessions.lock();
        let Some(session) = sessions.get_mut(id) else { return Ok(None) };
        if session.is_active() {
            session.last_activity = self.clock.now_utc();
        }
        Ok(Some(session.clone()))
    }

    async fn update(
        &self,
        id: &SessionId,
        changes: SessionChanges,
    ) -> Result<Option<Session>, StoreError> {
        let mut sessions = self.sessions.lock();
        let Some(session) = sessions.get_mut(id) else { return Ok(None) };
        if let Some(status) = changes.status {
            session.status = status;
        }
        if let Some(metadata) = changes.metadata {
            session.metadata.extend(metadata);
        }
        session.last_activity = self.clock.now_utc();
        Ok(Some(session.clone()))
    }

    async fn delete(&self, id: &SessionId) -> Result<bool, StoreError> {
        if let Some(files) = &self.files {
            let _ = files.cleanup_session_files(id).await;
        }
        Ok(self.sessions.lock().remove(id).is_some())
    }

    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Session>, StoreError> {
        let mut sessions: Vec<Session> = self.sessions.lock().values().cloned().collect();
        sessions.sort_by(|a, b| a.session_id.as_str().cmp(b.session_id.as_str()));
        Ok(sessions.into_iter().skip(offset).take(limit).collect())
    }

    async fn list_by_entity(
        &self,
        entity_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Session>, StoreError> {
        let mut sessions: Vec<Session> = self
            .sessions
            .lock()
            .values()
            .filter(|s| s.entity_id() == Some(entity_id))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        Ok(sessions.into_iter().skip(offset).take(limit).collect())
    }

    async fn cleanup_expired(&self) -> Result<usize, StoreError> {
        let now = self.clock.now_utc();
        let expired: Vec<SessionId> = self
            .sessions
            .lock()
            .values()
            .filter(|s| s.is_expired(now))
            .map(|s| s.session_id)
            .collect();
        let mut cleaned = 0;
        for id in expired {
            if self.delete(&id).await? {
                cleaned += 1;
            }
        }
        Ok(cleaned)
    }
}

// --- files ---

/// In-memory [`FileStore`].
pub struct MemoryFileStore {
    files: Mutex<HashMap<(SessionId, FileId), (FileEntry, Vec<u8>)>>,
    clock: FakeClock,
}

impl MemoryFileStore {
    pub fn new(clock: FakeClock) -> Self {
        Self { files: Mutex::new(HashMap::new()), clock }
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().len()
    }

    fn insert_file(
        &self,
        session_id: &SessionId,
        filename: &str,
        bytes: Vec<u8>,
        content_type: &str,
        origin: FileOrigin,
    ) -> FileId {
        let file_id = FileId::new();
        let path = match origin {
            FileOrigin::Upload => format!("/{filename}"),
            FileOrigin::Output => format!("/outputs/{filename}"),
        };
        let entry = FileEntry {
            file_id,
            session_id: *session_id,
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            size: bytes.len() as u64,
            created_at: self.clock.now_utc(),
            object_key: crate::keys::object_file_key(session_id, origin, &file_id),
            path,
            origin,
        };
        self.files.lock().insert((*session_id, file_id), (entry, bytes));
        file_id
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn upload_url(
        &self,
        session_id: &SessionId,
        filename: &str,
        content_type: Option<&str>,
    ) -> Result<(FileId, String), StoreError> {
        let file_id = self.insert_file(
            session_id,
            filename,
            Vec::new(),
            content_type.unwrap_or("application/octet-stream"),
            FileOrigin::Upload,
        );
        Ok((file_id, format!("memory://put/{session_id}/{file_id}")))
    }

    async fn confirm_upload(
        &self,
        session_id: &SessionId,
        file_id: &FileId,
    ) -> Result<Option<FileEntry>, StoreError> {
        let mut files = self.files.lock();
        let Some((entry, bytes)) = files.get_mut(&(*session_id, *file_id)) else {
            return Ok(None);
        };
        entry.size = bytes.len() as u64;
        Ok(Some(entry.clone()))
    }

    async fn store_uploaded_file(
        &self,
        session_id: &SessionId,
        filename: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<FileId, StoreError> {
        Ok(self.insert_file(
            session_id,
            filename,
            bytes,
            content_type.unwrap_or("application/octet-stream"),
            FileOrigin::Upload,
        ))
    }

    async fn store_output_file(
        &self,
        session_id: &SessionId,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<FileId, StoreError> {
        Ok(self.insert_file(
            session_id,
            filename,
            bytes,
            "application/octet-stream",
            FileOrigin::Output,
        ))
    }

    async fn entry(
        &self,
        session_id: &SessionId,
        file_id: &FileId,
    ) -> Result<Option<FileEntry>, StoreError> {
        Ok(self.files.lock().get(&(*session_id, *file_id)).map(|(e, _)| e.clone()))
    }

    async fn content(
        &self,
        session_id: &SessionId,
        file_id: &FileId,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.files.lock().get(&(*session_id, *file_id)).map(|(_, b)| b.clone()))
    }

    async fn download_url(
        &self,
        session_id: &SessionId,
        file_id: &FileId,
    ) -> Result<Option<String>, StoreError> {
        Ok(self
            .files
            .lock()
            .get(&(*session_id, *file_id))
            .map(|_| format!("memory://get/{session_id}/{file_id}")))
    }

    async fn list(&self, session_id: &SessionId) -> Result<Vec<FileEntry>, StoreError> {
        let mut entries: Vec<FileEntry> = self
            .files
            .lock()
            .values()
            .filter(|(e, _)| e.session_id == *session_id)
            .map(|(e, _)| e.clone())
            .collect();
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }

    async fn delete(&self, session_id: &SessionId, file_id: &FileId) -> Result<bool, StoreError> {
        Ok(self.files.lock().remove(&(*session_id, *file_id)).is_some())
    }

    async fn cleanup_session_files(&self, session_id: &SessionId) -> Result<usize, StoreError> {
        let mut files = self.files.lock();
        let before = files.len();
        files.retain(|(sid, _), _| sid != session_id);
        Ok(before - files.len())
    }

    async fn cleanup_orphans(&self, _batch_limit: usize) -> Result<usize, StoreError> {
        Ok(0)
    }
}

// --- state ---

struct StoredState {
    b64: String,
    hash: String,
    created_at_ms: u64,
    expires_at_ms: u64,
    upload_marker_until_ms: Option<u64>,
}

/// In-memory [`StateStore`].
pub struct MemoryStateStore {
    states: Mutex<HashMap<SessionId, StoredState>>,
    default_ttl_seconds: u64,
    clock: FakeClock,
}

impl MemoryStateStore {
    pub fn new(default_ttl_seconds: u64, clock: FakeClock) -> Self {
        Self { states: Mutex::new(HashMap::new()), default_ttl_seconds, clock }
    }

    fn live(&self, stored: &StoredState) -> bool {
        stored.expires_at_ms > self.clock.epoch_ms()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get_state(&self, session_id: &SessionId) -> Result<Option<String>, StoreError> {
        let states = self.states.lock();
        Ok(states
            .get(session_id)
            .filter(|s| self.live(s))
            .map(|s| s.b64.clone()))
    }

    async fn get_state_raw(&self, session_id: &SessionId) -> Result<Option<Vec<u8>>, StoreError> {
        let Some(b64) = self.get_state(session_id).await? else { return Ok(None) };
        base64::engine::general_purpose::STANDARD
            .decode(b64.as_bytes())
            .map(Some)
            .map_err(|e| StoreError::corrupt(session_id.as_str(), e.to_string()))
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
        let raw = base64::engine::general_purpose::STANDARD
            .decode(state_b64.as_bytes())
            .map_err(|e| StoreError::corrupt(session_id.as_str(), e.to_string()))?;
        let now = self.clock.epoch_ms();
        let ttl = ttl_seconds.unwrap_or(self.default_ttl_seconds);
        self.states.lock().insert(
            *session_id,
            StoredState {
                b64: state_b64.to_string(),
                hash: state_hash_hex(&raw),
                created_at_ms: now,
                expires_at_ms: now + ttl * 1000,
                upload_marker_until_ms: from_upload
                    .then(|| now + crate::state::UPLOAD_MARKER_TTL_SECS * 1000),
            },
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
        let b64 = base64::engine::general_purpose::STANDARD.encode(raw);
        self.save_state(session_id, &b64, ttl_seconds, from_upload).await
    }

    async fn delete_state(&self, session_id: &SessionId) -> Result<(), StoreError> {
        self.states.lock().remove(session_id);
        Ok(())
    }

    async fn state_hash(&self, session_id: &SessionId) -> Result<Option<String>, StoreError> {
        let states = self.states.lock();
        Ok(states
            .get(session_id)
            .filter(|s| self.live(s))
            .map(|s| s.hash.clone()))
    }

    async fn state_info(&self, session_id: &SessionId) -> Result<Option<StateInfo>, StoreError> {
        let states = self.states.lock();
        let Some(stored) = states.get(session_id).filter(|s| self.live(s)) else {
            return Ok(None);
        };
        let raw_len = base64::engine::general_purpose::STANDARD
            .decode(stored.b64.as_bytes())
            .map(|r| r.len() as u64)
            .unwrap_or(stored.b64.len() as u64);
        Ok(Some(StateInfo {
            size_bytes: raw_len,
            hash: Some(stored.hash.clone()),
            created_at: chrono::DateTime::from_timestamp_millis(stored.created_at_ms as i64),
            expires_at: chrono::DateTime::from_timestamp_millis(stored.expires_at_ms as i64),
        }))
    }

    async fn has_recent_upload(&self, session_id: &SessionId) -> Result<bool, StoreError> {
        let states = self.states.lock();
        Ok(states
            .get(session_id)
            .and_then(|s| s.upload_marker_until_ms)
            .is_some_and(|until| until > self.clock.epoch_ms()))
    }

    async fn clear_upload_marker(&self, session_id: &SessionId) -> Result<(), StoreError> {
        if let Some(stored) = self.states.lock().get_mut(session_id) {
            stored.upload_marker_until_ms = None;
        }
        Ok(())
    }

    async fn archival_candidates(
        &self,
        ttl_threshold_seconds: u64,
        limit: usize,
    ) -> Result<Vec<(SessionId, u64, u64)>, StoreError> {
        let now = self.clock.epoch_ms();
        let states = self.states.lock();
        Ok(states
            .iter()
            .filter_map(|(sid, s)| {
                let remaining_ms = s.expires_at_ms.saturating_sub(now);
                if remaining_ms == 0 {
                    return None;
                }
                let remaining = remaining_ms / 1000;
                (remaining <= ttl_threshold_seconds)
                    .then_some((*sid, remaining, s.b64.len() as u64))
            })
            .take(limit)
            .collect())
    }
}

// --- archive ---

/// In-memory [`StateArchive`].
pub struct MemoryStateArchive {
    archived: Mutex<HashMap<SessionId, (String, u64)>>,
    hot: Arc<dyn StateStore>,
    archive_ttl_days: u64,
    clock: FakeClock,
}

impl MemoryStateArchive {
    pub fn new(hot: Arc<dyn StateStore>, archive_ttl_days: u64, clock: FakeClock) -> Self {
        Self { archived: Mutex::new(HashMap::new()), hot, archive_ttl_days, clock }
    }

    pub fn archived_count(&self) -> usize {
        self.archived.lock().len()
    }
}

#[async_trait]
impl StateArchive for MemoryStateArchive {
    async fn archive(&self, session_id: &SessionId, state_b64: &str) -> Result<(), StoreError> {
        self.archived
            .lock()
            .insert(*session_id, (state_b64.to_string(), self.clock.epoch_ms()));
        Ok(())
    }

    async fn restore(&self, session_id: &SessionId) -> Result<Option<String>, StoreError> {
        let state = self.archived.lock().get(session_id).map(|(s, _)| s.clone());
        if let Some(state) = &state {
            self.hot.save_state(session_id, state, None, false).await?;
        }
        Ok(state)
    }

    async fn delete(&self, session_id: &SessionId) -> Result<(), StoreError> {
        self.archived.lock().remove(session_id);
        Ok(())
    }

    async fn exists(&self, session_id: &SessionId) -> Result<bool, StoreError> {
        Ok(self.archived.lock().contains_key(session_id))
    }

    async fn archive_inactive(&self) -> Result<ArchiveSweep, StoreError> {
        let candidates = self.hot.archival_candidates(u64::MAX, usize::MAX).await?;
        let mut sweep = ArchiveSweep::default();
        for (sid, _, _) in candidates {
            if self.exists(&sid).await? {
                sweep.already_archived += 1;
                continue;
            }
            if let Some(state) = self.hot.get_state(&sid).await? {
                self.archive(&sid, &state).await?;
                sweep.archived += 1;
            }
        }
        Ok(sweep)
    }

    async fn cleanup_expired(&self) -> Result<usize, StoreError> {
        let cutoff = self
            .clock
            .epoch_ms()
            .saturating_sub(self.archive_ttl_days * 24 * 3600 * 1000);
        let mut archived = self.archived.lock();
        let before = archived.len();
        archived.retain(|_, (_, stored_at)| *stored_at >= cutoff);
        Ok(before - archived.len())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
