// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File storage: blobs in the object store, metadata in Redis.
//!
//! Object layout: `sessions/<sid>/uploads/<fid>` for caller uploads and
//! `sessions/<sid>/outputs/<fid>` for execution artifacts. Metadata lives
//! at `files:<sid>:<fid>` (hash) plus a `session_files:<sid>` id set, both
//! with the session TTL.

use crate::error::StoreError;
use crate::keys;
use crate::object::{ObjectInfo, ObjectStore};
use crate::traits::FileStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_redis::redis::AsyncCommands;
use deadpool_redis::Pool;
use runcell_core::{Clock, FileEntry, FileId, FileOrigin, SessionId, SystemClock};
use std::collections::{HashMap, HashSet};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Redis + object-store file service.
pub struct ObjectFileStore<C: Clock = SystemClock> {
    pool: Pool,
    objects: ObjectStore,
    session_ttl_seconds: u64,
    clock: C,
}

impl ObjectFileStore<SystemClock> {
    pub fn new(pool: Pool, objects: ObjectStore, session_ttl_seconds: u64) -> Self {
        Self::with_clock(pool, objects, session_ttl_seconds, SystemClock)
    }
}

impl<C: Clock> ObjectFileStore<C> {
    pub fn with_clock(
        pool: Pool,
        objects: ObjectStore,
        session_ttl_seconds: u64,
        clock: C,
    ) -> Self {
        Self { pool, objects, session_ttl_seconds, clock }
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, StoreError> {
        Ok(self.pool.get().await?)
    }

    async fn store_metadata(&self, entry: &FileEntry) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let meta_key = keys::file_meta_key(&entry.session_id, &entry.file_id);
        let set_key = keys::session_files_key(&entry.session_id);
        let fields = entry_to_fields(entry);
        let ttl = self.session_ttl_seconds as i64;

        let _: () = deadpool_redis::redis::pipe()
            .hset_multiple(&meta_key, &fields)
            .expire(&meta_key, ttl)
            .sadd(&set_key, entry.file_id.as_str())
            .expire(&set_key, ttl)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn read_metadata(
        &self,
        session_id: &SessionId,
        file_id: &FileId,
    ) -> Result<Option<FileEntry>, StoreError> {
        let mut conn = self.conn().await?;
        let fields: HashMap<String, String> =
            conn.hgetall(keys::file_meta_key(session_id, file_id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        match entry_from_fields(&fields) {
            Ok(entry) => Ok(Some(entry)),
            Err(reason) => Err(StoreError::corrupt(
                keys::file_meta_key(session_id, file_id),
                reason,
            )),
        }
    }

    async fn delete_metadata(
        &self,
        session_id: &SessionId,
        file_id: &FileId,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _: () = deadpool_redis::redis::pipe()
            .del(keys::file_meta_key(session_id, file_id))
            .srem(keys::session_files_key(session_id), file_id.as_str())
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn store_file(
        &self,
        session_id: &SessionId,
        filename: &str,
        bytes: Vec<u8>,
        content_type: &str,
        origin: FileOrigin,
    ) -> Result<FileId, StoreError> {
        let file_id = FileId::new();
        let object_key = keys::object_file_key(session_id, origin, &file_id);
        let size = bytes.len() as u64;

        self.objects.put(&object_key, bytes, content_type).await?;

        let path = match origin {
            FileOrigin::Upload => format!("/{filename}"),
            FileOrigin::Output => format!("/outputs/{filename}"),
        };
        let entry = FileEntry {
            file_id,
            session_id: *session_id,
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            size,
            created_at: self.clock.now_utc(),
            object_key,
            path,
            origin,
        };
        self.store_metadata(&entry).await?;

        tracing::info!(
            session_id = %session_id.short(12),
            file_id = %file_id.short(8),
            filename,
            size,
            origin = origin.as_str(),
            "stored file"
        );
        Ok(file_id)
    }
}

#[async_trait]
impl<C: Clock + 'static> FileStore for ObjectFileStore<C> {
    async fn upload_url(
        &self,
        session_id: &SessionId,
        filename: &str,
        content_type: Option<&str>,
    ) -> Result<(FileId, String), StoreError> {
        let file_id = FileId::new();
        let object_key = keys::object_file_key(session_id, FileOrigin::Upload, &file_id);
        let url = self.objects.presigned_put(&object_key).await?;

        // Size is persisted as 0 until confirm_upload stats the object.
        let entry = FileEntry {
            file_id,
            session_id: *session_id,
            filename: filename.to_string(),
            content_type: content_type.unwrap_or(DEFAULT_CONTENT_TYPE).to_string(),
            size: 0,
            created_at: self.clock.now_utc(),
            object_key,
            path: format!("/{filename}"),
            origin: FileOrigin::Upload,
        };
        self.store_metadata(&entry).await?;

        tracing::info!(
            session_id = %session_id.short(12),
            file_id = %file_id.short(8),
            filename,
            "generated file upload url"
        );
        Ok((file_id, url))
    }

    async fn confirm_upload(
        &self,
        session_id: &SessionId,
        file_id: &FileId,
    ) -> Result<Option<FileEntry>, StoreError> {
        let Some(mut entry) = self.read_metadata(session_id, file_id).await? else {
            return Ok(None);
        };
        let Some(info) = self.objects.stat(&entry.object_key).await? else {
            return Ok(None);
        };
        entry.size = info.size;
        self.store_metadata(&entry).await?;
        tracing::info!(
            session_id = %session_id.short(12),
            file_id = %file_id.short(8),
            size = info.size,
            "confirmed file upload"
        );
        Ok(Some(entry))
    }

    async fn store_uploaded_file(
        &self,
        session_id: &SessionId,
        filename: &str,
        bytes: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<FileId, StoreError> {
        self.store_file(
            session_id,
            filename,
            bytes,
            content_type.unwrap_or(DEFAULT_CONTENT_TYPE),
            FileOrigin::Upload,
        )
        .await
    }

    async fn store_output_file(
        &self,
        session_id: &SessionId,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<FileId, StoreError> {
        self.store_file(session_id, filename, bytes, DEFAULT_CONTENT_TYPE, FileOrigin::Output)
            .await
    }

    async fn entry(
        &self,
        session_id: &SessionId,
        file_id: &FileId,
    ) -> Result<Option<FileEntry>, StoreError> {
        self.read_metadata(session_id, file_id).await
    }

    async fn content(
        &self,
        session_id: &SessionId,
        file_id: &FileId,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let Some(entry) = self.read_metadata(session_id, file_id).await? else {
            return Ok(None);
        };
        self.objects.get(&entry.object_key).await
    }

    async fn download_url(
        &self,
        session_id: &SessionId,
        file_id: &FileId,
    ) -> Result<Option<String>, StoreError> {
        let Some(entry) = self.read_metadata(session_id, file_id).await? else {
            return Ok(None);
        };
        Ok(Some(self.objects.presigned_get(&entry.object_key).await?))
    }

    async fn list(&self, session_id: &SessionId) -> Result<Vec<FileEntry>, StoreError> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn.smembers(keys::session_files_key(session_id)).await?;
        drop(conn);

        let mut entries = Vec::new();
        for id in ids {
            if let Some(entry) = self.read_metadata(session_id, &FileId::from_string(&id)).await? {
                entries.push(entry);
            }
        }
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }

    async fn delete(&self, session_id: &SessionId, file_id: &FileId) -> Result<bool, StoreError> {
        let Some(entry) = self.read_metadata(session_id, file_id).await? else {
            return Ok(false);
        };
        self.objects.delete(&entry.object_key).await?;
        self.delete_metadata(session_id, file_id).await?;
        tracing::info!(
            session_id = %session_id.short(12),
            file_id = %file_id.short(8),
            "deleted file"
        );
        Ok(true)
    }

    async fn cleanup_session_files(&self, session_id: &SessionId) -> Result<usize, StoreError> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn.smembers(keys::session_files_key(session_id)).await?;
        drop(conn);

        let mut deleted = 0usize;
        for id in ids {
            if self.delete(session_id, &FileId::from_string(&id)).await? {
                deleted += 1;
            }
        }

        let mut conn = self.conn().await?;
        let _: i64 = conn.del(keys::session_files_key(session_id)).await?;
        drop(conn);

        // No metadata left: fall back to prefix deletion so objects whose
        // metadata already expired still go away.
        if deleted == 0 {
            for origin in [FileOrigin::Upload, FileOrigin::Output] {
                let prefix = format!("sessions/{session_id}/{}/", origin.key_segment());
                for obj in self.objects.list_prefix(&prefix).await? {
                    self.objects.delete(&obj.key).await?;
                    deleted += 1;
                }
            }
        }

        tracing::info!(session_id = %session_id.short(12), deleted, "cleaned up session files");
        Ok(deleted)
    }

    async fn cleanup_orphans(&self, batch_limit: usize) -> Result<usize, StoreError> {
        let mut conn = self.conn().await?;
        let active: HashSet<String> = conn
            .smembers::<_, Vec<String>>(keys::SESSION_INDEX_KEY)
            .await?
            .into_iter()
            .collect();

        // Empty index means a cold start or a wiped Redis; deleting here
        // could destroy every live object.
        if active.is_empty() {
            tracing::debug!("skipping orphan cleanup: empty session index");
            return Ok(0);
        }

        let objects = self.objects.list_prefix(keys::OBJECT_SESSIONS_PREFIX).await?;
        let now = self.clock.now_utc();
        let candidates = orphan_prefilter(&objects, &active, now, self.session_ttl_seconds);

        let mut deleted = 0usize;
        let mut session_exists: HashMap<String, bool> = HashMap::new();
        for (key, sid) in candidates {
            if deleted >= batch_limit {
                break;
            }
            // Double-check against the session hash in case the index is stale.
            let exists = match session_exists.get(sid) {
                Some(v) => *v,
                None => {
                    let exists: bool = conn
                        .exists(keys::session_key(&SessionId::from_string(sid)))
                        .await
                        .unwrap_or(true);
                    session_exists.insert(sid.to_string(), exists);
                    exists
                }
            };
            if exists {
                continue;
            }
            if let Err(e) = self.objects.delete(key).await {
                tracing::error!(object_key = key, error = %e, "failed to delete orphan object");
                continue;
            }
            deleted += 1;
        }

        if deleted > 0 {
            tracing::info!(deleted, "deleted orphan objects");
        }
        Ok(deleted)
    }
}

/// Objects that are orphan candidates: parsable session key, older than the
/// session TTL, and not in the active index. Returns `(object_key, session_id)`
/// pairs; the caller still double-checks session existence before deleting.
///
/// An empty active index disables the whole sweep (cold-start guard).
pub fn orphan_prefilter<'a>(
    objects: &'a [ObjectInfo],
    active: &HashSet<String>,
    now: DateTime<Utc>,
    ttl_seconds: u64,
) -> Vec<(&'a str, &'a str)> {
    if active.is_empty() {
        return Vec::new();
    }

    let mut candidates = Vec::new();
    for obj in objects {
        let Some(sid) = keys::session_from_object_key(&obj.key) else { continue };
        // Unknown age: keep the object rather than risk racing an upload.
        let Some(modified) = obj.last_modified else { continue };
        let age = now.signed_duration_since(modified);
        if age.num_seconds() < ttl_seconds as i64 {
            continue;
        }
        if active.contains(sid) {
            continue;
        }
        candidates.push((obj.key.as_str(), sid));
    }
    candidates
}

fn entry_to_fields(entry: &FileEntry) -> Vec<(String, String)> {
    vec![
        ("file_id".into(), entry.file_id.to_string()),
        ("filename".into(), entry.filename.clone()),
        ("content_type".into(), entry.content_type.clone()),
        ("object_key".into(), entry.object_key.clone()),
        ("session_id".into(), entry.session_id.to_string()),
        ("created_at".into(), entry.created_at.to_rfc3339()),
        ("size".into(), entry.size.to_string()),
        ("path".into(), entry.path.clone()),
        ("origin".into(), entry.origin.as_str().into()),
    ]
}

fn entry_from_fields(fields: &HashMap<String, String>) -> Result<FileEntry, String> {
    let get = |key: &str| -> Result<&String, String> {
        fields.get(key).filter(|v| !v.is_empty()).ok_or_else(|| format!("missing {key}"))
    };

    let created_raw = get("created_at")?;
    let created_at = DateTime::parse_from_rfc3339(created_raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| format!("bad created_at: {e}"))?;
    let size = fields
        .get("size")
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    let origin = fields
        .get("origin")
        .and_then(|v| FileOrigin::parse(v))
        .unwrap_or(FileOrigin::Upload);

    Ok(FileEntry {
        file_id: FileId::from_string(get("file_id")?),
        session_id: SessionId::from_string(get("session_id")?),
        filename: get("filename")?.clone(),
        content_type: fields
            .get("content_type")
            .filter(|v| !v.is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
        size,
        created_at,
        object_key: get("object_key")?.clone(),
        path: fields.get("path").cloned().unwrap_or_default(),
        origin,
    })
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
