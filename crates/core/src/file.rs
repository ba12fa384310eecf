// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File entry model — metadata for a stored session file. The blob itself
//! lives in the object store under `object_key`.

use crate::id::{FileId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a file came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOrigin {
    /// Uploaded by the caller (directly or via presigned URL).
    Upload,
    /// Generated by executed code.
    Output,
}

impl FileOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileOrigin::Upload => "upload",
            FileOrigin::Output => "output",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "upload" => Some(FileOrigin::Upload),
            "output" => Some(FileOrigin::Output),
            _ => None,
        }
    }

    /// Path segment in the object store key (`uploads` or `outputs`).
    pub fn key_segment(&self) -> &'static str {
        match self {
            FileOrigin::Upload => "uploads",
            FileOrigin::Output => "outputs",
        }
    }
}

/// Metadata for one stored file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub file_id: FileId,
    pub session_id: SessionId,
    pub filename: String,
    pub content_type: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    /// Key of the blob inside the object store bucket.
    pub object_key: String,
    /// Display path inside the sandbox working directory.
    pub path: String,
    pub origin: FileOrigin,
}
