// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session model — the logical conversation between a caller and the
//! service. Sessions group files and (for Python) persisted interpreter
//! state across executions.

use crate::id::SessionId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Idle,
    Terminated,
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Idle => "idle",
            SessionStatus::Terminated => "terminated",
            SessionStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SessionStatus::Active),
            "idle" => Some(SessionStatus::Idle),
            "terminated" => Some(SessionStatus::Terminated),
            "error" => Some(SessionStatus::Error),
            _ => None,
        }
    }
}

/// A code-execution session.
///
/// Invariant: `expires_at > created_at`. Enforced by [`Session::new`];
/// callers deserializing foreign data should treat a violation as corrupt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Free-form metadata. `entity_id` groups sessions for reuse,
    /// `user_id` is carried for audit.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Session {
    /// Create a new active session expiring `ttl_seconds` from `now`.
    pub fn new(now: DateTime<Utc>, ttl_seconds: i64, metadata: HashMap<String, String>) -> Self {
        Self {
            session_id: SessionId::new(),
            status: SessionStatus::Active,
            created_at: now,
            last_activity: now,
            expires_at: now + Duration::seconds(ttl_seconds.max(1)),
            metadata,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.metadata.get("entity_id").map(String::as_str)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.metadata.get("user_id").map(String::as_str)
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
