// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event types for the runcell system
//!
//! Events decouple the services: the session registry never calls the file
//! store directly for reactive cleanup, it publishes `SessionDeleted` and
//! the cleanup scheduler reacts. Serializes with
//! `{"type": "event:name", ...fields}` format.

use crate::id::{ExecutionId, FileId, SessionId};
use crate::language::Language;
use serde::{Deserialize, Serialize};

/// Why a fresh (non-pooled) sandbox had to be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreshSandboxReason {
    PoolEmpty,
    PoolDisabled,
    LanguageNotPooled,
}

impl FreshSandboxReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FreshSandboxReason::PoolEmpty => "pool_empty",
            FreshSandboxReason::PoolDisabled => "pool_disabled",
            FreshSandboxReason::LanguageNotPooled => "language_not_pooled",
        }
    }
}

/// Events published on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // -- session --
    #[serde(rename = "session:created")]
    SessionCreated {
        session_id: SessionId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entity_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },

    #[serde(rename = "session:deleted")]
    SessionDeleted { session_id: SessionId },

    // -- execution --
    #[serde(rename = "execution:started")]
    ExecutionStarted {
        execution_id: ExecutionId,
        session_id: SessionId,
        language: Language,
    },

    #[serde(rename = "execution:completed")]
    ExecutionCompleted {
        execution_id: ExecutionId,
        session_id: SessionId,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        execution_time_ms: Option<u64>,
    },

    // -- files --
    #[serde(rename = "file:uploaded")]
    FileUploaded {
        file_id: FileId,
        session_id: SessionId,
        filename: String,
    },

    #[serde(rename = "file:deleted")]
    FileDeleted { file_id: FileId, session_id: SessionId },

    // -- sandboxes --
    #[serde(rename = "sandbox:created")]
    SandboxCreated {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
        language: Language,
    },

    #[serde(rename = "sandbox:destroyed")]
    SandboxDestroyed {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<SessionId>,
    },

    #[serde(rename = "sandbox:acquired_from_pool")]
    SandboxAcquiredFromPool {
        name: String,
        session_id: SessionId,
        language: Language,
        acquire_time_ms: u64,
    },

    #[serde(rename = "sandbox:created_fresh")]
    SandboxCreatedFresh {
        session_id: SessionId,
        language: Language,
        reason: FreshSandboxReason,
    },

    // -- pools --
    #[serde(rename = "pool:warmed")]
    PoolWarmed { language: Language, count: usize },

    #[serde(rename = "pool:exhausted")]
    PoolExhausted { language: Language, session_id: SessionId },
}

/// Discriminant of [`Event`], used as the subscription key on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SessionCreated,
    SessionDeleted,
    ExecutionStarted,
    ExecutionCompleted,
    FileUploaded,
    FileDeleted,
    SandboxCreated,
    SandboxDestroyed,
    SandboxAcquiredFromPool,
    SandboxCreatedFresh,
    PoolWarmed,
    PoolExhausted,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::SessionCreated { .. } => EventKind::SessionCreated,
            Event::SessionDeleted { .. } => EventKind::SessionDeleted,
            Event::ExecutionStarted { .. } => EventKind::ExecutionStarted,
            Event::ExecutionCompleted { .. } => EventKind::ExecutionCompleted,
            Event::FileUploaded { .. } => EventKind::FileUploaded,
            Event::FileDeleted { .. } => EventKind::FileDeleted,
            Event::SandboxCreated { .. } => EventKind::SandboxCreated,
            Event::SandboxDestroyed { .. } => EventKind::SandboxDestroyed,
            Event::SandboxAcquiredFromPool { .. } => EventKind::SandboxAcquiredFromPool,
            Event::SandboxCreatedFresh { .. } => EventKind::SandboxCreatedFresh,
            Event::PoolWarmed { .. } => EventKind::PoolWarmed,
            Event::PoolExhausted { .. } => EventKind::PoolExhausted,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Event::SessionCreated { .. } => "session:created",
            Event::SessionDeleted { .. } => "session:deleted",
            Event::ExecutionStarted { .. } => "execution:started",
            Event::ExecutionCompleted { .. } => "execution:completed",
            Event::FileUploaded { .. } => "file:uploaded",
            Event::FileDeleted { .. } => "file:deleted",
            Event::SandboxCreated { .. } => "sandbox:created",
            Event::SandboxDestroyed { .. } => "sandbox:destroyed",
            Event::SandboxAcquiredFromPool { .. } => "sandbox:acquired_from_pool",
            Event::SandboxCreatedFresh { .. } => "sandbox:created_fresh",
            Event::PoolWarmed { .. } => "pool:warmed",
            Event::PoolExhausted { .. } => "pool:exhausted",
        }
    }

    /// Session the event concerns, when it has one.
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            Event::SessionCreated { session_id, .. }
            | Event::SessionDeleted { session_id }
            | Event::ExecutionStarted { session_id, .. }
            | Event::ExecutionCompleted { session_id, .. }
            | Event::FileUploaded { session_id, .. }
            | Event::FileDeleted { session_id, .. }
            | Event::SandboxAcquiredFromPool { session_id, .. }
            | Event::SandboxCreatedFresh { session_id, .. }
            | Event::PoolExhausted { session_id, .. } => Some(session_id),
            Event::SandboxCreated { session_id, .. }
            | Event::SandboxDestroyed { session_id, .. } => session_id.as_ref(),
            Event::PoolWarmed { .. } => None,
        }
    }

    pub fn log_summary(&self) -> String {
        let t = self.name();
        match self {
            Event::SessionCreated { session_id, entity_id, .. } => match entity_id {
                Some(e) => format!("{t} session={} entity={e}", session_id.short(12)),
                None => format!("{t} session={}", session_id.short(12)),
            },
            Event::SessionDeleted { session_id } => {
                format!("{t} session={}", session_id.short(12))
            }
            Event::ExecutionStarted { execution_id, session_id, language } => format!(
                "{t} exec={} session={} lang={language}",
                execution_id.short(8),
                session_id.short(12)
            ),
            Event::ExecutionCompleted { execution_id, success, execution_time_ms, .. } => {
                match execution_time_ms {
                    Some(ms) => format!("{t} exec={} ok={success} {ms}ms", execution_id.short(8)),
                    None => format!("{t} exec={} ok={success}", execution_id.short(8)),
                }
            }
            Event::FileUploaded { file_id, filename, .. } => {
                format!("{t} file={} name={filename}", file_id.short(8))
            }
            Event::FileDeleted { file_id, .. } => format!("{t} file={}", file_id.short(8)),
            Event::SandboxCreated { name, language, .. } => {
                format!("{t} sandbox={name} lang={language}")
            }
            Event::SandboxDestroyed { name, .. } => format!("{t} sandbox={name}"),
            Event::SandboxAcquiredFromPool { name, language, acquire_time_ms, .. } => {
                format!("{t} sandbox={name} lang={language} {acquire_time_ms}ms")
            }
            Event::SandboxCreatedFresh { language, reason, .. } => {
                format!("{t} lang={language} reason={}", reason.as_str())
            }
            Event::PoolWarmed { language, count } => format!("{t} lang={language} count={count}"),
            Event::PoolExhausted { language, session_id } => {
                format!("{t} lang={language} session={}", session_id.short(12))
            }
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
