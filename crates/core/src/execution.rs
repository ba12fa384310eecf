// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution record and output models.

use crate::id::{ExecutionId, SessionId};
use crate::language::Language;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Timeout,
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Timeout => "timeout",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionStatus::Completed)
    }
}

/// Kind of a single output item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Stdout,
    Stderr,
    Image,
    File,
    Error,
}

/// One output item produced by an execution. For `File` outputs the
/// content is the container-side path, not the file body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    #[serde(rename = "type")]
    pub kind: OutputKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl ExecutionOutput {
    pub fn stdout(content: impl Into<String>) -> Self {
        Self { kind: OutputKind::Stdout, content: content.into(), mime_type: None, size: None }
    }

    pub fn stderr(content: impl Into<String>) -> Self {
        Self { kind: OutputKind::Stderr, content: content.into(), mime_type: None, size: None }
    }

    pub fn file(path: impl Into<String>, size: Option<u64>) -> Self {
        Self { kind: OutputKind::File, content: path.into(), mime_type: None, size }
    }
}

/// Full record of one code execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: ExecutionId,
    pub session_id: SessionId,
    pub code: String,
    pub language: Language,
    pub status: ExecutionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub outputs: Vec<ExecutionOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_peak_mb: Option<f64>,
}

impl ExecutionRecord {
    /// Outputs of a given kind, in order.
    pub fn outputs_of(&self, kind: OutputKind) -> impl Iterator<Item = &ExecutionOutput> {
        self.outputs.iter().filter(move |o| o.kind == kind)
    }
}

#[cfg(test)]
#[path = "execution_tests.rs"]
mod tests;
