// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for the sandbox sidecar.
//!
//! The sidecar is the only way to reach user code. It exposes a tiny API
//! on port 8080: `/health`, `/ready`, `/files` (multipart upload, listing,
//! and read-back), and `/execute`. Transport failures are folded into an
//! execution result rather than surfaced as errors — a dead sidecar and a
//! crashed snippet look the same to the caller.

use runcell_core::ExecutionId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Working directory for user code inside every sandbox.
pub const WORKING_DIR: &str = "/mnt/data";

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
const FILE_TIMEOUT: Duration = Duration::from_secs(30);
/// Extra network allowance on top of the user timeout for `/execute`.
const EXECUTE_GRACE: Duration = Duration::from_secs(10);

/// Request body for `POST /execute`.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutePayload {
    pub code: String,
    /// User timeout in seconds, enforced inside the sandbox.
    pub timeout: u64,
    pub working_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_state: Option<bool>,
}

impl ExecutePayload {
    pub fn new(code: impl Into<String>, timeout: u64) -> Self {
        Self {
            code: code.into(),
            timeout,
            working_dir: WORKING_DIR.to_string(),
            initial_state: None,
            capture_state: None,
        }
    }
}

/// Result of one `/execute` round trip, synthesized locally on transport
/// failure.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SidecarResult {
    pub exit_code: i32,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub execution_time_ms: u64,
    /// Base64 serialized interpreter state, when capture was requested.
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub state_errors: Option<Vec<String>>,
}

impl SidecarResult {
    pub fn failure(stderr: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            stdout: String::new(),
            stderr: stderr.into(),
            execution_time_ms: 0,
            state: None,
            state_errors: None,
        }
    }

    pub fn timed_out(timeout_secs: u64) -> Self {
        Self {
            exit_code: 124,
            stdout: String::new(),
            stderr: format!("Execution timed out after {timeout_secs} seconds"),
            execution_time_ms: timeout_secs * 1000,
            state: None,
            state_errors: None,
        }
    }
}

/// One entry in the sidecar's `/files` listing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SidecarFile {
    pub path: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Deserialize)]
struct FileListing {
    #[serde(default)]
    files: Vec<SidecarFile>,
}

/// Client for one-or-many sidecars; the base URL is passed per call since
/// handles come and go.
#[derive(Clone, Default)]
pub struct SidecarClient {
    http: reqwest::Client,
}

impl SidecarClient {
    pub fn new() -> Self {
        Self { http: reqwest::Client::new() }
    }

    /// `GET /health` — liveness.
    pub async fn health(&self, base_url: &str) -> bool {
        match self
            .http
            .get(format!("{base_url}/health"))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// `GET /ready` — readiness, used during warmup.
    pub async fn ready(&self, base_url: &str) -> bool {
        match self
            .http
            .get(format!("{base_url}/ready"))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Upload one file into `/mnt/data` via multipart `POST /files`.
    pub async fn upload_file(
        &self,
        base_url: &str,
        filename: &str,
        content: Vec<u8>,
    ) -> Result<(), String> {
        let part = reqwest::multipart::Part::bytes(content).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part("files", part);
        let resp = self
            .http
            .post(format!("{base_url}/files"))
            .multipart(form)
            .timeout(FILE_TIMEOUT)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(format!("sidecar returned {}", resp.status()))
        }
    }

    /// List files currently present under `/mnt/data`.
    pub async fn list_files(&self, base_url: &str) -> Vec<SidecarFile> {
        let resp = match self
            .http
            .get(format!("{base_url}/files"))
            .timeout(FILE_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp,
            _ => return Vec::new(),
        };
        match resp.json::<FileListing>().await {
            Ok(listing) => listing.files,
            Err(_) => Vec::new(),
        }
    }

    /// Read back a file from `/mnt/data`. The path must resolve strictly
    /// under the working directory; traversal is rejected locally.
    pub async fn read_file(&self, base_url: &str, container_path: &str) -> Option<Vec<u8>> {
        let relative = data_relative_path(container_path)?;
        let resp = self
            .http
            .get(format!("{base_url}/files/{relative}"))
            .timeout(FILE_TIMEOUT)
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        resp.bytes().await.ok().map(|b| b.to_vec())
    }

    /// Run a snippet. Blocks until the sidecar replies or the grace window
    /// past the user timeout elapses; never returns a transport error.
    pub async fn execute(&self, base_url: &str, payload: &ExecutePayload) -> SidecarResult {
        let deadline = Duration::from_secs(payload.timeout) + EXECUTE_GRACE;
        let started = std::time::Instant::now();
        let result = self
            .http
            .post(format!("{base_url}/execute"))
            .json(payload)
            .timeout(deadline)
            .send()
            .await;

        let resp = match result {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => {
                tracing::warn!(timeout = payload.timeout, "execute request timed out");
                return SidecarResult::timed_out(payload.timeout);
            }
            Err(e) => {
                tracing::error!(error = %e, "execute request failed");
                return SidecarResult::failure(format!("Execution error: {e}"));
            }
        };

        if !resp.status().is_success() {
            return SidecarResult::failure(format!("Sidecar error: {}", resp.status().as_u16()));
        }

        match resp.json::<SidecarResult>().await {
            Ok(result) => {
                tracing::debug!(
                    exit_code = result.exit_code,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "execute completed"
                );
                result
            }
            Err(e) => SidecarResult::failure(format!("Execution error: {e}")),
        }
    }

    /// Upload files then execute; the standard sequence for both the pool
    /// and the job executor. Upload failures are logged and skipped so one
    /// bad file does not kill the execution.
    pub async fn upload_and_execute(
        &self,
        base_url: &str,
        payload: &ExecutePayload,
        files: &[(String, Vec<u8>)],
        execution_id: &ExecutionId,
    ) -> SidecarResult {
        for (filename, content) in files {
            if let Err(e) = self.upload_file(base_url, filename, content.clone()).await {
                tracing::warn!(
                    execution_id = %execution_id.short(8),
                    filename,
                    error = %e,
                    "failed to upload file"
                );
            }
        }
        self.execute(base_url, payload).await
    }
}

/// Normalize a container path to its `/mnt/data`-relative form. Returns
/// `None` when the path escapes the working directory.
pub fn data_relative_path(path: &str) -> Option<String> {
    if path.contains('\0') {
        return None;
    }
    let absolute = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("{WORKING_DIR}/{path}")
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in absolute.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }

    let normalized = format!("/{}", segments.join("/"));
    let relative = normalized.strip_prefix("/mnt/data/")?;
    if relative.is_empty() {
        return None;
    }
    Some(relative.to_string())
}

#[cfg(test)]
#[path = "sidecar_tests.rs"]
mod tests;
