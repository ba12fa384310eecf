// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-request execution pipeline.
//!
//! The orchestrator coordinates session resolution, state loading, file
//! mounting, dispatch, generated-file capture, output assembly, state
//! saving, and cleanup. Endpoints stay thin: they validate transport
//! concerns and delegate here.
//!
//! Error policy: validation problems surface as 400s with field details;
//! timeouts and not-founds pass through; anything the pipeline cannot
//! resolve becomes `ServiceUnavailable("Code Execution", …)`.

use crate::bus::EventBus;
use crate::dispatcher::{DispatchOutcome, ExecuteCodeRequest, ExecutionBackend};
use base64::Engine;
use runcell_core::{
    ApiError, Event, ExecArgs, ExecutionId, ExecutionRecord, ExecutionStatus, FileId, Language,
    OutputKind, RequestId, SessionId,
};
use runcell_store::{state_hash_hex, FileStore, SessionStore, StateArchive, StateStore, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;

/// Wire request for one execution.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecRequest {
    pub code: String,
    pub lang: String,
    #[serde(default)]
    pub args: ExecArgs,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub files: Vec<FileRef>,
}

/// Reference to a previously stored file the snippet needs mounted.
#[derive(Debug, Clone, Deserialize)]
pub struct FileRef {
    pub id: String,
    pub session_id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// File generated by the execution, returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedFile {
    pub id: String,
    pub name: String,
}

/// Wire response for one execution.
#[derive(Debug, Clone, Serialize)]
pub struct ExecResponse {
    pub session_id: String,
    pub files: Vec<GeneratedFile>,
    pub stdout: String,
    pub stderr: String,
    pub has_state: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_hash: Option<String>,
}

/// Orchestrator tuning.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub state_persistence_enabled: bool,
    /// Also persist state when the execution failed.
    pub state_capture_on_error: bool,
    pub state_ttl_seconds: u64,
    /// Per-execution user timeout.
    pub max_execution_time_secs: u64,
    pub archive_enabled: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            state_persistence_enabled: true,
            state_capture_on_error: false,
            state_ttl_seconds: 7200,
            max_execution_time_secs: 30,
            archive_enabled: true,
        }
    }
}

struct MountedFile {
    filename: String,
    content: Vec<u8>,
}

/// Coordinates the execution workflow end to end.
pub struct Orchestrator {
    sessions: Arc<dyn SessionStore>,
    files: Arc<dyn FileStore>,
    backend: Arc<dyn ExecutionBackend>,
    state: Arc<dyn StateStore>,
    archive: Option<Arc<dyn StateArchive>>,
    bus: Arc<EventBus>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        files: Arc<dyn FileStore>,
        backend: Arc<dyn ExecutionBackend>,
        state: Arc<dyn StateStore>,
        archive: Option<Arc<dyn StateArchive>>,
        bus: Arc<EventBus>,
        config: OrchestratorConfig,
    ) -> Self {
        Self { sessions, files, backend, state, archive, bus, config }
    }

    /// Run the full pipeline for one request.
    pub async fn execute(
        &self,
        request: ExecRequest,
        request_id: RequestId,
        api_key_hash: Option<String>,
    ) -> Result<ExecResponse, ApiError> {
        // Step 1: validate
        let language = validate_request(&request)?;

        // Step 2: session resolution
        let session_id = self.resolve_session(&request).await?;

        // Step 3: prior state (python only)
        let initial_state = self.load_state(language, &session_id).await;

        // Step 4: mount files
        let mounted = self.mount_files(&request).await?;

        // Step 5: execute
        let use_state = self.config.state_persistence_enabled && language.supports_state();
        let execution_id = ExecutionId::new();
        let outcome = self
            .backend
            .execute_code(ExecuteCodeRequest {
                execution_id,
                session_id,
                code: request.code.clone(),
                language,
                timeout_secs: self.config.max_execution_time_secs,
                files: mounted.iter().map(|m| (m.filename.clone(), m.content.clone())).collect(),
                initial_state: use_state.then(|| initial_state.clone()).flatten(),
                capture_state: use_state,
            })
            .await;

        // The handle must be destroyed even if the client goes away
        // between here and the cleanup step.
        let mut handle_guard = HandleGuard {
            backend: Arc::clone(&self.backend),
            handle: outcome.handle.clone(),
        };

        tracing::info!(
            request_id = %request_id.short(8),
            session_id = %session_id.short(12),
            execution_id = %execution_id.short(8),
            status = outcome.record.status.as_str(),
            source = outcome.source.as_str(),
            api_key = api_key_hash.as_deref().map(|h| &h[..h.len().min(8)]).unwrap_or("unknown"),
            "code execution completed"
        );

        // Step 6: generated files
        let generated = self.handle_generated_files(&session_id, &outcome, &mounted).await;

        // Step 7: outputs
        let (stdout, stderr) = extract_outputs(&outcome.record);

        // Step 8: new state
        self.save_state(language, &session_id, &outcome).await;

        // Step 9: response
        let response = build_response(&session_id, generated, stdout, stderr, language, &outcome);

        // Step 10: cleanup (non-blocking, never fails the request)
        handle_guard.disarm();
        self.cleanup(&session_id, &outcome).await;

        Ok(response)
    }

    /// Session lookup priority: explicit request id, file-reference ids,
    /// most recent active session of the entity, then a new session.
    async fn resolve_session(&self, request: &ExecRequest) -> Result<SessionId, ApiError> {
        if let Some(raw) = &request.session_id {
            let sid = SessionId::from_string(raw);
            match self.sessions.get(&sid).await {
                Ok(Some(session)) if session.is_active() => {
                    tracing::info!(session_id = %sid.short(12), "reusing session from request");
                    return Ok(sid);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(session_id = %sid.short(12), error = %e, "error looking up session from request");
                }
            }
        }

        for file_ref in &request.files {
            let sid = SessionId::from_string(&file_ref.session_id);
            match self.sessions.get(&sid).await {
                Ok(Some(session)) if session.is_active() => {
                    tracing::info!(session_id = %sid.short(12), "reusing session from file reference");
                    return Ok(sid);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(session_id = %sid.short(12), error = %e, "error looking up session");
                }
            }
        }

        if let Some(entity_id) = &request.entity_id {
            match self.sessions.list_by_entity(entity_id, 1, 0).await {
                Ok(sessions) => {
                    if let Some(session) = sessions.first() {
                        if session.is_active() {
                            tracing::info!(
                                session_id = %session.session_id.short(12),
                                entity_id,
                                "reusing session by entity"
                            );
                            return Ok(session.session_id);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(entity_id, error = %e, "error looking up sessions by entity");
                }
            }
        }

        let mut metadata = HashMap::new();
        if let Some(entity_id) = &request.entity_id {
            metadata.insert("entity_id".to_string(), entity_id.clone());
        }
        if let Some(user_id) = &request.user_id {
            metadata.insert("user_id".to_string(), user_id.clone());
        }
        let session = self.sessions.create(metadata).await.map_err(svc_err)?;
        tracing::info!(session_id = %session.session_id, "created new session");
        self.bus
            .publish(Event::SessionCreated {
                session_id: session.session_id,
                entity_id: request.entity_id.clone(),
                user_id: request.user_id.clone(),
            })
            .await;
        Ok(session.session_id)
    }

    /// Load prior interpreter state. Priority: recently uploaded state
    /// (clearing its marker), hot cache, cold archive (rehydrating).
    /// Failures degrade to a stateless execution.
    async fn load_state(&self, language: Language, session_id: &SessionId) -> Option<String> {
        if !self.config.state_persistence_enabled || !language.supports_state() {
            return None;
        }

        match self.state.has_recent_upload(session_id).await {
            Ok(true) => match self.state.get_state(session_id).await {
                Ok(Some(state)) => {
                    if let Err(e) = self.state.clear_upload_marker(session_id).await {
                        tracing::warn!(session_id = %session_id.short(12), error = %e, "failed to clear upload marker");
                    }
                    tracing::info!(
                        session_id = %session_id.short(12),
                        state_size = state.len(),
                        "using client-uploaded state"
                    );
                    return Some(state);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(session_id = %session_id.short(12), error = %e, "failed to load uploaded state");
                }
            },
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(session_id = %session_id.short(12), error = %e, "upload marker check failed");
            }
        }

        match self.state.get_state(session_id).await {
            Ok(Some(state)) => {
                tracing::debug!(
                    session_id = %session_id.short(12),
                    state_size = state.len(),
                    "loaded state from hot cache"
                );
                return Some(state);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(session_id = %session_id.short(12), error = %e, "failed to load state");
            }
        }

        if self.config.archive_enabled {
            if let Some(archive) = &self.archive {
                match archive.restore(session_id).await {
                    Ok(Some(state)) => {
                        tracing::debug!(
                            session_id = %session_id.short(12),
                            state_size = state.len(),
                            "restored state from archive"
                        );
                        return Some(state);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(session_id = %session_id.short(12), error = %e, "archive restore failed");
                    }
                }
            }
        }
        None
    }

    /// Resolve file references into mounted files. An unresolvable
    /// reference is a validation error naming the file.
    async fn mount_files(&self, request: &ExecRequest) -> Result<Vec<MountedFile>, ApiError> {
        let mut mounted: Vec<MountedFile> = Vec::new();
        let mut seen: HashSet<(SessionId, FileId)> = HashSet::new();

        for file_ref in &request.files {
            let ref_session = SessionId::from_string(&file_ref.session_id);
            let ref_id = FileId::from_string(&file_ref.id);

            let mut entry = self.files.entry(&ref_session, &ref_id).await.map_err(svc_err)?;

            // Fallback: resolve by filename within the session.
            if entry.is_none() {
                if let Some(name) = &file_ref.name {
                    let listed = self.files.list(&ref_session).await.map_err(svc_err)?;
                    entry = listed.into_iter().find(|f| &f.filename == name);
                }
            }

            let Some(entry) = entry else {
                tracing::warn!(file_id = file_ref.id, name = ?file_ref.name, "file not found");
                return Err(ApiError::validation_field(
                    format!("File not found: {}", file_ref.id),
                    "files",
                    format!("File '{}' could not be resolved in session '{}'", file_ref.id, file_ref.session_id),
                    "file_not_found",
                ));
            };

            if !seen.insert((ref_session, entry.file_id)) {
                continue;
            }

            let content = self
                .files
                .content(&ref_session, &entry.file_id)
                .await
                .map_err(svc_err)?
                .ok_or_else(|| {
                    ApiError::validation_field(
                        format!("File not found: {}", file_ref.id),
                        "files",
                        format!("File '{}' has no stored content", file_ref.id),
                        "file_not_found",
                    )
                })?;

            mounted.push(MountedFile { filename: entry.filename, content });
        }
        Ok(mounted)
    }

    /// Persist files the snippet generated, excluding dotfiles and
    /// anything shadowing an input mount. Failures skip the file.
    async fn handle_generated_files(
        &self,
        session_id: &SessionId,
        outcome: &DispatchOutcome,
        mounted: &[MountedFile],
    ) -> Vec<GeneratedFile> {
        let Some(handle) = &outcome.handle else { return Vec::new() };
        let input_names: HashSet<&str> = mounted.iter().map(|m| m.filename.as_str()).collect();

        let mut generated = Vec::new();
        for output in outcome.record.outputs_of(OutputKind::File) {
            let path = output.content.as_str();
            let filename = path.rsplit('/').next().unwrap_or(path);
            if filename.is_empty() || filename.starts_with('.') {
                continue;
            }
            if input_names.contains(filename) {
                continue;
            }

            let Some(content) = self.backend.fetch_file(handle, path).await else {
                tracing::error!(filename, "failed to retrieve generated file");
                continue;
            };
            match self.files.store_output_file(session_id, filename, content).await {
                Ok(file_id) => {
                    tracing::info!(
                        session_id = %session_id.short(12),
                        file_id = %file_id.short(8),
                        filename,
                        "generated file stored"
                    );
                    generated.push(GeneratedFile { id: file_id.to_string(), name: filename.to_string() });
                }
                Err(e) => {
                    tracing::error!(filename, error = %e, "failed to store generated file");
                }
            }
        }
        generated
    }

    /// Persist captured state. Skipped for failed executions unless
    /// capture-on-error is configured.
    async fn save_state(&self, language: Language, session_id: &SessionId, outcome: &DispatchOutcome) {
        if !self.config.state_persistence_enabled || !language.supports_state() {
            return;
        }
        if !outcome.record.status.is_success() && !self.config.state_capture_on_error {
            tracing::debug!(
                session_id = %session_id.short(12),
                "skipping state save for failed execution"
            );
            return;
        }
        if let Some(new_state) = &outcome.new_state {
            if let Err(e) = self
                .state
                .save_state(session_id, new_state, Some(self.config.state_ttl_seconds), false)
                .await
            {
                tracing::warn!(session_id = %session_id.short(12), error = %e, "failed to save state");
            }
        }
        if let Some(errors) = &outcome.state_errors {
            for warning in errors.iter().take(5) {
                tracing::debug!(session_id = %session_id.short(12), warning, "state serialization warning");
            }
        }
    }

    /// Destroy the sandbox without blocking the response and publish the
    /// completion event. Errors never escape.
    async fn cleanup(&self, session_id: &SessionId, outcome: &DispatchOutcome) {
        if let Some(handle) = outcome.handle.clone() {
            let backend = Arc::clone(&self.backend);
            tracing::debug!(sandbox = handle.name, "scheduling sandbox destruction");
            tokio::spawn(async move {
                backend.destroy_handle(&handle).await;
            });
        }

        let success = outcome.record.status.is_success();
        self.bus
            .publish(Event::ExecutionCompleted {
                execution_id: outcome.record.execution_id,
                session_id: *session_id,
                success,
                execution_time_ms: outcome.record.execution_time_ms,
            })
            .await;
    }
}

/// Validate language and code; returns the normalized language.
fn validate_request(request: &ExecRequest) -> Result<Language, ApiError> {
    let language = Language::from_str(&request.lang).map_err(|_| {
        tracing::error!(language = request.lang, "unsupported language");
        ApiError::validation_field(
            format!("Unsupported programming language: {}", request.lang),
            "lang",
            format!("Language '{}' is not supported", request.lang),
            "unsupported_language",
        )
    })?;

    if request.code.trim().is_empty() {
        tracing::error!("empty code provided");
        return Err(ApiError::validation_field(
            "Code cannot be empty",
            "code",
            "Code field is required and cannot be empty",
            "empty_code",
        ));
    }
    Ok(language)
}

/// Assemble stdout/stderr from the record's outputs. stdout gains a
/// trailing newline when non-empty (external contract); a failed
/// execution with silent stderr surfaces its error message there.
pub fn extract_outputs(record: &ExecutionRecord) -> (String, String) {
    let stdout_parts: Vec<&str> =
        record.outputs_of(OutputKind::Stdout).map(|o| o.content.as_str()).collect();
    let stderr_parts: Vec<&str> =
        record.outputs_of(OutputKind::Stderr).map(|o| o.content.as_str()).collect();

    let mut stdout = stdout_parts.join("\n");
    let mut stderr = stderr_parts.join("\n");

    if record.status == ExecutionStatus::Failed && stderr.is_empty() {
        if let Some(message) = &record.error_message {
            stderr = message.clone();
        }
    }

    if !stdout.is_empty() && !stdout.ends_with('\n') {
        stdout.push('\n');
    }
    (stdout, stderr)
}

fn build_response(
    session_id: &SessionId,
    files: Vec<GeneratedFile>,
    stdout: String,
    stderr: String,
    language: Language,
    outcome: &DispatchOutcome,
) -> ExecResponse {
    let mut has_state = false;
    let mut state_size = None;
    let mut state_hash = None;

    if language.supports_state() {
        if let Some(new_state) = &outcome.new_state {
            has_state = true;
            match base64::engine::general_purpose::STANDARD.decode(new_state.as_bytes()) {
                Ok(raw) => {
                    state_size = Some(raw.len() as u64);
                    state_hash = Some(state_hash_hex(&raw));
                }
                Err(_) => {
                    state_size = Some(new_state.len() as u64);
                }
            }
        }
    }

    ExecResponse {
        session_id: session_id.to_string(),
        files,
        stdout,
        stderr,
        has_state,
        state_size,
        state_hash,
    }
}

fn svc_err(e: StoreError) -> ApiError {
    ApiError::unavailable(
        "Code Execution",
        format!("Unexpected error during code execution: {e}"),
    )
}

/// Spawns sandbox destruction if the request future is dropped before the
/// cleanup step runs.
struct HandleGuard {
    backend: Arc<dyn ExecutionBackend>,
    handle: Option<runcell_sandbox::SandboxHandle>,
}

impl HandleGuard {
    fn disarm(&mut self) -> Option<runcell_sandbox::SandboxHandle> {
        self.handle.take()
    }
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else { return };
        let backend = Arc::clone(&self.backend);
        if let Ok(rt) = tokio::runtime::Handle::try_current() {
            tracing::warn!(sandbox = handle.name, "request cancelled, destroying handle");
            rt.spawn(async move {
                backend.destroy_handle(&handle).await;
            });
        }
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
