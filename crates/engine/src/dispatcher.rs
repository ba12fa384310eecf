// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution dispatcher — decides where each execution runs.
//!
//! Pooled languages go through warm-pool acquisition with a 10 s wait and
//! fall back to a one-shot job on exhaustion; everything else goes
//! straight to the job executor. The sidecar result is normalized into an
//! [`ExecutionRecord`] here, including the exit-code → status mapping
//! (0 = completed, 124 = timeout, anything else = failed).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use runcell_core::{
    Event, ExecutionId, ExecutionOutput, ExecutionRecord, ExecutionStatus, FreshSandboxReason,
    Language, SessionId,
};
use runcell_sandbox::{
    ExecutePayload, JobExecutor, PoolManager, PoolStats, SandboxHandle, SandboxRuntime,
    SandboxSpec, SidecarClient, SidecarFile, SidecarResult,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// How an execution got its sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecSource {
    PoolHit,
    PoolMiss,
    Job,
}

impl ExecSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecSource::PoolHit => "pool_hit",
            ExecSource::PoolMiss => "pool_miss",
            ExecSource::Job => "job",
        }
    }
}

/// One execution request as seen by the dispatcher. Language validation
/// and alias normalization already happened at the boundary.
#[derive(Debug, Clone)]
pub struct ExecuteCodeRequest {
    pub execution_id: ExecutionId,
    pub session_id: SessionId,
    pub code: String,
    pub language: Language,
    pub timeout_secs: u64,
    /// Files to place in `/mnt/data` before running, `(filename, bytes)`.
    pub files: Vec<(String, Vec<u8>)>,
    pub initial_state: Option<String>,
    pub capture_state: bool,
}

/// Everything the orchestrator needs back from one dispatch.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub record: ExecutionRecord,
    /// The pool handle when one was used. The caller owns it and must
    /// destroy it; job sandboxes clean themselves up.
    pub handle: Option<SandboxHandle>,
    pub new_state: Option<String>,
    pub state_errors: Option<Vec<String>>,
    pub source: ExecSource,
}

/// Seam between the orchestrator and the sandbox layer.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    fn is_available(&self) -> bool;

    /// Run one snippet. Never errors: failures come back as a failed
    /// execution record.
    async fn execute_code(&self, request: ExecuteCodeRequest) -> DispatchOutcome;

    /// Destroy a handle returned by [`ExecutionBackend::execute_code`].
    async fn destroy_handle(&self, handle: &SandboxHandle);

    /// Read a generated file out of the sandbox before it is destroyed.
    async fn fetch_file(&self, handle: &SandboxHandle, path: &str) -> Option<Vec<u8>>;

    fn pool_stats(&self) -> HashMap<Language, PoolStats>;
}

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub sidecar_image: String,
    /// Image per language for non-pooled languages. Pooled languages use
    /// their pool's spec.
    pub images: HashMap<Language, String>,
    pub acquire_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            sidecar_image: "runcell/sidecar:latest".to_string(),
            images: HashMap::new(),
            acquire_timeout: runcell_sandbox::pool::ACQUIRE_TIMEOUT,
        }
    }
}

impl DispatcherConfig {
    pub fn image_for(&self, language: Language) -> String {
        self.images
            .get(&language)
            .cloned()
            .unwrap_or_else(|| format!("runcell/{language}:latest"))
    }
}

/// The production [`ExecutionBackend`].
pub struct ExecutionDispatcher<R: SandboxRuntime + 'static> {
    runtime: Arc<R>,
    pools: Arc<PoolManager<R>>,
    jobs: JobExecutor<R>,
    sidecar: SidecarClient,
    config: DispatcherConfig,
    event_tx: Option<mpsc::UnboundedSender<Event>>,
}

impl<R: SandboxRuntime + 'static> ExecutionDispatcher<R> {
    pub fn new(
        runtime: Arc<R>,
        pools: Arc<PoolManager<R>>,
        jobs: JobExecutor<R>,
        config: DispatcherConfig,
        event_tx: Option<mpsc::UnboundedSender<Event>>,
    ) -> Self {
        Self {
            runtime,
            pools,
            jobs,
            sidecar: SidecarClient::new(),
            config,
            event_tx,
        }
    }

    pub fn pools(&self) -> &Arc<PoolManager<R>> {
        &self.pools
    }

    fn emit(&self, event: Event) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }

    fn spec_for(&self, language: Language) -> SandboxSpec {
        match self.pools.config(language) {
            Some(config) => config.spec.clone(),
            None => SandboxSpec::new(
                language,
                self.config.image_for(language),
                self.config.sidecar_image.clone(),
            ),
        }
    }

    fn payload_for(request: &ExecuteCodeRequest) -> ExecutePayload {
        let mut payload = ExecutePayload::new(request.code.clone(), request.timeout_secs);
        payload.initial_state = request.initial_state.clone();
        payload.capture_state = request.capture_state.then_some(true);
        payload
    }

    async fn execute_pooled(
        &self,
        request: &ExecuteCodeRequest,
        handle: SandboxHandle,
        started_at: DateTime<Utc>,
    ) -> DispatchOutcome {
        // From here until the outcome is handed back, a cancelled request
        // must still destroy the acquired sandbox.
        let mut guard = HandleGuard::new(Arc::clone(&self.pools), handle.clone());

        let payload = Self::payload_for(request);
        let result = self
            .pools
            .execute(&handle, &payload, &request.files, &request.execution_id)
            .await;

        // Only the pool path can surface generated files: a job's pod is
        // already being torn down by the time its result returns.
        let listed = match handle.sidecar_url() {
            Some(url) => self.sidecar.list_files(&url).await,
            None => Vec::new(),
        };

        let record = build_record(request, started_at, &result, &listed);
        guard.disarm();
        DispatchOutcome {
            record,
            handle: Some(handle),
            new_state: result.state,
            state_errors: result.state_errors,
            source: ExecSource::PoolHit,
        }
    }

    async fn execute_job(
        &self,
        request: &ExecuteCodeRequest,
        started_at: DateTime<Utc>,
        source: ExecSource,
    ) -> DispatchOutcome {
        let spec = self.spec_for(request.language);
        let payload = Self::payload_for(request);
        let result = self
            .jobs
            .execute_one(
                &spec,
                &request.session_id,
                &payload,
                &request.files,
                &request.execution_id,
            )
            .await;
        let record = build_record(request, started_at, &result, &[]);
        DispatchOutcome {
            record,
            handle: None,
            new_state: result.state,
            state_errors: result.state_errors,
            source,
        }
    }
}

#[async_trait]
impl<R: SandboxRuntime + 'static> ExecutionBackend for ExecutionDispatcher<R> {
    fn is_available(&self) -> bool {
        self.runtime.is_available()
    }

    async fn execute_code(&self, request: ExecuteCodeRequest) -> DispatchOutcome {
        let started_at = Utc::now();
        self.emit(Event::ExecutionStarted {
            execution_id: request.execution_id,
            session_id: request.session_id,
            language: request.language,
        });

        if !self.runtime.is_available() {
            let reason = self
                .runtime
                .init_error()
                .unwrap_or_else(|| "runtime unavailable".to_string());
            tracing::error!(reason, "execution refused: runtime unavailable");
            let result = SidecarResult::failure(format!("Code execution runtime unavailable: {reason}"));
            let record = build_record(&request, started_at, &result, &[]);
            return DispatchOutcome {
                record,
                handle: None,
                new_state: None,
                state_errors: None,
                source: ExecSource::Job,
            };
        }

        if self.pools.uses_pool(request.language) {
            let acquire_started = Instant::now();
            match self
                .pools
                .acquire(request.language, &request.session_id, self.config.acquire_timeout)
                .await
            {
                Some(handle) => {
                    self.emit(Event::SandboxAcquiredFromPool {
                        name: handle.name.clone(),
                        session_id: request.session_id,
                        language: request.language,
                        acquire_time_ms: acquire_started.elapsed().as_millis() as u64,
                    });
                    return self.execute_pooled(&request, handle, started_at).await;
                }
                None => {
                    tracing::warn!(
                        language = %request.language,
                        session_id = %request.session_id.short(12),
                        "failed to acquire sandbox from pool"
                    );
                    self.emit(Event::PoolExhausted {
                        language: request.language,
                        session_id: request.session_id,
                    });
                    self.emit(Event::SandboxCreatedFresh {
                        session_id: request.session_id,
                        language: request.language,
                        reason: FreshSandboxReason::PoolEmpty,
                    });
                    return self.execute_job(&request, started_at, ExecSource::PoolMiss).await;
                }
            }
        }

        let reason = match self.pools.config(request.language) {
            Some(_) => FreshSandboxReason::PoolDisabled,
            None => FreshSandboxReason::LanguageNotPooled,
        };
        self.emit(Event::SandboxCreatedFresh {
            session_id: request.session_id,
            language: request.language,
            reason,
        });
        self.execute_job(&request, started_at, ExecSource::Job).await
    }

    async fn destroy_handle(&self, handle: &SandboxHandle) {
        self.pools.release(handle, true).await;
    }

    async fn fetch_file(&self, handle: &SandboxHandle, path: &str) -> Option<Vec<u8>> {
        let url = handle.sidecar_url()?;
        self.sidecar.read_file(&url, path).await
    }

    fn pool_stats(&self) -> HashMap<Language, PoolStats> {
        self.pools.stats()
    }
}

/// Destroys an in-flight pool handle if the dispatch future is dropped
/// (client disconnect, request cancellation) before completing.
struct HandleGuard<R: SandboxRuntime + 'static> {
    pools: Arc<PoolManager<R>>,
    handle: Option<SandboxHandle>,
}

impl<R: SandboxRuntime + 'static> HandleGuard<R> {
    fn new(pools: Arc<PoolManager<R>>, handle: SandboxHandle) -> Self {
        Self { pools, handle: Some(handle) }
    }

    fn disarm(&mut self) {
        self.handle = None;
    }
}

impl<R: SandboxRuntime + 'static> Drop for HandleGuard<R> {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else { return };
        let pools = Arc::clone(&self.pools);
        if let Ok(rt) = tokio::runtime::Handle::try_current() {
            tracing::warn!(sandbox = handle.name, "dispatch cancelled, destroying handle");
            rt.spawn(async move {
                pools.release(&handle, true).await;
            });
        }
    }
}

/// Map one sidecar result into an execution record.
pub fn build_record(
    request: &ExecuteCodeRequest,
    started_at: DateTime<Utc>,
    result: &SidecarResult,
    generated: &[SidecarFile],
) -> ExecutionRecord {
    let status = match result.exit_code {
        0 => ExecutionStatus::Completed,
        124 => ExecutionStatus::Timeout,
        _ => ExecutionStatus::Failed,
    };

    let mut outputs = Vec::new();
    let stdout = result.stdout.trim();
    if !stdout.is_empty() {
        outputs.push(ExecutionOutput::stdout(stdout));
    }
    let stderr = result.stderr.trim();
    if !stderr.is_empty() {
        outputs.push(ExecutionOutput::stderr(stderr));
    }
    for file in generated {
        outputs.push(ExecutionOutput::file(file.path.clone(), Some(file.size)));
    }

    let error_message = match status {
        ExecutionStatus::Timeout => Some(if stderr.is_empty() {
            format!("Execution timed out after {} seconds", request.timeout_secs)
        } else {
            stderr.to_string()
        }),
        ExecutionStatus::Failed => Some(if stderr.is_empty() {
            format!("Execution failed with exit code {}", result.exit_code)
        } else {
            stderr.to_string()
        }),
        _ => None,
    };

    ExecutionRecord {
        execution_id: request.execution_id,
        session_id: request.session_id,
        code: request.code.clone(),
        language: request.language,
        status,
        created_at: started_at,
        started_at: Some(started_at),
        completed_at: Some(Utc::now()),
        outputs,
        exit_code: Some(result.exit_code),
        error_message,
        execution_time_ms: Some(result.execution_time_ms),
        memory_peak_mb: None,
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
