// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-shot job execution for cold-path languages.
//!
//! Languages without a warm pool get a Kubernetes Job per request: create
//! the job, wait for its pod's sidecar, upload files, execute, and delete
//! the job in the background (the job's TTL-after-finished is the safety
//! net if that delete never lands).

use crate::handle::{job_name, JobHandle, SandboxSpec};
use crate::runtime::{RuntimePhase, SandboxRuntime};
use crate::sidecar::{ExecutePayload, SidecarClient, SidecarResult};
use crate::spec::base_labels;
use runcell_core::{ExecutionId, SessionId};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// TTL for finished jobs; the runtime reaps anything the background
/// delete misses.
pub const JOB_TTL_AFTER_FINISHED_SECS: i64 = 60;
/// Absolute wall-clock ceiling for one job.
pub const JOB_ACTIVE_DEADLINE_SECS: i64 = 300;

/// Window and interval for the job pod to appear and report ready.
#[derive(Debug, Clone)]
pub struct JobTimings {
    pub ready_poll_interval: Duration,
    pub ready_timeout: Duration,
}

impl Default for JobTimings {
    fn default() -> Self {
        Self {
            ready_poll_interval: Duration::from_millis(500),
            ready_timeout: Duration::from_secs(60),
        }
    }
}

/// Executes snippets through one-shot jobs.
pub struct JobExecutor<R: SandboxRuntime> {
    runtime: Arc<R>,
    sidecar: SidecarClient,
    timings: JobTimings,
    ttl_seconds_after_finished: i64,
    active_deadline_seconds: i64,
}

impl<R: SandboxRuntime + 'static> JobExecutor<R> {
    pub fn new(runtime: Arc<R>) -> Self {
        Self::with_timings(runtime, JobTimings::default())
    }

    pub fn with_timings(runtime: Arc<R>, timings: JobTimings) -> Self {
        Self {
            runtime,
            sidecar: SidecarClient::new(),
            timings,
            ttl_seconds_after_finished: JOB_TTL_AFTER_FINISHED_SECS,
            active_deadline_seconds: JOB_ACTIVE_DEADLINE_SECS,
        }
    }

    /// Create a job, wait for readiness, upload files, execute, and
    /// schedule the job's deletion. The returned result is synthesized on
    /// any failure to start.
    pub async fn execute_one(
        &self,
        spec: &SandboxSpec,
        session_id: &SessionId,
        payload: &ExecutePayload,
        files: &[(String, Vec<u8>)],
        execution_id: &ExecutionId,
    ) -> SidecarResult {
        let name = job_name(spec.language, session_id);
        let mut labels = base_labels(spec.language.as_str(), "job");
        labels.insert("runcell.io/session-id".to_string(), session_id.to_string());

        let uid = match self
            .runtime
            .create_job(
                &name,
                spec,
                &labels,
                self.ttl_seconds_after_finished,
                self.active_deadline_seconds,
            )
            .await
        {
            Ok(uid) => uid,
            Err(e) => {
                tracing::error!(job = name, error = %e, "failed to create execution job");
                return SidecarResult::failure(format!("Failed to create job: {e}"));
            }
        };

        tracing::info!(
            job = name,
            language = %spec.language,
            session_id = %session_id.short(12),
            "created execution job"
        );

        let mut handle = JobHandle {
            name: name.clone(),
            namespace: self.runtime.namespace().to_string(),
            uid,
            language: spec.language,
            session_id: *session_id,
            pod_name: None,
            pod_ip: None,
            sidecar_port: spec.sidecar_port,
        };

        let result = match self.wait_for_pod_ready(&mut handle).await {
            true => {
                tracing::info!(
                    job = name,
                    pod = handle.pod_name.as_deref().unwrap_or(""),
                    pod_ip = handle.pod_ip.as_deref().unwrap_or(""),
                    "job pod ready, starting execution"
                );
                match handle.sidecar_url() {
                    Some(url) => {
                        self.sidecar
                            .upload_and_execute(&url, payload, files, execution_id)
                            .await
                    }
                    None => SidecarResult::failure("Job sidecar URL not available"),
                }
            }
            false => SidecarResult::failure("Job pod failed to start"),
        };

        // Background deletion; TTL-after-finished covers a missed delete.
        let runtime = Arc::clone(&self.runtime);
        let job = name.clone();
        tokio::spawn(async move {
            if let Err(e) = runtime.delete_job(&job).await {
                tracing::warn!(job, error = %e, "failed to delete job");
            }
        });

        tracing::info!(
            job = name,
            exit_code = result.exit_code,
            stdout_len = result.stdout.len(),
            stderr_len = result.stderr.len(),
            "job execution completed"
        );
        result
    }

    async fn wait_for_pod_ready(&self, handle: &mut JobHandle) -> bool {
        let deadline = Instant::now() + self.timings.ready_timeout;
        loop {
            match self.runtime.job_pod_status(&handle.name).await {
                Ok(Some(status)) => {
                    handle.pod_name = Some(status.pod_name);
                    handle.pod_ip = status.pod_ip;
                    match status.phase {
                        RuntimePhase::Running if status.sidecar_ready => {
                            if handle.pod_ip.is_some() {
                                return true;
                            }
                        }
                        RuntimePhase::Failed | RuntimePhase::Succeeded => {
                            tracing::warn!(job = handle.name, "job pod reached terminal phase before execute");
                            return false;
                        }
                        _ => {}
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(job = handle.name, error = %e, "error checking job pod status");
                }
            }
            if Instant::now() >= deadline {
                tracing::warn!(job = handle.name, "timeout waiting for job pod");
                return false;
            }
            tokio::time::sleep(self.timings.ready_poll_interval).await;
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
