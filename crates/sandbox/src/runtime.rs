// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime abstraction for sandbox lifecycle.
//!
//! The pool, job executor, and dispatcher talk to this trait; the
//! production implementation is [`crate::kube_runtime::KubeRuntime`] and
//! tests use [`crate::fake::FakeRuntime`].

use crate::error::SandboxError;
use crate::handle::SandboxSpec;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Coarse pod phase as reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimePhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl RuntimePhase {
    pub fn parse(s: &str) -> Self {
        match s {
            "Pending" => RuntimePhase::Pending,
            "Running" => RuntimePhase::Running,
            "Succeeded" => RuntimePhase::Succeeded,
            "Failed" => RuntimePhase::Failed,
            _ => RuntimePhase::Unknown,
        }
    }
}

/// Point-in-time status of a sandbox pod.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeStatus {
    pub phase: RuntimePhase,
    pub pod_ip: Option<String>,
    pub sidecar_ready: bool,
}

/// Status of the pod backing a job, once it exists.
#[derive(Debug, Clone, PartialEq)]
pub struct JobPodStatus {
    pub pod_name: String,
    pub pod_ip: Option<String>,
    pub phase: RuntimePhase,
    pub sidecar_ready: bool,
}

/// Sandbox lifecycle operations against the orchestrated runtime.
///
/// Deletions are idempotent: deleting a missing resource succeeds.
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    /// Whether the runtime is reachable at all. When false, the dispatcher
    /// short-circuits with a failed execution instead of erroring.
    fn is_available(&self) -> bool;

    /// Human-readable reason the runtime is unavailable, if known.
    fn init_error(&self) -> Option<String> {
        None
    }

    /// Namespace sandboxes are created in.
    fn namespace(&self) -> &str;

    /// Create a sandbox pod. Returns the runtime-assigned uid.
    async fn create_sandbox(
        &self,
        name: &str,
        spec: &SandboxSpec,
        labels: &BTreeMap<String, String>,
    ) -> Result<String, SandboxError>;

    async fn sandbox_status(&self, name: &str) -> Result<RuntimeStatus, SandboxError>;

    async fn delete_sandbox(&self, name: &str) -> Result<(), SandboxError>;

    /// Create a one-shot job wrapping the sandbox pod template.
    async fn create_job(
        &self,
        name: &str,
        spec: &SandboxSpec,
        labels: &BTreeMap<String, String>,
        ttl_seconds_after_finished: i64,
        active_deadline_seconds: i64,
    ) -> Result<String, SandboxError>;

    /// Status of the job's pod, or `None` while it has not been scheduled.
    async fn job_pod_status(&self, job_name: &str) -> Result<Option<JobPodStatus>, SandboxError>;

    /// Delete a job with background propagation.
    async fn delete_job(&self, name: &str) -> Result<(), SandboxError>;
}
