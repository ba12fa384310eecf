// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake sandbox runtime for tests.
//!
//! Records every create/delete and lets tests control pod readiness,
//! reported IPs, and creation failures. Shared by the pool, job executor,
//! and dispatcher tests.

use crate::error::SandboxError;
use crate::handle::SandboxSpec;
use crate::runtime::{JobPodStatus, RuntimePhase, RuntimeStatus, SandboxRuntime};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Default)]
struct FakeState {
    sandboxes: BTreeMap<String, RuntimeStatus>,
    jobs: BTreeMap<String, Option<JobPodStatus>>,
    deleted_sandboxes: Vec<String>,
    deleted_jobs: Vec<String>,
}

/// Controllable in-memory [`SandboxRuntime`].
pub struct FakeRuntime {
    namespace: String,
    available: AtomicBool,
    fail_creates: AtomicBool,
    ready_immediately: AtomicBool,
    pod_ip: Mutex<String>,
    uid_counter: AtomicUsize,
    state: Mutex<FakeState>,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            namespace: "test".to_string(),
            available: AtomicBool::new(true),
            fail_creates: AtomicBool::new(false),
            ready_immediately: AtomicBool::new(true),
            pod_ip: Mutex::new("127.0.0.1".to_string()),
            uid_counter: AtomicUsize::new(0),
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    /// When false, new sandboxes/jobs report `Pending` with no IP until
    /// [`FakeRuntime::mark_ready`] is called.
    pub fn set_ready_immediately(&self, ready: bool) {
        self.ready_immediately.store(ready, Ordering::SeqCst);
    }

    /// IP reported for new pods. Tests point this at a local stub server.
    pub fn set_pod_ip(&self, ip: impl Into<String>) {
        *self.pod_ip.lock() = ip.into();
    }

    pub fn mark_ready(&self, name: &str) {
        let ip = self.pod_ip.lock().clone();
        let mut state = self.state.lock();
        if let Some(status) = state.sandboxes.get_mut(name) {
            status.phase = RuntimePhase::Running;
            status.pod_ip = Some(ip.clone());
            status.sidecar_ready = true;
        }
        if let Some(job) = state.jobs.get_mut(name) {
            *job = Some(JobPodStatus {
                pod_name: format!("{name}-pod"),
                pod_ip: Some(ip),
                phase: RuntimePhase::Running,
                sidecar_ready: true,
            });
        }
    }

    pub fn mark_unhealthy(&self, name: &str) {
        let mut state = self.state.lock();
        if let Some(status) = state.sandboxes.get_mut(name) {
            status.phase = RuntimePhase::Failed;
            status.sidecar_ready = false;
        }
    }

    pub fn sandbox_names(&self) -> Vec<String> {
        self.state.lock().sandboxes.keys().cloned().collect()
    }

    pub fn sandbox_count(&self) -> usize {
        self.state.lock().sandboxes.len()
    }

    pub fn deleted_sandboxes(&self) -> Vec<String> {
        self.state.lock().deleted_sandboxes.clone()
    }

    pub fn job_names(&self) -> Vec<String> {
        self.state.lock().jobs.keys().cloned().collect()
    }

    pub fn deleted_jobs(&self) -> Vec<String> {
        self.state.lock().deleted_jobs.clone()
    }

    fn next_uid(&self) -> String {
        format!("uid-{}", self.uid_counter.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl SandboxRuntime for FakeRuntime {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn init_error(&self) -> Option<String> {
        (!self.is_available()).then(|| "fake runtime marked unavailable".to_string())
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn create_sandbox(
        &self,
        name: &str,
        _spec: &SandboxSpec,
        _labels: &BTreeMap<String, String>,
    ) -> Result<String, SandboxError> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(SandboxError::SpawnFailed("fake create failure".into()));
        }
        let ready = self.ready_immediately.load(Ordering::SeqCst);
        let status = if ready {
            RuntimeStatus {
                phase: RuntimePhase::Running,
                pod_ip: Some(self.pod_ip.lock().clone()),
                sidecar_ready: true,
            }
        } else {
            RuntimeStatus { phase: RuntimePhase::Pending, pod_ip: None, sidecar_ready: false }
        };
        self.state.lock().sandboxes.insert(name.to_string(), status);
        Ok(self.next_uid())
    }

    async fn sandbox_status(&self, name: &str) -> Result<RuntimeStatus, SandboxError> {
        self.state
            .lock()
            .sandboxes
            .get(name)
            .cloned()
            .ok_or_else(|| SandboxError::NotFound(name.to_string()))
    }

    async fn delete_sandbox(&self, name: &str) -> Result<(), SandboxError> {
        let mut state = self.state.lock();
        state.sandboxes.remove(name);
        state.deleted_sandboxes.push(name.to_string());
        Ok(())
    }

    async fn create_job(
        &self,
        name: &str,
        _spec: &SandboxSpec,
        _labels: &BTreeMap<String, String>,
        _ttl_seconds_after_finished: i64,
        _active_deadline_seconds: i64,
    ) -> Result<String, SandboxError> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(SandboxError::SpawnFailed("fake create failure".into()));
        }
        let pod = self.ready_immediately.load(Ordering::SeqCst).then(|| JobPodStatus {
            pod_name: format!("{name}-pod"),
            pod_ip: Some(self.pod_ip.lock().clone()),
            phase: RuntimePhase::Running,
            sidecar_ready: true,
        });
        self.state.lock().jobs.insert(name.to_string(), pod);
        Ok(self.next_uid())
    }

    async fn job_pod_status(&self, job_name: &str) -> Result<Option<JobPodStatus>, SandboxError> {
        Ok(self.state.lock().jobs.get(job_name).cloned().flatten())
    }

    async fn delete_job(&self, name: &str) -> Result<(), SandboxError> {
        let mut state = self.state.lock();
        state.jobs.remove(name);
        state.deleted_jobs.push(name.to_string());
        Ok(())
    }
}
