// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sandbox handles and creation specs.

use chrono::{DateTime, Utc};
use runcell_core::{Language, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default port the sidecar listens on inside every sandbox.
pub const SIDECAR_PORT: u16 = 8080;

/// Status of a sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxStatus {
    Pending,
    /// Ready in the pool, waiting for work.
    Warm,
    /// Currently bound to a session and running code.
    Executing,
    Succeeded,
    Failed,
    Unknown,
}

impl SandboxStatus {
    /// Terminal sandboxes must be destroyed, never reused.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SandboxStatus::Succeeded | SandboxStatus::Failed)
    }
}

/// Handle to a live sandbox.
///
/// Invariants: a `Warm` handle holds no session binding; an `Executing`
/// handle holds exactly one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxHandle {
    /// Unique id assigned by the runtime.
    pub uid: String,
    pub name: String,
    pub namespace: String,
    pub language: Language,
    pub status: SandboxStatus,
    /// Routable address of the pod, once assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_ip: Option<String>,
    pub sidecar_port: u16,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl SandboxHandle {
    pub fn new(
        uid: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
        language: Language,
        labels: BTreeMap<String, String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            uid: uid.into(),
            name: name.into(),
            namespace: namespace.into(),
            language,
            status: SandboxStatus::Pending,
            pod_ip: None,
            sidecar_port: SIDECAR_PORT,
            created_at,
            session_id: None,
            labels,
        }
    }

    /// Base URL of the sidecar HTTP API, once the pod has an address.
    pub fn sidecar_url(&self) -> Option<String> {
        self.pod_ip
            .as_ref()
            .map(|ip| format!("http://{ip}:{}", self.sidecar_port))
    }
}

/// A sandbox tracked by a warm pool, with pool bookkeeping.
#[derive(Debug, Clone)]
pub struct PooledSandbox {
    pub handle: SandboxHandle,
    pub acquired: bool,
    pub acquired_at_ms: Option<u64>,
    pub health_check_failures: u32,
}

impl PooledSandbox {
    pub fn new(handle: SandboxHandle) -> Self {
        Self { handle, acquired: false, acquired_at_ms: None, health_check_failures: 0 }
    }

    /// is_available ⇔ ¬acquired ∧ status = warm
    pub fn is_available(&self) -> bool {
        !self.acquired && self.handle.status == SandboxStatus::Warm
    }
}

/// Handle to a one-shot execution job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub name: String,
    pub namespace: String,
    pub uid: String,
    pub language: Language,
    pub session_id: SessionId,
    pub pod_name: Option<String>,
    pub pod_ip: Option<String>,
    pub sidecar_port: u16,
}

impl JobHandle {
    pub fn sidecar_url(&self) -> Option<String> {
        self.pod_ip.as_ref().map(|ip| format!("http://{ip}:{}", self.sidecar_port))
    }
}

/// Everything needed to build one sandbox pod.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxSpec {
    pub language: Language,
    pub image: String,
    pub sidecar_image: String,

    pub cpu_limit: String,
    pub memory_limit: String,
    pub cpu_request: String,
    pub memory_request: String,

    // User code runs in the sidecar's cgroup (it is exec'd through the
    // sidecar's namespace-entering call), so these are the limits that
    // actually bind user code.
    pub sidecar_cpu_limit: String,
    pub sidecar_memory_limit: String,
    pub sidecar_cpu_request: String,
    pub sidecar_memory_request: String,

    pub run_as_user: i64,
    pub sidecar_port: u16,
    pub image_pull_policy: String,
    pub seccomp_profile: String,
    pub volume_size_limit: String,
    pub hostname: String,
    /// Host-identifying files covered with empty mounts.
    pub masked_paths: Vec<String>,
    /// Outbound network access for the sandbox. When enabled, DNS is
    /// pinned to public resolvers with no search domains.
    pub network_enabled: bool,
    pub dns_nameservers: Vec<String>,
}

impl SandboxSpec {
    pub fn new(language: Language, image: impl Into<String>, sidecar_image: impl Into<String>) -> Self {
        Self {
            language,
            image: image.into(),
            sidecar_image: sidecar_image.into(),
            cpu_limit: "1".into(),
            memory_limit: "512Mi".into(),
            cpu_request: "100m".into(),
            memory_request: "128Mi".into(),
            sidecar_cpu_limit: "500m".into(),
            sidecar_memory_limit: "512Mi".into(),
            sidecar_cpu_request: "100m".into(),
            sidecar_memory_request: "256Mi".into(),
            run_as_user: 65532,
            sidecar_port: SIDECAR_PORT,
            image_pull_policy: "Always".into(),
            seccomp_profile: "RuntimeDefault".into(),
            volume_size_limit: "1Gi".into(),
            hostname: "sandbox".into(),
            masked_paths: vec!["/proc/version".into(), "/etc/machine-id".into()],
            network_enabled: false,
            dns_nameservers: vec!["1.1.1.1".into(), "8.8.8.8".into()],
        }
    }
}

/// Pool configuration for one language. A size of 0 disables the pool and
/// routes every execution through the job executor.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub pool_size: usize,
    pub spec: SandboxSpec,
}

impl PoolConfig {
    pub fn uses_pool(&self) -> bool {
        self.pool_size > 0
    }
}

fn short_hex() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

/// Pod name for a pooled sandbox: `pool-<lang>-<8hex>`.
pub fn pool_sandbox_name(language: Language) -> String {
    format!("pool-{language}-{}", short_hex())
}

/// Job name for a one-shot execution: `exec-<lang>-<session12>-<8hex>`,
/// lowercased and hyphenated to satisfy DNS-1123 (≤ 63 chars).
pub fn job_name(language: Language, session_id: &SessionId) -> String {
    let safe_session = session_id.short(12).to_ascii_lowercase().replace('_', "-");
    let name = format!("exec-{language}-{safe_session}-{}", short_hex());
    name.chars().take(63).collect()
}

#[cfg(test)]
#[path = "handle_tests.rs"]
mod tests;
