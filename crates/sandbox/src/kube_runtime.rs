// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kubernetes implementation of [`SandboxRuntime`].
//!
//! Uses in-cluster configuration when running inside a pod, falling back
//! to the local kubeconfig. An unreachable cluster does not fail
//! construction; the runtime reports `is_available() == false` and the
//! dispatcher degrades gracefully.

use crate::error::SandboxError;
use crate::handle::SandboxSpec;
use crate::runtime::{JobPodStatus, RuntimePhase, RuntimeStatus, SandboxRuntime};
use crate::spec::{build_job, build_pod};
use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::Client;
use std::collections::BTreeMap;

const SERVICE_ACCOUNT_NAMESPACE: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// Resolve the namespace sandboxes run in: explicit value, `NAMESPACE` /
/// `POD_NAMESPACE` env, the mounted service account, then `default`.
pub fn resolve_namespace(explicit: Option<String>) -> String {
    if let Some(ns) = explicit.filter(|ns| !ns.is_empty()) {
        return ns;
    }
    for var in ["NAMESPACE", "POD_NAMESPACE"] {
        if let Ok(ns) = std::env::var(var) {
            if !ns.is_empty() {
                return ns;
            }
        }
    }
    if let Ok(ns) = std::fs::read_to_string(SERVICE_ACCOUNT_NAMESPACE) {
        let ns = ns.trim();
        if !ns.is_empty() {
            return ns.to_string();
        }
    }
    "default".to_string()
}

/// Kubernetes-backed sandbox runtime.
#[derive(Clone)]
pub struct KubeRuntime {
    client: Option<Client>,
    namespace: String,
    init_error: Option<String>,
}

impl KubeRuntime {
    /// Connect to the cluster. Never fails; connection problems surface
    /// through [`SandboxRuntime::is_available`].
    pub async fn connect(namespace: Option<String>) -> Self {
        let namespace = resolve_namespace(namespace);
        match Client::try_default().await {
            Ok(client) => {
                tracing::info!(namespace, "kubernetes client initialized");
                Self { client: Some(client), namespace, init_error: None }
            }
            Err(e) => {
                let message = format!("failed to create kubernetes client: {e}");
                tracing::error!(error = %e, "kubernetes unavailable");
                Self { client: None, namespace, init_error: Some(message) }
            }
        }
    }

    fn client(&self) -> Result<&Client, SandboxError> {
        self.client.as_ref().ok_or_else(|| {
            SandboxError::RuntimeUnavailable(
                self.init_error.clone().unwrap_or_else(|| "no client".to_string()),
            )
        })
    }

    fn pods(&self) -> Result<Api<Pod>, SandboxError> {
        Ok(Api::namespaced(self.client()?.clone(), &self.namespace))
    }

    fn jobs(&self) -> Result<Api<Job>, SandboxError> {
        Ok(Api::namespaced(self.client()?.clone(), &self.namespace))
    }
}

fn pod_status(pod: &Pod) -> RuntimeStatus {
    let status = pod.status.as_ref();
    let phase = status
        .and_then(|s| s.phase.as_deref())
        .map(RuntimePhase::parse)
        .unwrap_or(RuntimePhase::Unknown);
    let pod_ip = status.and_then(|s| s.pod_ip.clone()).filter(|ip| !ip.is_empty());
    let sidecar_ready = status
        .and_then(|s| s.container_statuses.as_ref())
        .map(|cs| cs.iter().any(|c| c.name == "sidecar" && c.ready))
        .unwrap_or(false);
    RuntimeStatus { phase, pod_ip, sidecar_ready }
}

/// Treat 404 as success so deletes are idempotent.
fn ignore_not_found(result: Result<(), kube::Error>) -> Result<(), SandboxError> {
    match result {
        Ok(()) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl SandboxRuntime for KubeRuntime {
    fn is_available(&self) -> bool {
        self.client.is_some()
    }

    fn init_error(&self) -> Option<String> {
        self.init_error.clone()
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn create_sandbox(
        &self,
        name: &str,
        spec: &SandboxSpec,
        labels: &BTreeMap<String, String>,
    ) -> Result<String, SandboxError> {
        let manifest = build_pod(name, &self.namespace, spec, labels);
        let pod = self
            .pods()?
            .create(&PostParams::default(), &manifest)
            .await
            .map_err(|e| SandboxError::SpawnFailed(format!("pod creation failed: {e}")))?;
        Ok(pod.metadata.uid.unwrap_or_else(|| name.to_string()))
    }

    async fn sandbox_status(&self, name: &str) -> Result<RuntimeStatus, SandboxError> {
        let pod = self.pods()?.get(name).await.map_err(|e| match e {
            kube::Error::Api(ae) if ae.code == 404 => SandboxError::NotFound(name.to_string()),
            other => other.into(),
        })?;
        Ok(pod_status(&pod))
    }

    async fn delete_sandbox(&self, name: &str) -> Result<(), SandboxError> {
        ignore_not_found(
            self.pods()?
                .delete(name, &DeleteParams::default())
                .await
                .map(|_| ()),
        )
    }

    async fn create_job(
        &self,
        name: &str,
        spec: &SandboxSpec,
        labels: &BTreeMap<String, String>,
        ttl_seconds_after_finished: i64,
        active_deadline_seconds: i64,
    ) -> Result<String, SandboxError> {
        let manifest = build_job(
            name,
            &self.namespace,
            spec,
            labels,
            ttl_seconds_after_finished,
            active_deadline_seconds,
        );
        let job = self
            .jobs()?
            .create(&PostParams::default(), &manifest)
            .await
            .map_err(|e| SandboxError::SpawnFailed(format!("job creation failed: {e}")))?;
        Ok(job.metadata.uid.unwrap_or_else(|| name.to_string()))
    }

    async fn job_pod_status(&self, job_name: &str) -> Result<Option<JobPodStatus>, SandboxError> {
        let lp = ListParams::default().labels(&format!("job-name={job_name}"));
        let pods = self.pods()?.list(&lp).await?;
        let Some(pod) = pods.items.first() else { return Ok(None) };
        let status = pod_status(pod);
        let pod_name = pod.metadata.name.clone().unwrap_or_default();
        Ok(Some(JobPodStatus {
            pod_name,
            pod_ip: status.pod_ip,
            phase: status.phase,
            sidecar_ready: status.sidecar_ready,
        }))
    }

    async fn delete_job(&self, name: &str) -> Result<(), SandboxError> {
        ignore_not_found(
            self.jobs()?
                .delete(name, &DeleteParams::background())
                .await
                .map(|_| ()),
        )
    }
}
