// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pod and Job manifest construction for sandboxes.
//!
//! Every sandbox is a two-container pod: `main` runs the language runtime,
//! `sidecar` runs the HTTP API that executes snippets inside `main`'s
//! namespaces. The containers share one size-bounded writable volume at
//! `/mnt/data` and run as non-root with dropped capabilities.

use crate::handle::SandboxSpec;
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Capabilities, Container, ContainerPort, EmptyDirVolumeSource, EnvVar, HTTPGetAction, Pod,
    PodDNSConfig, PodSecurityContext, PodSpec, PodTemplateSpec, Probe, SeccompProfile,
    SecurityContext, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

/// Mount point of the shared writable volume.
pub const DATA_MOUNT_PATH: &str = "/mnt/data";

const DATA_VOLUME: &str = "shared-data";
const MASK_VOLUME: &str = "masked";

/// Standard labels carried by every runcell-managed resource, merged with
/// the caller's extra labels.
pub fn base_labels(language: &str, kind: &str) -> BTreeMap<String, String> {
    [
        ("app.kubernetes.io/name".to_string(), "runcell".to_string()),
        ("app.kubernetes.io/component".to_string(), "execution".to_string()),
        ("app.kubernetes.io/managed-by".to_string(), "runcell".to_string()),
        ("runcell.io/language".to_string(), language.to_string()),
        ("runcell.io/type".to_string(), kind.to_string()),
    ]
    .into_iter()
    .collect()
}

fn env_var(name: &str, value: &str) -> EnvVar {
    EnvVar { name: name.to_string(), value: Some(value.to_string()), ..Default::default() }
}

fn quantity_map(cpu: &str, memory: &str) -> BTreeMap<String, Quantity> {
    [
        ("cpu".to_string(), Quantity(cpu.to_string())),
        ("memory".to_string(), Quantity(memory.to_string())),
    ]
    .into_iter()
    .collect()
}

fn http_probe(
    path: &str,
    port: u16,
    initial_delay: i32,
    period: i32,
    failure_threshold: i32,
) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.to_string()),
            port: IntOrString::Int(port as i32),
            ..Default::default()
        }),
        initial_delay_seconds: Some(initial_delay),
        period_seconds: Some(period),
        timeout_seconds: Some(5),
        failure_threshold: Some(failure_threshold),
        ..Default::default()
    }
}

/// Mounts masking host-identifying files. Paths under `/proc` cannot be
/// covered by a volume mount; those are masked inside the images instead.
fn masked_mounts(spec: &SandboxSpec) -> Vec<VolumeMount> {
    spec.masked_paths
        .iter()
        .filter(|path| !path.starts_with("/proc"))
        .map(|path| VolumeMount {
            name: MASK_VOLUME.to_string(),
            mount_path: path.clone(),
            sub_path: Some(path.trim_start_matches('/').replace('/', "-")),
            read_only: Some(true),
            ..Default::default()
        })
        .collect()
}

/// Build the sandbox pod manifest.
pub fn build_pod(
    name: &str,
    namespace: &str,
    spec: &SandboxSpec,
    labels: &BTreeMap<String, String>,
) -> Pod {
    let data_mount = VolumeMount {
        name: DATA_VOLUME.to_string(),
        mount_path: DATA_MOUNT_PATH.to_string(),
        ..Default::default()
    };

    let mut volumes = vec![Volume {
        name: DATA_VOLUME.to_string(),
        empty_dir: Some(EmptyDirVolumeSource {
            size_limit: Some(Quantity(spec.volume_size_limit.clone())),
            ..Default::default()
        }),
        ..Default::default()
    }];

    let mask_mounts = masked_mounts(spec);
    if !mask_mounts.is_empty() {
        volumes.push(Volume {
            name: MASK_VOLUME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        });
    }

    let main_security = SecurityContext {
        run_as_user: Some(spec.run_as_user),
        run_as_group: Some(spec.run_as_user),
        run_as_non_root: Some(true),
        allow_privilege_escalation: Some(false),
        capabilities: Some(Capabilities {
            drop: Some(vec!["ALL".to_string()]),
            ..Default::default()
        }),
        ..Default::default()
    };

    // The sidecar enters the main container's namespaces to run user code.
    // That needs SYS_PTRACE (to reach /proc/<pid>/ns), SYS_ADMIN (setns),
    // and SYS_CHROOT; for a non-root uid the capabilities only land in the
    // bounding set, so the sidecar image setcaps its exec binary and
    // privilege escalation must stay allowed for file capabilities.
    let sidecar_security = SecurityContext {
        run_as_user: Some(spec.run_as_user),
        run_as_group: Some(spec.run_as_user),
        run_as_non_root: Some(true),
        allow_privilege_escalation: Some(true),
        capabilities: Some(Capabilities {
            add: Some(vec![
                "SYS_PTRACE".to_string(),
                "SYS_ADMIN".to_string(),
                "SYS_CHROOT".to_string(),
            ]),
            drop: Some(vec!["ALL".to_string()]),
        }),
        ..Default::default()
    };

    let mut main_mounts = vec![data_mount.clone()];
    main_mounts.extend(mask_mounts.clone());

    let main_container = Container {
        name: "main".to_string(),
        image: Some(spec.image.clone()),
        image_pull_policy: Some(spec.image_pull_policy.clone()),
        volume_mounts: Some(main_mounts),
        security_context: Some(main_security),
        resources: Some(k8s_openapi::api::core::v1::ResourceRequirements {
            limits: Some(quantity_map(&spec.cpu_limit, &spec.memory_limit)),
            requests: Some(quantity_map(&spec.cpu_request, &spec.memory_request)),
            ..Default::default()
        }),
        env: Some(vec![
            env_var("PYTHONUNBUFFERED", "1"),
            env_var("HOME", DATA_MOUNT_PATH),
        ]),
        ..Default::default()
    };

    let sidecar_container = Container {
        name: "sidecar".to_string(),
        image: Some(spec.sidecar_image.clone()),
        image_pull_policy: Some(spec.image_pull_policy.clone()),
        ports: Some(vec![ContainerPort {
            container_port: spec.sidecar_port as i32,
            name: Some("http".to_string()),
            ..Default::default()
        }]),
        volume_mounts: Some(vec![data_mount]),
        security_context: Some(sidecar_security),
        // User code runs in this container's cgroup, so these limits are
        // the ones that actually bind it.
        resources: Some(k8s_openapi::api::core::v1::ResourceRequirements {
            limits: Some(quantity_map(&spec.sidecar_cpu_limit, &spec.sidecar_memory_limit)),
            requests: Some(quantity_map(&spec.sidecar_cpu_request, &spec.sidecar_memory_request)),
            ..Default::default()
        }),
        env: Some(vec![
            env_var("LANGUAGE", spec.language.as_str()),
            env_var("WORKING_DIR", DATA_MOUNT_PATH),
            env_var("SIDECAR_PORT", &spec.sidecar_port.to_string()),
        ]),
        readiness_probe: Some(http_probe("/ready", spec.sidecar_port, 5, 3, 5)),
        liveness_probe: Some(http_probe("/health", spec.sidecar_port, 5, 10, 3)),
        ..Default::default()
    };

    // Clearing search domains keeps cluster-internal names unresolvable
    // from user code; the resolver list must hold public addresses only.
    let dns = spec.network_enabled.then(|| PodDNSConfig {
        nameservers: Some(spec.dns_nameservers.clone()),
        searches: Some(Vec::new()),
        ..Default::default()
    });

    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![main_container, sidecar_container],
            volumes: Some(volumes),
            restart_policy: Some("Never".to_string()),
            termination_grace_period_seconds: Some(10),
            // The sidecar must see the main container's processes.
            share_process_namespace: Some(true),
            hostname: Some(spec.hostname.clone()),
            dns_policy: dns.is_some().then(|| "None".to_string()),
            dns_config: dns,
            security_context: Some(PodSecurityContext {
                fs_group: Some(spec.run_as_user),
                seccomp_profile: Some(SeccompProfile {
                    type_: spec.seccomp_profile.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Build a one-shot Job wrapping the sandbox pod template. Used for
/// languages without a warm pool.
pub fn build_job(
    name: &str,
    namespace: &str,
    spec: &SandboxSpec,
    labels: &BTreeMap<String, String>,
    ttl_seconds_after_finished: i64,
    active_deadline_seconds: i64,
) -> Job {
    let pod = build_pod(&format!("{name}-pod"), namespace, spec, labels);

    Job {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(JobSpec {
            template: PodTemplateSpec { metadata: pod.metadata.into(), spec: pod.spec },
            // Failed snippets must not re-run.
            backoff_limit: Some(0),
            ttl_seconds_after_finished: Some(ttl_seconds_after_finished as i32),
            active_deadline_seconds: Some(active_deadline_seconds),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
#[path = "spec_tests.rs"]
mod tests;
