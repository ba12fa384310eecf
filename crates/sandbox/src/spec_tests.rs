// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use runcell_core::Language;

fn spec() -> SandboxSpec {
    SandboxSpec::new(Language::Py, "runcell/py:latest", "runcell/sidecar:latest")
}

fn pod() -> Pod {
    build_pod("pool-py-abcd1234", "runcell", &spec(), &base_labels("py", "pool"))
}

fn containers(pod: &Pod) -> &[Container] {
    &pod.spec.as_ref().unwrap().containers
}

#[test]
fn pod_has_main_and_sidecar_sharing_data_volume() {
    let pod = pod();
    let names: Vec<_> = containers(&pod).iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["main", "sidecar"]);

    for container in containers(&pod) {
        let mounts = container.volume_mounts.as_ref().unwrap();
        assert!(
            mounts.iter().any(|m| m.name == DATA_VOLUME && m.mount_path == DATA_MOUNT_PATH),
            "{} missing data mount",
            container.name
        );
    }

    let volumes = pod.spec.as_ref().unwrap().volumes.as_ref().unwrap();
    let data = volumes.iter().find(|v| v.name == DATA_VOLUME).unwrap();
    let size = data.empty_dir.as_ref().unwrap().size_limit.as_ref().unwrap();
    assert_eq!(size.0, "1Gi");
}

#[test]
fn main_container_drops_all_capabilities() {
    let pod = pod();
    let main = &containers(&pod)[0];
    let sec = main.security_context.as_ref().unwrap();
    assert_eq!(sec.run_as_non_root, Some(true));
    assert_eq!(sec.allow_privilege_escalation, Some(false));
    let caps = sec.capabilities.as_ref().unwrap();
    assert_eq!(caps.drop.as_ref().unwrap(), &vec!["ALL".to_string()]);
    assert!(caps.add.is_none());
}

#[test]
fn sidecar_gets_exec_capabilities_and_real_limits() {
    let pod = pod();
    let sidecar = &containers(&pod)[1];

    let caps = sidecar.security_context.as_ref().unwrap().capabilities.as_ref().unwrap();
    let added = caps.add.as_ref().unwrap();
    for cap in ["SYS_PTRACE", "SYS_ADMIN", "SYS_CHROOT"] {
        assert!(added.contains(&cap.to_string()), "missing {cap}");
    }
    assert_eq!(caps.drop.as_ref().unwrap(), &vec!["ALL".to_string()]);

    // user code runs in the sidecar cgroup, limits must be present
    let limits = sidecar.resources.as_ref().unwrap().limits.as_ref().unwrap();
    assert_eq!(limits.get("cpu").unwrap().0, "500m");
    assert_eq!(limits.get("memory").unwrap().0, "512Mi");
}

#[test]
fn sidecar_probes_hit_ready_and_health() {
    let pod = pod();
    let sidecar = &containers(&pod)[1];
    let ready = sidecar.readiness_probe.as_ref().unwrap();
    assert_eq!(ready.http_get.as_ref().unwrap().path.as_deref(), Some("/ready"));
    let live = sidecar.liveness_probe.as_ref().unwrap();
    assert_eq!(live.http_get.as_ref().unwrap().path.as_deref(), Some("/health"));
    assert_eq!(live.failure_threshold, Some(3));
}

#[test]
fn pod_level_hardening() {
    let pod = pod();
    let pod_spec = pod.spec.as_ref().unwrap();
    assert_eq!(pod_spec.restart_policy.as_deref(), Some("Never"));
    assert_eq!(pod_spec.share_process_namespace, Some(true));
    assert_eq!(pod_spec.termination_grace_period_seconds, Some(10));
    assert_eq!(pod_spec.hostname.as_deref(), Some("sandbox"));

    let sec = pod_spec.security_context.as_ref().unwrap();
    assert_eq!(sec.fs_group, Some(65532));
    assert_eq!(sec.seccomp_profile.as_ref().unwrap().type_, "RuntimeDefault");
}

#[test]
fn machine_id_is_masked_but_proc_paths_are_left_to_the_image() {
    let pod = pod();
    let main = &containers(&pod)[0];
    let mounts = main.volume_mounts.as_ref().unwrap();
    assert!(mounts.iter().any(|m| m.mount_path == "/etc/machine-id"));
    assert!(!mounts.iter().any(|m| m.mount_path == "/proc/version"));
}

#[test]
fn network_enabled_pins_public_resolvers() {
    let mut s = spec();
    assert!(pod().spec.unwrap().dns_config.is_none());

    s.network_enabled = true;
    let pod = build_pod("p", "ns", &s, &base_labels("py", "pool"));
    let pod_spec = pod.spec.unwrap();
    assert_eq!(pod_spec.dns_policy.as_deref(), Some("None"));
    let dns = pod_spec.dns_config.unwrap();
    assert_eq!(dns.searches.as_ref().unwrap().len(), 0);
    for ns in dns.nameservers.unwrap() {
        assert!(
            !ns.starts_with("10.") && !ns.starts_with("192.168.") && !ns.starts_with("172."),
            "private resolver {ns}"
        );
    }
}

#[test]
fn job_wraps_pod_template_with_one_shot_policy() {
    let labels = base_labels("go", "job");
    let job = build_job("exec-go-abc-12345678", "runcell", &spec(), &labels, 60, 300);
    let job_spec = job.spec.as_ref().unwrap();
    assert_eq!(job_spec.backoff_limit, Some(0));
    assert_eq!(job_spec.ttl_seconds_after_finished, Some(60));
    assert_eq!(job_spec.active_deadline_seconds, Some(300));

    let template_spec = job_spec.template.spec.as_ref().unwrap();
    assert_eq!(template_spec.containers.len(), 2);
    assert_eq!(template_spec.restart_policy.as_deref(), Some("Never"));
}

#[test]
fn base_labels_identify_language_and_kind() {
    let labels = base_labels("py", "pool");
    assert_eq!(labels.get("runcell.io/language").map(String::as_str), Some("py"));
    assert_eq!(labels.get("runcell.io/type").map(String::as_str), Some("pool"));
    assert_eq!(labels.get("app.kubernetes.io/name").map(String::as_str), Some("runcell"));
}
