// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn handle() -> SandboxHandle {
    SandboxHandle::new(
        "uid-1",
        "pool-py-abcd1234",
        "default",
        Language::Py,
        BTreeMap::new(),
        DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
    )
}

#[test]
fn sidecar_url_requires_pod_ip() {
    let mut h = handle();
    assert_eq!(h.sidecar_url(), None);
    h.pod_ip = Some("10.0.0.7".into());
    assert_eq!(h.sidecar_url().as_deref(), Some("http://10.0.0.7:8080"));
}

#[test]
fn availability_requires_warm_and_unacquired() {
    let mut pooled = PooledSandbox::new(handle());
    assert!(!pooled.is_available(), "pending sandbox must not be available");

    pooled.handle.status = SandboxStatus::Warm;
    assert!(pooled.is_available());

    pooled.acquired = true;
    assert!(!pooled.is_available());

    pooled.acquired = false;
    pooled.handle.status = SandboxStatus::Executing;
    assert!(!pooled.is_available());
}

#[test]
fn terminal_statuses() {
    assert!(SandboxStatus::Succeeded.is_terminal());
    assert!(SandboxStatus::Failed.is_terminal());
    assert!(!SandboxStatus::Warm.is_terminal());
    assert!(!SandboxStatus::Executing.is_terminal());
}

#[test]
fn pool_names_embed_language() {
    let name = pool_sandbox_name(Language::Py);
    assert!(name.starts_with("pool-py-"), "{name}");
    assert_eq!(name.len(), "pool-py-".len() + 8);
}

#[test]
fn job_names_are_dns_safe() {
    let sid = SessionId::from_string("AB_cd-EFgh123456789xx");
    let name = job_name(Language::Go, &sid);
    assert!(name.starts_with("exec-go-ab-cd-efgh12"), "{name}");
    assert!(name.len() <= 63);
    assert!(!name.contains('_'));
}

#[test]
fn pool_config_size_zero_disables_pool() {
    let spec = SandboxSpec::new(Language::Go, "img", "sidecar-img");
    assert!(!PoolConfig { pool_size: 0, spec: spec.clone() }.uses_pool());
    assert!(PoolConfig { pool_size: 2, spec }.uses_pool());
}
