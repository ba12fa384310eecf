// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pool invariants exercised against the fake runtime (spec-level view of
//! acquire/release round trips).

use crate::specs::prelude::*;
use runcell_sandbox::pool::{LanguagePool, PoolTimings};
use runcell_sandbox::{FakeRuntime, PoolConfig, SandboxSpec, SandboxStatus};

fn pool(size: usize, runtime: Arc<FakeRuntime>) -> Arc<LanguagePool<FakeRuntime>> {
    Arc::new(LanguagePool::with_timings(
        Language::Py,
        PoolConfig {
            pool_size: size,
            spec: SandboxSpec::new(Language::Py, "runcell/py:latest", "runcell/sidecar:latest"),
        },
        runtime,
        None,
        PoolTimings {
            ready_poll_interval: Duration::from_millis(5),
            ready_timeout: Duration::from_millis(200),
            replenish_interval: Duration::from_secs(600),
            health_interval: Duration::from_secs(600),
        },
    ))
}

#[tokio::test]
async fn queue_never_exceeds_map_and_queued_entries_are_warm() {
    let runtime = Arc::new(FakeRuntime::new());
    let pool = pool(3, runtime);
    pool.clone().start().await;

    let session = SessionId::new();
    let handle = pool.acquire(&session, Duration::from_secs(1)).await.unwrap();
    pool.release(&handle, false).await;

    assert!(pool.queued_len() <= pool.snapshot().len());
    for pooled in pool.snapshot() {
        if pooled.is_available() {
            assert_eq!(pooled.handle.status, SandboxStatus::Warm);
            assert!(pooled.handle.session_id.is_none());
        }
    }
    pool.stop().await;
}

#[tokio::test]
async fn acquire_release_round_trip_restores_the_pool() {
    let runtime = Arc::new(FakeRuntime::new());
    let pool = pool(2, runtime.clone());
    pool.clone().start().await;
    let before = pool.stats();
    let deletes_before = runtime.deleted_sandboxes().len();

    let session = SessionId::new();
    let handle = pool.acquire(&session, Duration::from_secs(1)).await.unwrap();
    pool.release(&handle, false).await;

    assert_eq!(pool.stats(), before);
    assert_eq!(runtime.deleted_sandboxes().len(), deletes_before);

    // destroy path: total shrinks by one, exactly one runtime delete
    let handle = pool.acquire(&session, Duration::from_secs(1)).await.unwrap();
    pool.release(&handle, true).await;
    assert_eq!(pool.stats().total, before.total - 1);
    assert_eq!(runtime.deleted_sandboxes().len(), deletes_before + 1);

    pool.stop().await;
}
