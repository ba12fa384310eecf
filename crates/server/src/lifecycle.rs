// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Service startup and shutdown.
//!
//! Dependencies are constructed strictly top-down: object store, file
//! store, session registry, state cache and archive, sandbox runtime,
//! pools, dispatcher, orchestrator. The event bus covers the remaining
//! cross-cutting reactions so no component holds a back-pointer.

use crate::config::Config;
use crate::state::AppState;
use runcell_core::Language;
use runcell_engine::{
    bus::spawn_event_forwarder, CleanupScheduler, CleanupSchedulerConfig, DispatcherConfig,
    EventBus, ExecutionDispatcher, Orchestrator, OrchestratorConfig,
};
use runcell_sandbox::pool::PoolTimings;
use runcell_sandbox::{
    JobExecutor, KubeRuntime, PoolConfig, PoolManager, SandboxRuntime as _, SandboxSpec,
};
use runcell_store::{
    redis_pool, ArchiveConfig, ObjectFileStore, ObjectStore, SessionRegistry,
    SessionSweepConfig, StateArchiveStore, StateCache,
};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Startup failures exit the process with a diagnostic; at runtime
/// nothing is fatal.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("store initialization failed: {0}")]
    Store(#[from] runcell_store::StoreError),
    #[error("sandbox runtime unreachable: {0}")]
    Runtime(String),
}

/// Background work owned by the running service.
pub struct Background {
    pub pools: Arc<PoolManager<KubeRuntime>>,
    pub cleanup: Arc<CleanupScheduler>,
    pub bus: Arc<EventBus>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl Background {
    /// Stop loops and destroy every remaining warm sandbox.
    pub async fn shutdown(self) {
        tracing::info!("shutting down");
        self.cleanup.stop(&self.bus);
        self.pools.stop().await;
        for task in self.tasks {
            task.abort();
        }
        tracing::info!("shutdown complete");
    }
}

/// Build every component and warm the pools.
pub async fn startup(config: Config) -> Result<(AppState, Background), StartupError> {
    let config = Arc::new(config);

    // Storage clients
    let redis = redis_pool(&config.redis_url)?;
    let objects = ObjectStore::connect(&config.s3_bucket, config.s3_endpoint.as_deref()).await;

    let files = Arc::new(ObjectFileStore::new(
        redis.clone(),
        objects.clone(),
        config.session_ttl_secs,
    ));
    let sessions = Arc::new(SessionRegistry::new(
        redis.clone(),
        Some(files.clone()),
        config.session_ttl_secs,
    ));
    let state = Arc::new(StateCache::new(redis.clone(), config.state_ttl_secs));
    let archive = Arc::new(StateArchiveStore::new(
        objects.clone(),
        state.clone(),
        ArchiveConfig {
            state_ttl_seconds: config.state_ttl_secs,
            archive_after_seconds: config.state_archive_after_secs,
            archive_ttl_days: config.state_archive_ttl_days,
            batch_limit: 100,
        },
    ));

    let archive_dyn: Arc<dyn runcell_store::StateArchive> = archive.clone();

    // Sandbox runtime; unreachable at startup is fatal (at runtime the
    // dispatcher degrades instead).
    let runtime = Arc::new(KubeRuntime::connect(config.namespace.clone()).await);
    if !runtime.is_available() {
        return Err(StartupError::Runtime(
            runtime.init_error().unwrap_or_else(|| "unknown".to_string()),
        ));
    }

    // Event plumbing
    let bus = Arc::new(EventBus::new());
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let forwarder = spawn_event_forwarder(event_rx, bus.clone());

    // Pools and dispatcher
    let pool_configs: Vec<(Language, PoolConfig)> = config
        .pool_sizes
        .iter()
        .map(|(language, size)| {
            let mut spec = SandboxSpec::new(
                *language,
                config.image_for(*language),
                config.sidecar_image.clone(),
            );
            spec.network_enabled = config.network_enabled;
            (*language, PoolConfig { pool_size: *size, spec })
        })
        .collect();

    let pools = Arc::new(PoolManager::new(
        Arc::clone(&runtime),
        pool_configs,
        Some(event_tx.clone()),
        PoolTimings::default(),
    ));
    pools.start().await;
    tracing::info!(stats = ?pools.stats(), "sandbox pools warmed");

    let dispatcher = Arc::new(ExecutionDispatcher::new(
        Arc::clone(&runtime),
        Arc::clone(&pools),
        JobExecutor::new(Arc::clone(&runtime)),
        DispatcherConfig {
            sidecar_image: config.sidecar_image.clone(),
            images: Language::ALL
                .iter()
                .map(|l| (*l, config.image_for(*l)))
                .collect(),
            ..Default::default()
        },
        Some(event_tx),
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        sessions.clone(),
        files.clone(),
        dispatcher.clone(),
        state.clone(),
        config.state_archive_enabled.then(|| archive_dyn.clone()),
        bus.clone(),
        OrchestratorConfig {
            state_persistence_enabled: config.state_persistence_enabled,
            state_capture_on_error: config.state_capture_on_error,
            state_ttl_seconds: config.state_ttl_secs,
            max_execution_time_secs: config.max_execution_time_secs,
            archive_enabled: config.state_archive_enabled,
        },
    ));

    // Background work: session sweep + cleanup scheduler
    let sweep = sessions.clone().spawn_sweep(SessionSweepConfig {
        interval: config.session_cleanup_interval,
        orphan_cleanup_enabled: config.orphan_cleanup_enabled,
        orphan_batch_limit: 1000,
    });

    let cleanup = CleanupScheduler::new(
        files.clone(),
        config.state_archive_enabled.then(|| archive_dyn.clone()),
        CleanupSchedulerConfig {
            archive_enabled: config.state_archive_enabled,
            archive_check_interval: config.state_archive_check_interval,
        },
    );
    cleanup.clone().start(&bus);

    let app = AppState {
        sessions,
        files,
        state,
        archive: config.state_archive_enabled.then(|| archive_dyn.clone()),
        backend: dispatcher,
        orchestrator,
        bus: bus.clone(),
        config,
    };

    let background = Background {
        pools,
        cleanup,
        bus,
        tasks: vec![forwarder, sweep],
    };
    Ok((app, background))
}
