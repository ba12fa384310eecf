// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-language warm sandbox pools.
//!
//! Each pool keeps `pool_size` sandboxes warm so hot-path languages skip
//! the cold-start entirely. Two background loops maintain the pool: a
//! replenisher that tops the pool back up and a health checker that evicts
//! sandboxes failing three consecutive probes.
//!
//! Locking: one mutex per pool protects the sandbox map and session
//! bindings, held only across map mutations. All network calls (create,
//! delete, health) happen outside the lock. The FIFO availability queue is
//! an unbounded channel; an id popped from the queue whose sandbox has
//! been evicted in the meantime is simply skipped.

use crate::error::SandboxError;
use crate::handle::{
    pool_sandbox_name, PoolConfig, PooledSandbox, SandboxHandle, SandboxStatus,
};
use crate::runtime::{RuntimePhase, SandboxRuntime};
use crate::sidecar::{ExecutePayload, SidecarClient, SidecarResult};
use crate::spec::base_labels;
use chrono::Utc;
use futures_util::future::join_all;
use parking_lot::Mutex;
use runcell_core::{Event, ExecutionId, Language, SessionId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Default wait for a warm sandbox before falling back to a job.
pub const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

const WARMUP_BATCH: usize = 5;
const REPLENISH_BATCH: usize = 3;
const MAX_HEALTH_FAILURES: u32 = 3;

/// Loop and polling intervals, overridable in tests.
#[derive(Debug, Clone)]
pub struct PoolTimings {
    pub ready_poll_interval: Duration,
    pub ready_timeout: Duration,
    pub replenish_interval: Duration,
    pub health_interval: Duration,
}

impl Default for PoolTimings {
    fn default() -> Self {
        Self {
            ready_poll_interval: Duration::from_millis(500),
            ready_timeout: Duration::from_secs(60),
            replenish_interval: Duration::from_secs(5),
            health_interval: Duration::from_secs(30),
        }
    }
}

/// Point-in-time statistics for one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PoolStats {
    pub available: usize,
    pub total: usize,
    pub target: usize,
}

#[derive(Default)]
struct PoolState {
    sandboxes: HashMap<String, PooledSandbox>,
    session_bindings: HashMap<SessionId, String>,
}

/// Warm pool for a single language.
pub struct LanguagePool<R: SandboxRuntime> {
    language: Language,
    config: PoolConfig,
    runtime: Arc<R>,
    sidecar: SidecarClient,
    timings: PoolTimings,
    state: Mutex<PoolState>,
    available_tx: mpsc::UnboundedSender<String>,
    available_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
    queued: AtomicUsize,
    running: AtomicBool,
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
    event_tx: Option<mpsc::UnboundedSender<Event>>,
}

impl<R: SandboxRuntime + 'static> LanguagePool<R> {
    pub fn new(
        language: Language,
        config: PoolConfig,
        runtime: Arc<R>,
        event_tx: Option<mpsc::UnboundedSender<Event>>,
    ) -> Self {
        Self::with_timings(language, config, runtime, event_tx, PoolTimings::default())
    }

    pub fn with_timings(
        language: Language,
        config: PoolConfig,
        runtime: Arc<R>,
        event_tx: Option<mpsc::UnboundedSender<Event>>,
        timings: PoolTimings,
    ) -> Self {
        let (available_tx, available_rx) = mpsc::unbounded_channel();
        Self {
            language,
            config,
            runtime,
            sidecar: SidecarClient::new(),
            timings,
            state: Mutex::new(PoolState::default()),
            available_tx,
            available_rx: tokio::sync::Mutex::new(available_rx),
            queued: AtomicUsize::new(0),
            running: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
            event_tx: event_tx.clone(),
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    fn emit(&self, event: Event) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }

    fn enqueue(&self, uid: String) {
        if self.available_tx.send(uid).is_ok() {
            self.queued.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Warm the pool and start the background loops. Takes an `Arc` so
    /// the loops can keep the pool alive; callers pass a clone.
    pub async fn start(self: Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(
            language = %self.language,
            pool_size = self.config.pool_size,
            "starting sandbox pool"
        );

        self.warmup().await;
        self.emit(Event::PoolWarmed {
            language: self.language,
            count: self.stats().available,
        });

        let replenisher = Arc::clone(&self);
        let health_checker = Arc::clone(&self);
        let mut tasks = self.tasks.lock();
        tasks.push(tokio::spawn(async move { replenisher.replenish_loop().await }));
        tasks.push(tokio::spawn(async move { health_checker.health_check_loop().await }));
    }

    /// Stop the loops and destroy every remaining sandbox.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }

        let names: Vec<String> = {
            let mut state = self.state.lock();
            state.session_bindings.clear();
            state.sandboxes.drain().map(|(_, p)| p.handle.name).collect()
        };
        for name in names {
            if let Err(e) = self.runtime.delete_sandbox(&name).await {
                tracing::warn!(sandbox = name, error = %e, "failed to delete sandbox on stop");
            }
        }
        tracing::info!(language = %self.language, "sandbox pool stopped");
    }

    async fn warmup(&self) {
        let available = self.stats().available;
        let needed = self.config.pool_size.saturating_sub(available);
        if needed == 0 {
            return;
        }
        tracing::info!(
            language = %self.language,
            current = available,
            needed,
            "warming up pool"
        );

        let mut remaining = needed;
        while remaining > 0 {
            let batch = remaining.min(WARMUP_BATCH);
            join_all((0..batch).map(|_| self.create_warm_sandbox())).await;
            remaining -= batch;
        }
    }

    /// Create one warm sandbox. Failures are logged and the partially
    /// created pod is deleted silently.
    async fn create_warm_sandbox(&self) -> Option<String> {
        let name = pool_sandbox_name(self.language);
        let labels = base_labels(self.language.as_str(), "pool");

        let uid = match self.runtime.create_sandbox(&name, &self.config.spec, &labels).await {
            Ok(uid) => uid,
            Err(e) => {
                tracing::error!(sandbox = name, error = %e, "failed to create warm sandbox");
                return None;
            }
        };

        let Some(pod_ip) = self.wait_until_ready(&name).await else {
            if let Err(e) = self.runtime.delete_sandbox(&name).await {
                tracing::debug!(sandbox = name, error = %e, "cleanup after failed warmup");
            }
            return None;
        };

        let mut handle =
            SandboxHandle::new(uid.clone(), &name, self.runtime.namespace(), self.language, labels, Utc::now());
        handle.status = SandboxStatus::Warm;
        handle.pod_ip = Some(pod_ip);
        handle.sidecar_port = self.config.spec.sidecar_port;

        {
            let mut state = self.state.lock();
            state.sandboxes.insert(uid.clone(), PooledSandbox::new(handle));
        }
        self.enqueue(uid.clone());
        self.emit(Event::SandboxCreated {
            name: name.clone(),
            session_id: None,
            language: self.language,
        });
        tracing::debug!(sandbox = name, language = %self.language, "created warm sandbox");
        Some(uid)
    }

    /// Poll the runtime until the sidecar reports ready and the pod has an
    /// address, or the readiness window closes.
    async fn wait_until_ready(&self, name: &str) -> Option<String> {
        let deadline = Instant::now() + self.timings.ready_timeout;
        loop {
            match self.runtime.sandbox_status(name).await {
                Ok(status) => match status.phase {
                    RuntimePhase::Running if status.sidecar_ready => {
                        if let Some(ip) = status.pod_ip {
                            return Some(ip);
                        }
                    }
                    RuntimePhase::Failed | RuntimePhase::Succeeded => return None,
                    _ => {}
                },
                Err(SandboxError::NotFound(_)) => {}
                Err(e) => {
                    tracing::debug!(sandbox = name, error = %e, "readiness poll error");
                }
            }
            if Instant::now() >= deadline {
                tracing::warn!(sandbox = name, "sandbox did not become ready in time");
                return None;
            }
            tokio::time::sleep(self.timings.ready_poll_interval).await;
        }
    }

    /// Acquire a warm sandbox, waiting up to `timeout` on the FIFO queue.
    /// Returns `None` on timeout. Ids whose sandbox was evicted while
    /// queued are skipped without consuming the caller's slot.
    pub async fn acquire(
        &self,
        session_id: &SessionId,
        timeout: Duration,
    ) -> Option<SandboxHandle> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            let uid = {
                let mut rx = self.available_rx.lock().await;
                match tokio::time::timeout(remaining, rx.recv()).await {
                    Ok(Some(uid)) => uid,
                    Ok(None) => return None,
                    Err(_) => {
                        tracing::warn!(
                            language = %self.language,
                            session_id = %session_id.short(12),
                            "timeout acquiring sandbox from pool"
                        );
                        return None;
                    }
                }
            };
            self.queued.fetch_sub(1, Ordering::SeqCst);

            let mut state = self.state.lock();
            let Some(pooled) = state.sandboxes.get_mut(&uid) else {
                // Evicted by the health checker while queued.
                continue;
            };
            pooled.acquired = true;
            pooled.acquired_at_ms = Some(Utc::now().timestamp_millis() as u64);
            pooled.handle.status = SandboxStatus::Executing;
            pooled.handle.session_id = Some(*session_id);
            let handle = pooled.handle.clone();
            state.session_bindings.insert(*session_id, uid);

            tracing::debug!(
                sandbox = handle.name,
                language = %self.language,
                session_id = %session_id.short(12),
                "acquired sandbox from pool"
            );
            return Some(handle);
        }
    }

    /// Release a handle: destroy it (the default after an execution) or
    /// reset it and return it to the queue.
    pub async fn release(&self, handle: &SandboxHandle, destroy: bool) {
        let name = {
            let mut state = self.state.lock();
            if let Some(session_id) = &handle.session_id {
                state.session_bindings.remove(session_id);
            }
            if !state.sandboxes.contains_key(&handle.uid) {
                return;
            }
            if destroy {
                state.sandboxes.remove(&handle.uid).map(|p| p.handle.name)
            } else {
                if let Some(pooled) = state.sandboxes.get_mut(&handle.uid) {
                    pooled.acquired = false;
                    pooled.acquired_at_ms = None;
                    pooled.handle.status = SandboxStatus::Warm;
                    pooled.handle.session_id = None;
                }
                None
            }
        };

        match name {
            Some(name) => {
                if let Err(e) = self.runtime.delete_sandbox(&name).await {
                    tracing::warn!(sandbox = name, error = %e, "failed to delete sandbox");
                }
                self.emit(Event::SandboxDestroyed {
                    name,
                    session_id: handle.session_id,
                });
                tracing::debug!(sandbox = %handle.name, "destroyed sandbox after execution");
            }
            None if !destroy => {
                self.enqueue(handle.uid.clone());
                tracing::debug!(sandbox = %handle.name, "released sandbox back to pool");
            }
            None => {}
        }
    }

    /// Execute a snippet on an acquired handle (upload files, then
    /// `/execute`). Never errors; see [`SidecarResult`].
    pub async fn execute(
        &self,
        handle: &SandboxHandle,
        payload: &ExecutePayload,
        files: &[(String, Vec<u8>)],
        execution_id: &ExecutionId,
    ) -> SidecarResult {
        let Some(url) = handle.sidecar_url() else {
            return SidecarResult::failure("Sandbox not ready");
        };
        self.sidecar.upload_and_execute(&url, payload, files, execution_id).await
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            available: state.sandboxes.values().filter(|p| p.is_available()).count(),
            total: state.sandboxes.len(),
            target: self.config.pool_size,
        }
    }

    /// Ids currently sitting in the availability queue (test support).
    #[cfg(any(test, feature = "test-support"))]
    pub fn queued_len(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Snapshot of pooled sandboxes (test support).
    #[cfg(any(test, feature = "test-support"))]
    pub fn snapshot(&self) -> Vec<PooledSandbox> {
        self.state.lock().sandboxes.values().cloned().collect()
    }

    async fn replenish_loop(self: Arc<Self>) {
        while self.running.load(Ordering::SeqCst) {
            tokio::time::sleep(self.timings.replenish_interval).await;
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            let available = self.stats().available;
            if available >= self.config.pool_size {
                continue;
            }
            let needed = (self.config.pool_size - available).min(REPLENISH_BATCH);
            tracing::debug!(
                language = %self.language,
                available,
                needed,
                "replenishing pool"
            );
            for _ in 0..needed {
                self.create_warm_sandbox().await;
            }
        }
    }

    async fn health_check_loop(self: Arc<Self>) {
        while self.running.load(Ordering::SeqCst) {
            tokio::time::sleep(self.timings.health_interval).await;
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            let to_check: Vec<(String, Option<String>)> = {
                let state = self.state.lock();
                state
                    .sandboxes
                    .values()
                    .filter(|p| p.is_available())
                    .map(|p| (p.handle.uid.clone(), p.handle.sidecar_url()))
                    .collect()
            };

            let mut to_destroy: Vec<String> = Vec::new();
            for (uid, url) in to_check {
                let healthy = match &url {
                    Some(url) => self.sidecar.health(url).await,
                    None => false,
                };
                let mut state = self.state.lock();
                let Some(pooled) = state.sandboxes.get_mut(&uid) else { continue };
                if healthy {
                    pooled.health_check_failures = 0;
                    continue;
                }
                pooled.health_check_failures += 1;
                if pooled.health_check_failures >= MAX_HEALTH_FAILURES {
                    tracing::warn!(
                        sandbox = pooled.handle.name,
                        language = %self.language,
                        "removing unhealthy sandbox"
                    );
                    if let Some(removed) = state.sandboxes.remove(&uid) {
                        to_destroy.push(removed.handle.name);
                    }
                }
            }

            for name in to_destroy {
                if let Err(e) = self.runtime.delete_sandbox(&name).await {
                    tracing::warn!(sandbox = name, error = %e, "failed to delete unhealthy sandbox");
                }
                self.emit(Event::SandboxDestroyed { name, session_id: None });
            }
        }
    }
}

/// Owns one [`LanguagePool`] per pooled language and the configuration
/// map for all languages.
pub struct PoolManager<R: SandboxRuntime> {
    pools: HashMap<Language, Arc<LanguagePool<R>>>,
    configs: HashMap<Language, PoolConfig>,
}

impl<R: SandboxRuntime + 'static> PoolManager<R> {
    pub fn new(
        runtime: Arc<R>,
        configs: Vec<(Language, PoolConfig)>,
        event_tx: Option<mpsc::UnboundedSender<Event>>,
        timings: PoolTimings,
    ) -> Self {
        let mut pools = HashMap::new();
        let mut config_map = HashMap::new();
        for (language, config) in configs {
            if config.uses_pool() {
                pools.insert(
                    language,
                    Arc::new(LanguagePool::with_timings(
                        language,
                        config.clone(),
                        Arc::clone(&runtime),
                        event_tx.clone(),
                        timings.clone(),
                    )),
                );
            }
            config_map.insert(language, config);
        }
        Self { pools, configs: config_map }
    }

    pub async fn start(&self) {
        for pool in self.pools.values() {
            Arc::clone(pool).start().await;
        }
    }

    pub async fn stop(&self) {
        for pool in self.pools.values() {
            pool.stop().await;
        }
    }

    pub fn uses_pool(&self, language: Language) -> bool {
        self.configs.get(&language).map(PoolConfig::uses_pool).unwrap_or(false)
    }

    pub fn config(&self, language: Language) -> Option<&PoolConfig> {
        self.configs.get(&language)
    }

    pub fn pool(&self, language: Language) -> Option<&Arc<LanguagePool<R>>> {
        self.pools.get(&language)
    }

    /// Acquire from the language's pool. `None` when the language has no
    /// pool or the wait times out.
    pub async fn acquire(
        &self,
        language: Language,
        session_id: &SessionId,
        timeout: Duration,
    ) -> Option<SandboxHandle> {
        self.pools.get(&language)?.acquire(session_id, timeout).await
    }

    pub async fn release(&self, handle: &SandboxHandle, destroy: bool) {
        if let Some(pool) = self.pools.get(&handle.language) {
            pool.release(handle, destroy).await;
        }
    }

    pub async fn execute(
        &self,
        handle: &SandboxHandle,
        payload: &ExecutePayload,
        files: &[(String, Vec<u8>)],
        execution_id: &ExecutionId,
    ) -> SidecarResult {
        match self.pools.get(&handle.language) {
            Some(pool) => pool.execute(handle, payload, files, execution_id).await,
            None => SidecarResult::failure(format!(
                "No pool for language: {}",
                handle.language
            )),
        }
    }

    pub fn stats(&self) -> HashMap<Language, PoolStats> {
        self.pools.iter().map(|(lang, pool)| (*lang, pool.stats())).collect()
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
