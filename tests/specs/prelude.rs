// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for the workspace specs.

pub use runcell_core::{
    ApiError, Event, EventKind, ExecArgs, FakeClock, Language, RequestId, SessionId,
};
pub use runcell_engine::dispatcher::{
    DispatchOutcome, ExecSource, ExecuteCodeRequest, ExecutionBackend,
};
pub use runcell_engine::{
    EventBus, ExecRequest, ExecResponse, Orchestrator, OrchestratorConfig,
};
pub use runcell_store::{
    MemoryFileStore, MemorySessionStore, MemoryStateArchive, MemoryStateStore, StateStore,
};
pub use std::sync::Arc;
pub use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use runcell_sandbox::{PoolStats, SandboxHandle, SandboxStatus, SidecarFile, SidecarResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// What the scripted backend answers with.
#[derive(Clone)]
pub struct Script {
    pub result: SidecarResult,
    pub listed: Vec<SidecarFile>,
    pub with_handle: bool,
}

impl Script {
    pub fn stdout(stdout: &str) -> Self {
        Self {
            result: SidecarResult {
                exit_code: 0,
                stdout: stdout.into(),
                stderr: String::new(),
                execution_time_ms: 5,
                state: None,
                state_errors: None,
            },
            listed: Vec::new(),
            with_handle: true,
        }
    }

    pub fn with_state(mut self, state_b64: &str) -> Self {
        self.result.state = Some(state_b64.to_string());
        self
    }
}

/// Backend driven entirely by a script, recording what it was asked.
pub struct ScriptedBackend {
    script: Mutex<Script>,
    pub executed: Mutex<Vec<ExecuteCodeRequest>>,
    pub destroyed: AtomicUsize,
    pub fetchable: Mutex<HashMap<String, Vec<u8>>>,
}

impl ScriptedBackend {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            executed: Mutex::new(Vec::new()),
            destroyed: AtomicUsize::new(0),
            fetchable: Mutex::new(HashMap::new()),
        })
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock() = script;
    }
}

#[async_trait]
impl ExecutionBackend for ScriptedBackend {
    fn is_available(&self) -> bool {
        true
    }

    async fn execute_code(&self, request: ExecuteCodeRequest) -> DispatchOutcome {
        self.executed.lock().push(request.clone());
        let script = self.script.lock().clone();
        let record = runcell_engine::dispatcher::build_record(
            &request,
            chrono::Utc::now(),
            &script.result,
            &script.listed,
        );
        let handle = script.with_handle.then(|| {
            let mut handle = SandboxHandle::new(
                "uid-spec",
                "pool-spec",
                "test",
                request.language,
                Default::default(),
                chrono::Utc::now(),
            );
            handle.status = SandboxStatus::Executing;
            handle.pod_ip = Some("10.0.0.1".into());
            handle
        });
        DispatchOutcome {
            record,
            handle,
            new_state: script.result.state.clone(),
            state_errors: script.result.state_errors.clone(),
            source: ExecSource::PoolHit,
        }
    }

    async fn destroy_handle(&self, _handle: &SandboxHandle) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }

    async fn fetch_file(&self, _handle: &SandboxHandle, path: &str) -> Option<Vec<u8>> {
        self.fetchable.lock().get(path).cloned()
    }

    fn pool_stats(&self) -> HashMap<Language, PoolStats> {
        HashMap::new()
    }
}

/// Orchestrator wired to memory stores and a scripted backend.
pub struct World {
    pub clock: FakeClock,
    pub sessions: Arc<MemorySessionStore>,
    pub files: Arc<MemoryFileStore>,
    pub state: Arc<MemoryStateStore>,
    pub archive: Arc<MemoryStateArchive>,
    pub bus: Arc<EventBus>,
    pub orchestrator: Orchestrator,
}

impl World {
    pub fn new(backend: Arc<dyn ExecutionBackend>) -> Self {
        let clock = FakeClock::new();
        clock.set_epoch_ms(1_700_000_000_000);
        let sessions = Arc::new(MemorySessionStore::new(3600, clock.clone()));
        let files = Arc::new(MemoryFileStore::new(clock.clone()));
        let state = Arc::new(MemoryStateStore::new(7200, clock.clone()));
        let archive = Arc::new(MemoryStateArchive::new(state.clone(), 7, clock.clone()));
        let bus = Arc::new(EventBus::new());
        let orchestrator = Orchestrator::new(
            sessions.clone(),
            files.clone(),
            backend,
            state.clone(),
            Some(archive.clone()),
            bus.clone(),
            OrchestratorConfig::default(),
        );
        Self { clock, sessions, files, state, archive, bus, orchestrator }
    }

    pub async fn exec(&self, request: ExecRequest) -> Result<ExecResponse, ApiError> {
        self.orchestrator.execute(request, RequestId::new(), None).await
    }
}

pub fn request(code: &str, lang: &str) -> ExecRequest {
    ExecRequest {
        code: code.into(),
        lang: lang.into(),
        args: ExecArgs::None,
        user_id: None,
        entity_id: None,
        session_id: None,
        files: Vec::new(),
    }
}
