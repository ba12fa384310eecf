// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Application state threaded through the router.
//!
//! One explicit owner for everything request handlers need; constructed
//! top-down in `lifecycle::startup` (no process-wide globals).

use crate::config::Config;
use runcell_engine::{EventBus, ExecutionBackend, Orchestrator};
use runcell_store::{FileStore, SessionStore, StateArchive, StateStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<dyn SessionStore>,
    pub files: Arc<dyn FileStore>,
    pub state: Arc<dyn StateStore>,
    pub archive: Option<Arc<dyn StateArchive>>,
    pub backend: Arc<dyn ExecutionBackend>,
    pub orchestrator: Arc<Orchestrator>,
    pub bus: Arc<EventBus>,
    pub config: Arc<Config>,
}
