// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent storage for runcell sessions, files, and interpreter state.
//!
//! Two backing stores are involved:
//!
//! - **Redis** (via `deadpool-redis`) — session registry, file metadata,
//!   and the hot state cache. Multi-key writes use transactional pipelines.
//! - **S3-compatible object store** (via `aws-sdk-s3`) — file blobs and the
//!   cold state archive.
//!
//! The service-facing surface is the trait set in [`traits`]; the
//! orchestrator and HTTP layer only ever see `Arc<dyn SessionStore>` etc.,
//! which keeps them testable against the in-memory doubles in [`memory`]
//! (enabled with the `test-support` feature).

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod archive;
pub mod error;
pub mod file;
pub mod keys;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod object;
pub mod session;
pub mod state;
pub mod traits;

pub use archive::{ArchiveConfig, StateArchiveStore};
pub use error::StoreError;
pub use file::ObjectFileStore;
pub use object::{ObjectInfo, ObjectStore};
pub use session::{SessionRegistry, SessionSweepConfig};
pub use state::{state_hash_hex, StateCache};
pub use traits::{
    ArchiveSweep, FileStore, SessionChanges, SessionStore, StateArchive, StateInfo, StateSource,
    StateStore,
};

#[cfg(any(test, feature = "test-support"))]
pub use memory::{MemoryFileStore, MemorySessionStore, MemoryStateArchive, MemoryStateStore};

/// Build a Redis connection pool from a URL.
pub fn redis_pool(url: &str) -> Result<deadpool_redis::Pool, StoreError> {
    let cfg = deadpool_redis::Config::from_url(url);
    cfg.create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .map_err(|e| StoreError::Config(e.to_string()))
}
