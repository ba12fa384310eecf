// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sandbox management for runcell.
//!
//! A sandbox is a pod with two containers — the language runtime and a
//! small HTTP sidecar — sharing a bounded writable volume at `/mnt/data`.
//! This crate owns:
//!
//! - the [`runtime::SandboxRuntime`] trait and its Kubernetes
//!   implementation ([`kube_runtime::KubeRuntime`]),
//! - pod/job manifest construction ([`spec`]),
//! - the sidecar RPC client ([`sidecar`]),
//! - per-language warm pools and the pool manager ([`pool`]),
//! - the one-shot job executor for cold languages ([`job`]).
//!
//! # Ownership
//!
//! Warm sandboxes are owned exclusively by their pool; an acquired handle
//! is owned by the caller until released or destroyed. Handles in terminal
//! states are never reused.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod fake;
pub mod handle;
pub mod job;
pub mod kube_runtime;
pub mod pool;
pub mod runtime;
pub mod sidecar;
pub mod spec;

pub use error::SandboxError;
pub use handle::{
    JobHandle, PoolConfig, PooledSandbox, SandboxHandle, SandboxSpec, SandboxStatus,
};
pub use job::{JobExecutor, JobTimings};
pub use kube_runtime::KubeRuntime;
pub use pool::{LanguagePool, PoolManager, PoolStats};
pub use runtime::{JobPodStatus, RuntimePhase, RuntimeStatus, SandboxRuntime};
pub use sidecar::{ExecutePayload, SidecarClient, SidecarFile, SidecarResult, WORKING_DIR};

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeRuntime;
