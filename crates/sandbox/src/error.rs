// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sandbox layer errors.

use thiserror::Error;

/// Errors from sandbox lifecycle management.
///
/// Sidecar RPC failures are deliberately NOT errors: the sidecar client
/// folds them into an execution result (non-zero exit code, descriptive
/// stderr) so a crashed snippet and a crashed transport look the same to
/// the caller, per the external contract.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    #[error("runtime api error: {0}")]
    Api(String),

    #[error("failed to spawn sandbox: {0}")]
    SpawnFailed(String),

    #[error("sandbox not found: {0}")]
    NotFound(String),
}

impl From<kube::Error> for SandboxError {
    fn from(err: kube::Error) -> Self {
        SandboxError::Api(err.to_string())
    }
}
