// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage error type.

use thiserror::Error;

/// Errors from the Redis and object-store layers.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] deadpool_redis::redis::RedisError),

    #[error("redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("object store error: {0}")]
    ObjectStore(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("corrupt record for {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("store configuration error: {0}")]
    Config(String),
}

impl StoreError {
    pub fn object<E: std::fmt::Display>(err: E) -> Self {
        StoreError::ObjectStore(err.to_string())
    }

    pub fn corrupt(key: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::Corrupt { key: key.into(), reason: reason.into() }
    }
}
