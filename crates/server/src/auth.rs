// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! API-key authentication middleware.
//!
//! Accepts `x-api-key: <key>` or `Authorization: Bearer <key>` /
//! `Authorization: ApiKey <key>`. A SHA-256 based hash of the presented
//! key is attached to the request for audit logging; raw keys are never
//! logged or stored. `/health` and `/ready` are exempt. With no keys
//! configured, authentication is disabled (development mode).

use crate::error::ApiFailure;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use runcell_core::{ApiError, RequestId};
use sha2::{Digest, Sha256};

/// Per-request authentication context attached as an extension.
#[derive(Debug, Clone)]
pub struct ApiKeyContext {
    /// First 16 hex chars of SHA-256 over the presented key, for audit.
    pub key_hash: Option<String>,
}

/// Short hash of an API key, safe for logs and metrics.
pub fn hash_api_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

fn presented_key(request: &Request) -> Option<String> {
    if let Some(value) = request.headers().get("x-api-key") {
        return value.to_str().ok().map(str::to_string);
    }
    let auth = request.headers().get(AUTHORIZATION)?.to_str().ok()?;
    for prefix in ["Bearer ", "ApiKey "] {
        if let Some(key) = auth.strip_prefix(prefix) {
            return Some(key.trim().to_string());
        }
    }
    None
}

/// Middleware enforcing the configured key set.
pub async fn require_api_key(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if path == "/health" || path == "/ready" {
        return next.run(request).await;
    }

    if !state.config.auth_enabled() {
        request.extensions_mut().insert(ApiKeyContext { key_hash: None });
        return next.run(request).await;
    }

    let request_id = request
        .extensions()
        .get::<RequestId>()
        .copied()
        .unwrap_or_default();

    let Some(key) = presented_key(&request) else {
        return ApiFailure::new(
            ApiError::Authentication { message: "Missing API key".into() },
            request_id,
        )
        .into_response();
    };

    if !state.config.api_keys.iter().any(|k| k == &key) {
        tracing::warn!(key_hash = hash_api_key(&key), "rejected invalid API key");
        return ApiFailure::new(
            ApiError::Authentication { message: "Invalid API key".into() },
            request_id,
        )
        .into_response();
    }

    request
        .extensions_mut()
        .insert(ApiKeyContext { key_hash: Some(hash_api_key(&key)) });
    next.run(request).await
}

/// Middleware assigning each request an id, echoed on the response.
pub async fn assign_request_id(mut request: Request, next: Next) -> Response {
    let request_id = RequestId::new();
    request.extensions_mut().insert(request_id);
    let mut response = next.run(request).await;
    if let Ok(value) = request_id.as_str().parse() {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
