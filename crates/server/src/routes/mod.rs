// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Route table and router assembly.

pub mod exec;
pub mod files;
pub mod sessions;
pub mod state;

use crate::auth;
use crate::state::AppState;
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use tower_http::trace::TraceLayer;

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

async fn ready() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ready"}))
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod tests;

/// Build the full application router.
pub fn router(app: AppState) -> Router {
    Router::new()
        .route("/exec", post(exec::execute))
        .route(
            "/state/:session_id",
            get(state::download).post(state::upload).delete(state::delete),
        )
        .route("/state/:session_id/info", get(state::info))
        .route("/upload", post(files::upload))
        .route("/files/:session_id", get(files::list))
        .route(
            "/files/:session_id/:file_id",
            get(files::content).delete(files::delete),
        )
        .route("/files/:session_id/:file_id/url", get(files::download_url))
        .route("/sessions", get(sessions::list))
        .route("/sessions/:session_id", get(sessions::get).delete(sessions::delete))
        .route("/pools", get(sessions::pools))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .layer(middleware::from_fn_with_state(app.clone(), auth::require_api_key))
        .layer(middleware::from_fn(auth::assign_request_id))
        .layer(TraceLayer::new_for_http())
        .with_state(app)
}
