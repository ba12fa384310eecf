// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session registry endpoints and pool statistics.

use crate::error::ApiFailure;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use runcell_core::{ApiError, Event, RequestId, Session, SessionId};
use serde::{Deserialize, Serialize};

fn svc(request_id: RequestId) -> impl Fn(runcell_store::StoreError) -> ApiFailure {
    move |e| {
        ApiFailure::new(
            ApiError::unavailable("Sessions", format!("Session store error: {e}")),
            request_id,
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    100
}

#[derive(Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<Session>,
    pub count: usize,
}

pub async fn list(
    State(app): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Query(query): Query<ListQuery>,
) -> Result<Json<SessionListResponse>, ApiFailure> {
    let sessions = app
        .sessions
        .list(query.limit, query.offset)
        .await
        .map_err(svc(request_id))?;
    Ok(Json(SessionListResponse { count: sessions.len(), sessions }))
}

pub async fn get(
    State(app): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(session_id): Path<String>,
) -> Result<Json<Session>, ApiFailure> {
    let sid = SessionId::from_string(&session_id);
    match app.sessions.get(&sid).await.map_err(svc(request_id))? {
        Some(session) => Ok(Json(session)),
        None => Err(ApiFailure::new(ApiError::not_found("Session", session_id), request_id)),
    }
}

/// Delete a session. Files are freed by the registry's wired file store
/// and again (idempotently) by the cleanup scheduler reacting to the
/// event; cached state is dropped here.
pub async fn delete(
    State(app): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiFailure> {
    let sid = SessionId::from_string(&session_id);
    if !app.sessions.delete(&sid).await.map_err(svc(request_id))? {
        return Err(ApiFailure::new(ApiError::not_found("Session", session_id), request_id));
    }

    if let Err(e) = app.state.delete_state(&sid).await {
        tracing::warn!(session_id = %sid.short(12), error = %e, "failed to delete session state");
    }
    if let Some(archive) = &app.archive {
        if let Err(e) = archive.delete(&sid).await {
            tracing::warn!(session_id = %sid.short(12), error = %e, "failed to delete archived state");
        }
    }

    app.bus.publish(Event::SessionDeleted { session_id: sid }).await;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /pools` — warm pool statistics per language.
pub async fn pools(
    State(app): State<AppState>,
    Extension(_request_id): Extension<RequestId>,
) -> Json<serde_json::Value> {
    let stats: std::collections::HashMap<String, _> = app
        .backend
        .pool_stats()
        .into_iter()
        .map(|(language, stats)| (language.to_string(), stats))
        .collect();
    Json(serde_json::json!({"pools": stats}))
}
