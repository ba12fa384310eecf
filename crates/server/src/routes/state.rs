// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/state/{session_id}` — raw state upload/download for client-side
//! persistence.
//!
//! Download serves the raw compressed bytes with an `ETag` of their
//! SHA-256 and honors `If-None-Match`. Upload validates the envelope
//! (version byte `0x02`, length ≥ 2) and sets the 30 s recently-uploaded
//! marker so the next execution prefers this state.

use crate::error::ApiFailure;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use runcell_core::{ApiError, RequestId, SessionId};
use runcell_store::{state_hash_hex, StateSource};

/// Current state envelope version.
const STATE_VERSION: u8 = 0x02;

fn svc(request_id: RequestId) -> impl Fn(runcell_store::StoreError) -> ApiFailure {
    move |e| {
        ApiFailure::new(
            ApiError::unavailable("State", format!("State store error: {e}")),
            request_id,
        )
    }
}

pub async fn download(
    State(app): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiFailure> {
    let sid = SessionId::from_string(&session_id);

    if let Some(hash) = app.state.state_hash(&sid).await.map_err(svc(request_id))? {
        let etag = format!("\"{hash}\"");
        if headers
            .get(header::IF_NONE_MATCH)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == etag)
        {
            return Ok(StatusCode::NOT_MODIFIED.into_response());
        }
    }

    let mut raw = app.state.get_state_raw(&sid).await.map_err(svc(request_id))?;

    // Cold fallback: restore rehydrates the hot cache as a side effect.
    if raw.is_none() {
        if let Some(archive) = &app.archive {
            if archive.restore(&sid).await.map_err(svc(request_id))?.is_some() {
                raw = app.state.get_state_raw(&sid).await.map_err(svc(request_id))?;
            }
        }
    }

    let Some(raw) = raw else {
        return Err(ApiFailure::new(ApiError::not_found("State", session_id), request_id));
    };

    let etag = format!("\"{}\"", state_hash_hex(&raw));
    Ok((
        StatusCode::OK,
        [
            (header::ETAG, etag),
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
        ],
        raw,
    )
        .into_response())
}

pub async fn upload(
    State(app): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> Result<Response, ApiFailure> {
    if body.len() < 2 {
        return Err(ApiFailure::new(
            ApiError::validation_field(
                "State payload is truncated",
                "body",
                "State must be at least 2 bytes",
                "invalid_state",
            ),
            request_id,
        ));
    }
    if body[0] != STATE_VERSION {
        return Err(ApiFailure::new(
            ApiError::validation_field(
                format!("Unsupported state version: {:#04x}", body[0]),
                "body",
                format!("Expected version byte {STATE_VERSION:#04x}"),
                "invalid_state_version",
            ),
            request_id,
        ));
    }

    let sid = SessionId::from_string(&session_id);
    app.state
        .save_state_raw(&sid, &body, None, true)
        .await
        .map_err(svc(request_id))?;

    tracing::info!(
        session_id = %sid.short(12),
        size = body.len(),
        "state uploaded"
    );
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"message": "state_uploaded", "size": body.len()})),
    )
        .into_response())
}

pub async fn info(
    State(app): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiFailure> {
    let sid = SessionId::from_string(&session_id);

    if let Some(info) = app.state.state_info(&sid).await.map_err(svc(request_id))? {
        return Ok(Json(serde_json::json!({
            "exists": true,
            "source": StateSource::Redis,
            "size_bytes": info.size_bytes,
            "hash": info.hash,
            "created_at": info.created_at.map(|d| d.to_rfc3339()),
            "expires_at": info.expires_at.map(|d| d.to_rfc3339()),
        })));
    }

    if let Some(archive) = &app.archive {
        if archive.exists(&sid).await.map_err(svc(request_id))? {
            return Ok(Json(serde_json::json!({
                "exists": true,
                "source": StateSource::Archive,
            })));
        }
    }

    Ok(Json(serde_json::json!({"exists": false, "source": null})))
}

pub async fn delete(
    State(app): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiFailure> {
    let sid = SessionId::from_string(&session_id);
    app.state.delete_state(&sid).await.map_err(svc(request_id))?;
    if let Some(archive) = &app.archive {
        archive.delete(&sid).await.map_err(svc(request_id))?;
    }
    // 204 regardless of prior existence
    Ok(StatusCode::NO_CONTENT)
}
