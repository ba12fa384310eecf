// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `POST /exec` — the one-shot execution endpoint.
//!
//! A thin shell over the orchestrator: a snippet that crashes or times
//! out still answers 200 with the captured stderr; only validation, auth,
//! and service failures surface as error statuses.

use crate::auth::ApiKeyContext;
use crate::error::ApiFailure;
use crate::state::AppState;
use axum::extract::State;
use axum::{Extension, Json};
use runcell_core::RequestId;
use runcell_engine::{ExecRequest, ExecResponse};

pub async fn execute(
    State(app): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Extension(api_key): Extension<ApiKeyContext>,
    Json(request): Json<ExecRequest>,
) -> Result<Json<ExecResponse>, ApiFailure> {
    tracing::info!(
        request_id = %request_id.short(8),
        language = request.lang,
        code_length = request.code.len(),
        entity_id = request.entity_id.as_deref().unwrap_or(""),
        "code execution request"
    );

    let response = app
        .orchestrator
        .execute(request, request_id, api_key.key_hash.clone())
        .await
        .map_err(|e| ApiFailure::new(e, request_id))?;

    tracing::info!(
        request_id = %request_id.short(8),
        session_id = response.session_id,
        "code execution request completed"
    );
    Ok(Json(response))
}
