// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error responses.
//!
//! Every error leaving the HTTP layer serializes as
//! `{error, error_type, details?, request_id?, timestamp}` with the status
//! code owned by the error kind. Handlers return [`ApiFailure`], which
//! pairs an [`ApiError`] with the request id injected by the middleware.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use runcell_core::{ApiError, ErrorDetail, ErrorKind, RequestId};
use serde::Serialize;

/// Wire shape of an error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub error_type: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ErrorDetail>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: f64,
}

/// An [`ApiError`] plus the request id it happened under.
#[derive(Debug)]
pub struct ApiFailure {
    pub error: ApiError,
    pub request_id: Option<RequestId>,
}

impl ApiFailure {
    pub fn new(error: ApiError, request_id: RequestId) -> Self {
        Self { error, request_id: Some(request_id) }
    }
}

impl From<ApiError> for ApiFailure {
    fn from(error: ApiError) -> Self {
        Self { error, request_id: None }
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.error.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let details = self.error.details();
        let body = ErrorBody {
            error: self.error.to_string(),
            error_type: self.error.kind(),
            details: (!details.is_empty()).then(|| details.to_vec()),
            request_id: self.request_id.map(|id| id.to_string()),
            timestamp: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
