// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared by every layer.
//!
//! Each [`ApiError`] carries a stable kind (serialized into error bodies as
//! `error_type`) and maps to one HTTP status. Lower layers return their own
//! errors (`StoreError`, `SandboxError`) and the orchestrator folds anything
//! it cannot resolve into `ServiceUnavailable`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error categories with their HTTP status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Authentication,
    Authorization,
    Validation,
    ResourceNotFound,
    ResourceConflict,
    ResourceExhausted,
    ExecutionFailed,
    Timeout,
    RateLimited,
    InternalServer,
    ServiceUnavailable,
    ExternalService,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Authentication => "authentication",
            ErrorKind::Authorization => "authorization",
            ErrorKind::Validation => "validation",
            ErrorKind::ResourceNotFound => "resource_not_found",
            ErrorKind::ResourceConflict => "resource_conflict",
            ErrorKind::ResourceExhausted => "resource_exhausted",
            ErrorKind::ExecutionFailed => "execution_failed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::InternalServer => "internal_server",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::ExternalService => "external_service",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::Authentication => 401,
            ErrorKind::Authorization => 403,
            ErrorKind::Validation => 400,
            ErrorKind::ResourceNotFound => 404,
            ErrorKind::ResourceConflict => 409,
            ErrorKind::ResourceExhausted => 429,
            ErrorKind::ExecutionFailed => 422,
            ErrorKind::Timeout => 408,
            ErrorKind::RateLimited => 429,
            ErrorKind::InternalServer => 500,
            ErrorKind::ServiceUnavailable => 503,
            ErrorKind::ExternalService => 502,
        }
    }
}

/// Per-field detail attached to validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorDetail {
    pub fn new(field: impl Into<String>, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self { field: Some(field.into()), message: message.into(), code: Some(code.into()) }
    }
}

/// Service-level error, surfaced to callers through the HTTP error body.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("{message}")]
    Authentication { message: String },

    #[error("{message}")]
    Authorization { message: String },

    #[error("{message}")]
    Validation { message: String, details: Vec<ErrorDetail> },

    #[error("{resource} not found{}", .id.as_ref().map(|i| format!(": {i}")).unwrap_or_default())]
    ResourceNotFound { resource: String, id: Option<String> },

    #[error("{message}")]
    ResourceConflict { message: String },

    #[error("{resource} limit exceeded")]
    ResourceExhausted { resource: String },

    #[error("{message}")]
    ExecutionFailed { message: String },

    #[error("{operation} timed out after {seconds} seconds")]
    Timeout { operation: String, seconds: u64 },

    #[error("{message}")]
    RateLimited { message: String },

    #[error("{message}")]
    Internal { message: String },

    #[error("{message}")]
    ServiceUnavailable { service: String, message: String },

    #[error("external service error: {service}: {message}")]
    ExternalService { service: String, message: String },
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation { message: message.into(), details: Vec::new() }
    }

    pub fn validation_field(
        message: impl Into<String>,
        field: impl Into<String>,
        detail: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        ApiError::Validation {
            message: message.into(),
            details: vec![ErrorDetail::new(field, detail, code)],
        }
    }

    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        ApiError::ResourceNotFound { resource: resource.into(), id: Some(id.into()) }
    }

    pub fn unavailable(service: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable { service: service.into(), message: message.into() }
    }

    pub fn timeout(operation: impl Into<String>, seconds: u64) -> Self {
        ApiError::Timeout { operation: operation.into(), seconds }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Authentication { .. } => ErrorKind::Authentication,
            ApiError::Authorization { .. } => ErrorKind::Authorization,
            ApiError::Validation { .. } => ErrorKind::Validation,
            ApiError::ResourceNotFound { .. } => ErrorKind::ResourceNotFound,
            ApiError::ResourceConflict { .. } => ErrorKind::ResourceConflict,
            ApiError::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            ApiError::ExecutionFailed { .. } => ErrorKind::ExecutionFailed,
            ApiError::Timeout { .. } => ErrorKind::Timeout,
            ApiError::RateLimited { .. } => ErrorKind::RateLimited,
            ApiError::Internal { .. } => ErrorKind::InternalServer,
            ApiError::ServiceUnavailable { .. } => ErrorKind::ServiceUnavailable,
            ApiError::ExternalService { .. } => ErrorKind::ExternalService,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }

    pub fn details(&self) -> &[ErrorDetail] {
        match self {
            ApiError::Validation { details, .. } => details,
            _ => &[],
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
