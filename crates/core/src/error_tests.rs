// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    authentication = { ErrorKind::Authentication, 401 },
    authorization = { ErrorKind::Authorization, 403 },
    validation = { ErrorKind::Validation, 400 },
    not_found = { ErrorKind::ResourceNotFound, 404 },
    conflict = { ErrorKind::ResourceConflict, 409 },
    exhausted = { ErrorKind::ResourceExhausted, 429 },
    execution = { ErrorKind::ExecutionFailed, 422 },
    timeout = { ErrorKind::Timeout, 408 },
    rate_limited = { ErrorKind::RateLimited, 429 },
    internal = { ErrorKind::InternalServer, 500 },
    unavailable = { ErrorKind::ServiceUnavailable, 503 },
    external = { ErrorKind::ExternalService, 502 },
)]
fn status_codes(kind: ErrorKind, status: u16) {
    assert_eq!(kind.status_code(), status);
}

#[test]
fn validation_carries_field_details() {
    let err = ApiError::validation_field(
        "Unsupported programming language: fortranXX",
        "lang",
        "Language 'fortranXX' is not supported",
        "unsupported_language",
    );
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.status_code(), 400);
    assert_eq!(err.details().len(), 1);
    assert_eq!(err.details()[0].field.as_deref(), Some("lang"));
}

#[test]
fn timeout_message_names_operation_and_duration() {
    let err = ApiError::timeout("Code execution", 30);
    assert_eq!(err.to_string(), "Code execution timed out after 30 seconds");
}

#[test]
fn not_found_message_includes_id() {
    let err = ApiError::not_found("Session", "abc123");
    assert_eq!(err.to_string(), "Session not found: abc123");
    let bare = ApiError::ResourceNotFound { resource: "State".into(), id: None };
    assert_eq!(bare.to_string(), "State not found");
}

#[test]
fn kind_serializes_snake_case() {
    let json = serde_json::to_string(&ErrorKind::ServiceUnavailable).unwrap();
    assert_eq!(json, "\"service_unavailable\"");
}
