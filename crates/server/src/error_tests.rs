// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use http_body_util::BodyExt;

async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn validation_errors_render_with_details() {
    let failure = ApiFailure::new(
        ApiError::validation_field("Code cannot be empty", "code", "required", "empty_code"),
        RequestId::from_string("req-1"),
    );
    let response = failure.into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"], "Code cannot be empty");
    assert_eq!(body["error_type"], "validation");
    assert_eq!(body["details"][0]["field"], "code");
    assert_eq!(body["request_id"], "req-1");
    assert!(body["timestamp"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn unavailable_maps_to_503_without_details() {
    let failure: ApiFailure = ApiError::unavailable("Code Execution", "backend down").into();
    let response = failure.into_response();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body = body_json(response).await;
    assert_eq!(body["error_type"], "service_unavailable");
    assert!(body.get("details").is_none());
    assert!(body.get("request_id").is_none());
}
