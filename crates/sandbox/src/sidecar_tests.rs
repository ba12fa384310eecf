// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sidecar client tests against an in-process HTTP stub.

use super::*;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use yare::parameterized;

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn stub() -> Router {
    Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .route("/ready", get(|| async { StatusCode::OK }))
        .route(
            "/files",
            get(|| async {
                Json(serde_json::json!({
                    "files": [{"path": "/mnt/data/out.txt", "size": 5}]
                }))
            })
            .post(|| async { StatusCode::OK }),
        )
        .route(
            "/files/*path",
            get(|Path(path): Path<String>| async move {
                if path == "out.txt" {
                    (StatusCode::OK, "hello".to_string())
                } else {
                    (StatusCode::NOT_FOUND, String::new())
                }
            }),
        )
        .route(
            "/execute",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["working_dir"], "/mnt/data");
                Json(serde_json::json!({
                    "exit_code": 0,
                    "stdout": "py: 55\n",
                    "stderr": "",
                    "execution_time_ms": 12,
                }))
            }),
        )
}

#[parameterized(
    absolute = { "/mnt/data/out.txt", Some("out.txt") },
    nested = { "/mnt/data/plots/fig.png", Some("plots/fig.png") },
    relative = { "out.txt", Some("out.txt") },
    dot_segments = { "/mnt/data/./a/../out.txt", Some("out.txt") },
    escape = { "/mnt/data/../../etc/passwd", None },
    outside = { "/etc/passwd", None },
    root_only = { "/mnt/data", None },
    sneaky_relative = { "../secrets", None },
)]
fn path_normalization(input: &str, expected: Option<&str>) {
    assert_eq!(data_relative_path(input).as_deref(), expected);
}

#[tokio::test]
async fn health_and_ready_probe_the_stub() {
    let base = serve(stub()).await;
    let client = SidecarClient::new();
    assert!(client.health(&base).await);
    assert!(client.ready(&base).await);
}

#[tokio::test]
async fn health_is_false_when_nothing_listens() {
    let client = SidecarClient::new();
    assert!(!client.health("http://127.0.0.1:9").await);
}

#[tokio::test]
async fn execute_round_trip() {
    let base = serve(stub()).await;
    let client = SidecarClient::new();
    let result = client.execute(&base, &ExecutePayload::new("print('x')", 30)).await;
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "py: 55\n");
    assert_eq!(result.execution_time_ms, 12);
    assert!(result.state.is_none());
}

#[tokio::test]
async fn non_200_becomes_sidecar_error_result() {
    let app = Router::new().route(
        "/execute",
        post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
    );
    let base = serve(app).await;
    let client = SidecarClient::new();
    let result = client.execute(&base, &ExecutePayload::new("x", 5)).await;
    assert_eq!(result.exit_code, 1);
    assert_eq!(result.stderr, "Sidecar error: 500");
}

#[tokio::test]
async fn transport_failure_becomes_execution_error_result() {
    let client = SidecarClient::new();
    let result = client
        .execute("http://127.0.0.1:9", &ExecutePayload::new("x", 5))
        .await;
    assert_eq!(result.exit_code, 1);
    assert!(result.stderr.starts_with("Execution error:"), "{}", result.stderr);
}

#[tokio::test]
async fn read_file_fetches_relative_paths_only() {
    let base = serve(stub()).await;
    let client = SidecarClient::new();

    let content = client.read_file(&base, "/mnt/data/out.txt").await.unwrap();
    assert_eq!(content, b"hello");

    // traversal is rejected locally, no request is made
    assert!(client.read_file(&base, "/mnt/data/../../etc/passwd").await.is_none());
    assert!(client.read_file(&base, "/mnt/data/missing.txt").await.is_none());
}

#[tokio::test]
async fn list_files_parses_the_listing() {
    let base = serve(stub()).await;
    let client = SidecarClient::new();
    let files = client.list_files(&base).await;
    assert_eq!(files, vec![SidecarFile { path: "/mnt/data/out.txt".into(), size: 5 }]);
}

#[tokio::test]
async fn timed_out_result_shape() {
    let result = SidecarResult::timed_out(30);
    assert_eq!(result.exit_code, 124);
    assert!(result.stderr.contains("timed out after 30 seconds"));
    assert_eq!(result.execution_time_ms, 30_000);
}
