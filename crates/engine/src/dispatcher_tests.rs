// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use runcell_core::OutputKind;
use runcell_sandbox::pool::PoolTimings;
use runcell_sandbox::{FakeRuntime, JobTimings, PoolConfig};
use yare::parameterized;

async fn sidecar_stub(stdout: &'static str, exit_code: i32) -> (String, u16) {
    use axum::routing::{get, post};
    use axum::{Json, Router};
    let app = Router::new()
        .route(
            "/files",
            get(|| async {
                Json(serde_json::json!({"files": [{"path": "/mnt/data/out.txt", "size": 5}]}))
            })
            .post(|| async {}),
        )
        .route(
            "/execute",
            post(move || async move {
                Json(serde_json::json!({
                    "exit_code": exit_code,
                    "stdout": stdout,
                    "stderr": "",
                    "execution_time_ms": 3,
                }))
            }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr.ip().to_string(), addr.port())
}

fn request(language: Language) -> ExecuteCodeRequest {
    ExecuteCodeRequest {
        execution_id: ExecutionId::new(),
        session_id: SessionId::new(),
        code: "print('x')".into(),
        language,
        timeout_secs: 30,
        files: Vec::new(),
        initial_state: None,
        capture_state: false,
    }
}

fn fast_pool_timings() -> PoolTimings {
    PoolTimings {
        ready_poll_interval: Duration::from_millis(5),
        ready_timeout: Duration::from_millis(200),
        replenish_interval: Duration::from_secs(600),
        health_interval: Duration::from_secs(600),
    }
}

async fn dispatcher_with(
    runtime: Arc<FakeRuntime>,
    pool_configs: Vec<(Language, PoolConfig)>,
    acquire_timeout: Duration,
    event_tx: Option<mpsc::UnboundedSender<Event>>,
) -> ExecutionDispatcher<FakeRuntime> {
    let pools = Arc::new(PoolManager::new(
        Arc::clone(&runtime),
        pool_configs,
        event_tx.clone(),
        fast_pool_timings(),
    ));
    pools.start().await;
    let jobs = JobExecutor::with_timings(
        Arc::clone(&runtime),
        JobTimings {
            ready_poll_interval: Duration::from_millis(5),
            ready_timeout: Duration::from_millis(100),
        },
    );
    let config = DispatcherConfig { acquire_timeout, ..Default::default() };
    ExecutionDispatcher::new(runtime, pools, jobs, config, event_tx)
}

fn pooled_config(language: Language, size: usize, port: u16) -> (Language, PoolConfig) {
    let mut spec = SandboxSpec::new(language, "runcell/img:latest", "runcell/sidecar:latest");
    spec.sidecar_port = port;
    (language, PoolConfig { pool_size: size, spec })
}

#[tokio::test]
async fn pool_hit_executes_and_returns_handle() {
    let (ip, port) = sidecar_stub("py: 55\n", 0).await;
    let runtime = Arc::new(FakeRuntime::new());
    runtime.set_pod_ip(ip);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let dispatcher = dispatcher_with(
        runtime,
        vec![pooled_config(Language::Py, 1, port)],
        Duration::from_secs(1),
        Some(tx),
    )
    .await;

    let outcome = dispatcher.execute_code(request(Language::Py)).await;
    assert_eq!(outcome.source, ExecSource::PoolHit);
    assert!(outcome.handle.is_some());
    assert_eq!(outcome.record.status, ExecutionStatus::Completed);
    let stdout: Vec<_> = outcome.record.outputs_of(OutputKind::Stdout).collect();
    assert_eq!(stdout[0].content, "py: 55");
    // pool path lists generated files
    assert_eq!(outcome.record.outputs_of(OutputKind::File).count(), 1);

    let mut names = Vec::new();
    while let Ok(event) = rx.try_recv() {
        names.push(event.name());
    }
    assert!(names.contains(&"execution:started"));
    assert!(names.contains(&"sandbox:acquired_from_pool"));
}

#[tokio::test]
async fn exhausted_pool_falls_back_to_job_as_pool_miss() {
    let (ip, port) = sidecar_stub("late\n", 0).await;
    let runtime = Arc::new(FakeRuntime::new());
    runtime.set_pod_ip(ip.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let dispatcher = dispatcher_with(
        runtime.clone(),
        vec![pooled_config(Language::Py, 1, port)],
        Duration::from_millis(30),
        Some(tx),
    )
    .await;

    // drain the single warm sandbox
    let first = dispatcher.execute_code(request(Language::Py)).await;
    assert_eq!(first.source, ExecSource::PoolHit);

    let second = dispatcher.execute_code(request(Language::Py)).await;
    assert_eq!(second.source, ExecSource::PoolMiss);
    assert!(second.handle.is_none());
    assert_eq!(second.record.status, ExecutionStatus::Completed);

    let names: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok().map(|e| e.name())).collect();
    assert!(names.contains(&"pool:exhausted"));
    assert!(names.contains(&"sandbox:created_fresh"));
}

#[tokio::test]
async fn size_zero_pool_goes_straight_to_job() {
    let (ip, port) = sidecar_stub("go: sum(1..10)=55\n", 0).await;
    let runtime = Arc::new(FakeRuntime::new());
    runtime.set_pod_ip(ip);
    // a configured language with pool_size 0 never touches the pool
    let dispatcher = dispatcher_with(
        runtime,
        vec![pooled_config(Language::Go, 0, port)],
        Duration::from_secs(1),
        None,
    )
    .await;

    let mut req = request(Language::Go);
    req.code = "package main".into();
    let outcome = dispatcher.execute_code(req).await;
    assert_eq!(outcome.source, ExecSource::Job);
    assert!(outcome.handle.is_none());
    assert_eq!(outcome.record.status, ExecutionStatus::Completed);
    let stdout: Vec<_> = outcome.record.outputs_of(OutputKind::Stdout).collect();
    assert_eq!(stdout[0].content, "go: sum(1..10)=55");
}

#[tokio::test]
async fn unavailable_runtime_fails_without_erroring() {
    let runtime = Arc::new(FakeRuntime::new());
    runtime.set_available(false);
    let dispatcher = dispatcher_with(runtime, vec![], Duration::from_secs(1), None).await;

    let outcome = dispatcher.execute_code(request(Language::Py)).await;
    assert_eq!(outcome.record.status, ExecutionStatus::Failed);
    assert!(outcome.handle.is_none());
    let stderr: Vec<_> = outcome.record.outputs_of(OutputKind::Stderr).collect();
    assert!(stderr[0].content.contains("runtime unavailable"), "{}", stderr[0].content);
}

#[tokio::test]
async fn destroy_handle_releases_to_runtime() {
    let (ip, port) = sidecar_stub("x", 0).await;
    let runtime = Arc::new(FakeRuntime::new());
    runtime.set_pod_ip(ip);
    let dispatcher = dispatcher_with(
        runtime.clone(),
        vec![pooled_config(Language::Py, 1, port)],
        Duration::from_secs(1),
        None,
    )
    .await;

    let outcome = dispatcher.execute_code(request(Language::Py)).await;
    let handle = outcome.handle.unwrap();
    let before = runtime.deleted_sandboxes().len();
    dispatcher.destroy_handle(&handle).await;
    assert_eq!(runtime.deleted_sandboxes().len(), before + 1);
}

// --- build_record ---

fn sidecar_result(exit_code: i32, stdout: &str, stderr: &str) -> SidecarResult {
    SidecarResult {
        exit_code,
        stdout: stdout.into(),
        stderr: stderr.into(),
        execution_time_ms: 10,
        state: None,
        state_errors: None,
    }
}

#[parameterized(
    completed = { 0, ExecutionStatus::Completed },
    timeout = { 124, ExecutionStatus::Timeout },
    failed = { 1, ExecutionStatus::Failed },
    segfault = { 139, ExecutionStatus::Failed },
)]
fn exit_codes_map_to_statuses(exit_code: i32, expected: ExecutionStatus) {
    let record = build_record(
        &request(Language::Py),
        Utc::now(),
        &sidecar_result(exit_code, "", ""),
        &[],
    );
    assert_eq!(record.status, expected);
    assert_eq!(record.exit_code, Some(exit_code));
}

#[test]
fn empty_and_whitespace_outputs_are_dropped() {
    let record = build_record(
        &request(Language::Py),
        Utc::now(),
        &sidecar_result(0, "  \n", "\t"),
        &[],
    );
    assert!(record.outputs.is_empty());
}

#[test]
fn outputs_are_trimmed() {
    let record = build_record(
        &request(Language::Py),
        Utc::now(),
        &sidecar_result(0, "py: 55\n", "warning\n"),
        &[],
    );
    assert_eq!(record.outputs.len(), 2);
    assert_eq!(record.outputs[0].content, "py: 55");
    assert_eq!(record.outputs[1].content, "warning");
}

#[test]
fn failed_without_stderr_synthesizes_error_message() {
    let record = build_record(
        &request(Language::Py),
        Utc::now(),
        &sidecar_result(2, "", ""),
        &[],
    );
    assert_eq!(record.error_message.as_deref(), Some("Execution failed with exit code 2"));
}

#[test]
fn timeout_keeps_sidecar_message() {
    let result = SidecarResult::timed_out(30);
    let record = build_record(&request(Language::Py), Utc::now(), &result, &[]);
    assert_eq!(record.status, ExecutionStatus::Timeout);
    assert!(record.error_message.unwrap().contains("timed out after 30 seconds"));
}

#[test]
fn generated_files_become_file_outputs() {
    let listed = vec![SidecarFile { path: "/mnt/data/out.txt".into(), size: 5 }];
    let record = build_record(
        &request(Language::Py),
        Utc::now(),
        &sidecar_result(0, "done", ""),
        &listed,
    );
    let files: Vec<_> = record.outputs_of(OutputKind::File).collect();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].content, "/mnt/data/out.txt");
    assert_eq!(files[0].size, Some(5));
}
