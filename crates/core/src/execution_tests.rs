// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn record_with_outputs(outputs: Vec<ExecutionOutput>) -> ExecutionRecord {
    ExecutionRecord {
        execution_id: ExecutionId::new(),
        session_id: SessionId::new(),
        code: "print(1)".into(),
        language: Language::Py,
        status: ExecutionStatus::Completed,
        created_at: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
        started_at: None,
        completed_at: None,
        outputs,
        exit_code: Some(0),
        error_message: None,
        execution_time_ms: Some(12),
        memory_peak_mb: None,
    }
}

#[test]
fn outputs_of_filters_by_kind_preserving_order() {
    let record = record_with_outputs(vec![
        ExecutionOutput::stdout("a"),
        ExecutionOutput::stderr("x"),
        ExecutionOutput::stdout("b"),
        ExecutionOutput::file("/mnt/data/out.txt", Some(5)),
    ]);
    let stdout: Vec<_> = record.outputs_of(OutputKind::Stdout).map(|o| o.content.as_str()).collect();
    assert_eq!(stdout, vec!["a", "b"]);
    assert_eq!(record.outputs_of(OutputKind::File).count(), 1);
}

#[test]
fn only_completed_is_success() {
    assert!(ExecutionStatus::Completed.is_success());
    for status in [
        ExecutionStatus::Pending,
        ExecutionStatus::Running,
        ExecutionStatus::Failed,
        ExecutionStatus::Timeout,
        ExecutionStatus::Cancelled,
    ] {
        assert!(!status.is_success());
    }
}

#[test]
fn output_serializes_with_type_tag() {
    let json = serde_json::to_value(ExecutionOutput::stdout("hi")).unwrap();
    assert_eq!(json["type"], "stdout");
    assert_eq!(json["content"], "hi");
    assert!(json.get("mime_type").is_none());
}
