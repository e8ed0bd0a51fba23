// Monitor lifecycle scenarios against scripted and mocked backends.
// Every test runs on a paused clock, so poll intervals elapse instantly.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::backend::mocks::ScriptedBackend;
use crate::backend::{BackendError, MockTaskBackend};
use crate::events::{EventBus, PipelineEvent};
use crate::tasks::*;

const INTERVAL: Duration = Duration::from_millis(1000);

fn setup<K: TaskKind>() -> (Arc<ScriptedBackend>, Arc<EventBus>, TaskMonitor<K>) {
    let backend = Arc::new(ScriptedBackend::new());
    let bus = Arc::new(EventBus::default());
    let monitor = TaskMonitor::<K>::new(backend.clone(), bus.clone(), INTERVAL);
    (backend, bus, monitor)
}

/// Let spawned poll loops run without reaching the next interval
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

fn drain(rx: &mut broadcast::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn import_batch() -> JobBatch {
    JobBatch::new(
        vec![
            JobStatusEntry::new("1", JobChange::New),
            JobStatusEntry::new("2", JobChange::Changed),
        ],
        Some("/tmp/validated".to_string()),
    )
}

#[tokio::test(start_paused = true)]
async fn test_export_runs_to_completion() {
    let (backend, bus, monitor) = setup::<ExportTask>();
    let mut rx = bus.receiver();
    backend.push_status(
        TaskKindId::Export,
        json!({"status": "running", "output": "exporting", "progress": {"total_jobs": 4, "exported_modified": 1}}),
    );
    backend.push_status(
        TaskKindId::Export,
        json!({"status": "completed", "output": "", "progress": {"total_jobs": 4, "exported_modified": 2, "exported_unchanged": 1}}),
    );

    let id = monitor.start(()).await.unwrap();
    assert_eq!(id, TaskId::new("export-1"));
    assert!(monitor.is_in_progress());

    settle().await;
    assert_eq!(monitor.status(), TaskStatus::Running);
    assert_eq!(monitor.snapshot().progress.summary.percent_complete, 25);

    tokio::time::sleep(INTERVAL).await;
    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.status, TaskStatus::Completed);
    // Empty output on the final poll keeps the previous text
    assert_eq!(snapshot.output, "exporting");
    // Finalized on completion even though counters lag
    assert_eq!(snapshot.progress.summary.processed, 4);
    assert_eq!(snapshot.progress.summary.percent_complete, 100);
    assert!(!monitor.is_in_progress());
    assert!(!monitor.is_polling());

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    match &events[0] {
        PipelineEvent::TaskCompleted { origin, kind, result } => {
            assert_eq!(*origin, monitor.id());
            assert_eq!(*kind, TaskKindId::Export);
            assert_eq!(result.status, TaskStatus::Completed);
            assert_eq!(result.task_id, Some(TaskId::new("export-1")));
        }
        other => panic!("unexpected event {other:?}"),
    }

    // No further polls once terminal
    tokio::time::sleep(INTERVAL * 5).await;
    assert_eq!(backend.status_calls(TaskKindId::Export), 2);
}

#[tokio::test(start_paused = true)]
async fn test_polls_once_per_interval() {
    let (backend, _bus, monitor) = setup::<ExportTask>();
    monitor.start(()).await.unwrap();

    settle().await;
    assert_eq!(backend.status_calls(TaskKindId::Export), 1);

    tokio::time::sleep(Duration::from_millis(990)).await;
    assert_eq!(backend.status_calls(TaskKindId::Export), 1);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(backend.status_calls(TaskKindId::Export), 2);

    tokio::time::sleep(INTERVAL * 3).await;
    assert_eq!(backend.status_calls(TaskKindId::Export), 5);
}

#[tokio::test(start_paused = true)]
async fn test_second_start_is_rejected_while_running() {
    let (backend, _bus, monitor) = setup::<ExportTask>();
    monitor.start(()).await.unwrap();

    let err = monitor.start(()).await.unwrap_err();
    assert!(matches!(
        err,
        StartError::AlreadyInProgress {
            kind: TaskKindId::Export,
            ..
        }
    ));
    assert_eq!(backend.start_calls(TaskKindId::Export), 1);
    assert_eq!(monitor.task_id(), Some(TaskId::new("export-1")));
    assert_eq!(monitor.status(), TaskStatus::Running);
    assert!(monitor.is_polling());

    // The existing session keeps its cadence
    tokio::time::sleep(INTERVAL + Duration::from_millis(1)).await;
    assert_eq!(backend.status_calls(TaskKindId::Export), 2);
}

#[tokio::test(start_paused = true)]
async fn test_armed_session_rejects_start_after_non_active_status() {
    let (backend, _bus, monitor) = setup::<ExportTask>();
    backend.push_status(TaskKindId::Export, json!({"status": "completed_no_changes"}));
    monitor.start(()).await.unwrap();
    settle().await;
    assert_eq!(monitor.status(), TaskStatus::CompletedNoChanges);

    let err = monitor.start(()).await.unwrap_err();
    assert!(matches!(
        err,
        StartError::AlreadyInProgress {
            status: TaskStatus::CompletedNoChanges,
            ..
        }
    ));
    assert_eq!(backend.start_calls(TaskKindId::Export), 1);
    assert_eq!(monitor.status(), TaskStatus::CompletedNoChanges);
    assert!(monitor.is_polling());
    monitor.stop_polling();
}

#[tokio::test(start_paused = true)]
async fn test_unknown_backend_status_keeps_polling() {
    let (backend, _bus, monitor) = setup::<ImportTask>();
    backend.push_status(TaskKindId::Import, json!({"status": "pending"}));
    monitor.start(import_batch()).await.unwrap();

    tokio::time::sleep(INTERVAL * 2 + Duration::from_millis(1)).await;
    assert_eq!(monitor.status(), TaskStatus::Running);
    assert!(monitor.is_polling());
    assert_eq!(backend.status_calls(TaskKindId::Import), 3);
}

#[tokio::test(start_paused = true)]
async fn test_completed_with_failed_items_is_reclassified() {
    let (backend, bus, monitor) = setup::<ImportTask>();
    let mut rx = bus.receiver();
    backend.push_status(
        TaskKindId::Import,
        json!({
            "status": "completed",
            "output": "done",
            "jobImportStatuses": [
                {"jobName": "1", "importStatus": "completed"},
                {"jobName": "2", "importStatus": "error", "errorMessage": "bad cron"}
            ],
            "progress": {"imported": 1, "failed_jobs": 1}
        }),
    );

    monitor.start(import_batch()).await.unwrap();
    settle().await;

    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.status, TaskStatus::CompletedWithErrors);
    assert_eq!(snapshot.progress.summary.percent_complete, 100);
    assert_eq!(snapshot.job_records.len(), 2);

    let names: Vec<_> = drain(&mut rx).iter().map(PipelineEvent::name).collect();
    assert_eq!(names, vec!["import-completed", "refresh-workspace-info"]);
}

#[tokio::test(start_paused = true)]
async fn test_backend_failure_publishes_completion() {
    let (backend, bus, monitor) = setup::<DeleteTask>();
    let mut rx = bus.receiver();
    backend.push_status(
        TaskKindId::Delete,
        json!({"status": "failed", "output": "boom", "progress": {"deleted": 0, "failed_jobs": 0}}),
    );

    let batch = JobBatch::new(vec![JobStatusEntry::new("2", JobChange::Deleted)], None);
    monitor.start(batch).await.unwrap();
    settle().await;

    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.status, TaskStatus::Failed);
    assert_eq!(snapshot.failure, Some(FailureCause::BackendReported));
    // Failed tasks keep their real progress
    assert_eq!(snapshot.progress.summary.percent_complete, 0);
    assert!(matches!(
        drain(&mut rx).first(),
        Some(PipelineEvent::TaskCompleted { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_poll_transport_error_ends_session() {
    let (backend, bus, monitor) = setup::<ExportTask>();
    let mut rx = bus.receiver();
    backend.push_status(
        TaskKindId::Export,
        json!({"status": "running", "output": "step 1"}),
    );
    backend.push_status_error(
        TaskKindId::Export,
        BackendError::Transport("connection reset".to_string()),
    );

    monitor.start(()).await.unwrap();
    tokio::time::sleep(INTERVAL + Duration::from_millis(1)).await;

    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.status, TaskStatus::Failed);
    assert_eq!(snapshot.failure, Some(FailureCause::Transport));
    assert_eq!(snapshot.output, "step 1\nError: connection reset");
    assert!(!monitor.is_polling());

    let events = drain(&mut rx);
    assert!(matches!(
        &events[..],
        [PipelineEvent::TaskAborted { message, .. }] if message == "connection reset"
    ));

    tokio::time::sleep(INTERVAL * 3).await;
    assert_eq!(backend.status_calls(TaskKindId::Export), 2);

    // A failed task no longer holds the guard
    monitor.start(()).await.unwrap();
    assert_eq!(backend.start_calls(TaskKindId::Export), 2);
}

#[tokio::test(start_paused = true)]
async fn test_missing_status_field_is_protocol_violation() {
    let (backend, _bus, monitor) = setup::<ExportTask>();
    backend.push_status(TaskKindId::Export, json!({"output": "???"}));

    monitor.start(()).await.unwrap();
    settle().await;

    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.status, TaskStatus::Failed);
    assert_eq!(snapshot.failure, Some(FailureCause::ProtocolViolation));
    assert_eq!(snapshot.output, "Error: Invalid response: missing status field");
}

#[tokio::test(start_paused = true)]
async fn test_invalid_payload_never_reaches_backend() {
    let (backend, bus, monitor) = setup::<ImportTask>();
    let mut rx = bus.receiver();

    let err = monitor
        .start(JobBatch::new(Vec::new(), Some("/tmp".to_string())))
        .await
        .unwrap_err();

    assert_eq!(err, StartError::InvalidPayload("No jobs specified for import".into()));
    assert!(backend.calls().is_empty());
    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.status, TaskStatus::Failed);
    assert_eq!(snapshot.output, "Error: No jobs specified for import");
    assert_eq!(snapshot.failure, Some(FailureCause::StartRejected));
    assert_eq!(drain(&mut rx).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_start_replaces_output() {
    let mut mock = MockTaskBackend::new();
    mock.expect_start_task().times(1).returning(|_, _| {
        Err(BackendError::Rejected {
            status: 409,
            message: "Validation already running".to_string(),
        })
    });
    mock.expect_fetch_status().never();

    let bus = Arc::new(EventBus::default());
    let monitor = ValidationMonitor::new(Arc::new(mock), bus.clone(), INTERVAL);

    let err = monitor.start(()).await.unwrap_err();
    assert!(matches!(err, StartError::Backend(BackendError::Rejected { status: 409, .. })));
    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.status, TaskStatus::Failed);
    assert_eq!(snapshot.output, "Error: Validation already running");
    assert_eq!(
        snapshot.message.as_deref(),
        Some("Error: Validation already running")
    );
    assert!(!monitor.is_in_progress());
}

#[tokio::test(start_paused = true)]
async fn test_export_start_error_appends_raw_message() {
    let mut mock = MockTaskBackend::new();
    mock.expect_start_task()
        .returning(|_, _| Err(BackendError::Transport("connection refused".to_string())));

    let monitor = ExportMonitor::new(Arc::new(mock), Arc::new(EventBus::default()), INTERVAL);
    monitor.start(()).await.unwrap_err();

    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.output, "connection refused");
    assert_eq!(snapshot.failure, Some(FailureCause::Transport));
}

#[tokio::test(start_paused = true)]
async fn test_validation_stops_on_wider_terminal_set() {
    let (backend, bus, monitor) = setup::<ValidationTask>();
    let mut rx = bus.receiver();
    backend.push_status(
        TaskKindId::Validation,
        json!({
            "status": "completed_with_warnings",
            "taskIssues": [{"severity": "warning"}],
            "jobStatuses": [
                {"file_name": "1", "status": "new"},
                {"file_name": "2", "status": "deleted"},
                {"file_name": "3", "status": "unchanged"}
            ],
            "logRecords": ["checked 3 jobs\n"],
            "tempDir": "/tmp/v1",
            "progress": {"total_items": 3, "processed_items": 2}
        }),
    );

    monitor.start(()).await.unwrap();
    settle().await;

    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.status, TaskStatus::CompletedWithWarnings);
    assert_eq!(snapshot.output, "checked 3 jobs\n");
    assert_eq!(snapshot.temp_dir.as_deref(), Some("/tmp/v1"));
    assert_eq!(snapshot.progress.summary.percent_complete, 100);
    assert!(!monitor.is_polling());

    let events = drain(&mut rx);
    let Some(PipelineEvent::TaskCompleted { result, .. }) = events.first() else {
        panic!("expected completion, got {events:?}");
    };
    let summary = result.summary.unwrap();
    assert_eq!((summary.new, summary.deleted, summary.unchanged), (1, 1, 1));
    // Validation does not refresh the workspace
    assert_eq!(events.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_export_keeps_polling_on_validation_only_statuses() {
    let (backend, _bus, monitor) = setup::<ExportTask>();
    backend.push_status(TaskKindId::Export, json!({"status": "completed_no_changes"}));

    monitor.start(()).await.unwrap();
    tokio::time::sleep(INTERVAL + Duration::from_millis(1)).await;

    assert_eq!(monitor.status(), TaskStatus::CompletedNoChanges);
    assert!(monitor.is_polling());
    assert!(monitor.is_in_progress());
    assert_eq!(backend.status_calls(TaskKindId::Export), 2);
    monitor.stop_polling();
}

#[tokio::test(start_paused = true)]
async fn test_stop_polling_is_idempotent() {
    let (backend, _bus, monitor) = setup::<ExportTask>();
    monitor.start(()).await.unwrap();
    settle().await;

    assert!(monitor.stop_polling());
    assert!(!monitor.stop_polling());

    tokio::time::sleep(INTERVAL * 3).await;
    assert_eq!(backend.status_calls(TaskKindId::Export), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reset_clears_task_and_frees_guard() {
    let (backend, bus, monitor) = setup::<ExportTask>();
    let mut rx = bus.receiver();
    monitor.start(()).await.unwrap();
    settle().await;

    monitor.reset();
    assert_eq!(monitor.snapshot(), TaskSnapshot::default());
    assert!(!monitor.is_in_progress());

    tokio::time::sleep(INTERVAL * 2).await;
    assert_eq!(backend.status_calls(TaskKindId::Export), 1);
    assert!(drain(&mut rx).is_empty());

    assert_eq!(monitor.start(()).await.unwrap(), TaskId::new("export-2"));
}
