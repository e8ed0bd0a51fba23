// Backend boundary: the start-and-poll surface the monitors drive

pub mod client;
pub mod errors;

#[cfg(test)]
pub mod mocks;

use async_trait::async_trait;

use crate::tasks::types::{TaskId, TaskKindId};

pub use client::HttpTaskBackend;
pub use errors::{error_detail_message, BackendError};

/// Start-and-poll interface of the backend that executes each stage.
///
/// Bodies are JSON values; the task kinds own the typed decoding so this trait
/// stays object safe and easy to script in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskBackend: Send + Sync {
    /// Issue the start call and return the backend-assigned task id
    async fn start_task(
        &self,
        kind: TaskKindId,
        body: Option<serde_json::Value>,
    ) -> Result<TaskId, BackendError>;

    /// Fetch the current status document of a started task
    async fn fetch_status(
        &self,
        kind: TaskKindId,
        id: &TaskId,
    ) -> Result<serde_json::Value, BackendError>;
}

/// Read the task id from a start response, accepting `taskId` or the kind's legacy key
pub fn extract_task_id(kind: TaskKindId, body: &serde_json::Value) -> Result<TaskId, BackendError> {
    std::iter::once("taskId")
        .chain(kind.legacy_id_fields().iter().copied())
        .filter_map(|field| body.get(field))
        .find_map(|value| match value {
            serde_json::Value::String(s) if !s.is_empty() => Some(TaskId::new(s.clone())),
            serde_json::Value::Number(n) => Some(TaskId::new(n.to_string())),
            _ => None,
        })
        .ok_or_else(|| BackendError::Protocol(format!("missing {kind} task ID")))
}
