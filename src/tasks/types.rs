// Task data model shared by every monitor and both pipelines

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::tasks::progress::TaskProgress;

/// Opaque task identifier issued by the backend on a successful start.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Backend task kinds. Each one owns a start endpoint and a status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKindId {
    Validation,
    Import,
    Delete,
    Export,
}

impl TaskKindId {
    /// Path of the start call, relative to the API prefix
    pub fn start_path(self) -> &'static str {
        match self {
            TaskKindId::Validation => "/pre-import-validation/start",
            TaskKindId::Import => "/import/start",
            TaskKindId::Delete => "/delete/start",
            TaskKindId::Export => "/export/start",
        }
    }

    /// Path of the status poll for a started task, relative to the API prefix
    pub fn status_path(self, id: &TaskId) -> String {
        let resource = match self {
            TaskKindId::Validation => "pre-import-validation",
            TaskKindId::Import => "import",
            TaskKindId::Delete => "delete",
            TaskKindId::Export => "export",
        };
        format!("/{resource}/{id}/status")
    }

    /// Legacy start-response keys still emitted by older backends
    pub fn legacy_id_fields(self) -> &'static [&'static str] {
        match self {
            TaskKindId::Validation => &["importValidationTaskId", "importTaskId"],
            TaskKindId::Import => &["importTaskId"],
            TaskKindId::Delete => &["deleteTaskId"],
            TaskKindId::Export => &["exportTaskId"],
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TaskKindId::Validation => "pre-import validation",
            TaskKindId::Import => "import",
            TaskKindId::Delete => "delete",
            TaskKindId::Export => "export",
        }
    }
}

impl fmt::Display for TaskKindId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle status of a task, as observed by the client.
///
/// Backend status strings outside the known set (`pending`, `in_progress`, ...)
/// are observed as `Running`: the task exists and has not finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Idle,
    Starting,
    Running,
    Completed,
    Failed,
    CompletedWithErrors,
    CompletedWithWarnings,
    CompletedNoChanges,
}

impl TaskStatus {
    /// Parse a backend status string. Returns `None` for an empty string, which
    /// the monitors treat as a protocol violation.
    pub fn from_backend(raw: &str) -> Option<Self> {
        let status = match raw.trim() {
            "" => return None,
            "idle" => TaskStatus::Idle,
            "completed" => TaskStatus::Completed,
            "failed" => TaskStatus::Failed,
            "completed_with_errors" => TaskStatus::CompletedWithErrors,
            "completed_with_warnings" => TaskStatus::CompletedWithWarnings,
            "completed_no_changes" => TaskStatus::CompletedNoChanges,
            _ => TaskStatus::Running,
        };
        Some(status)
    }

    /// Statuses that hold the re-entrancy guard regardless of the poll timer
    pub fn is_active(self) -> bool {
        matches!(self, TaskStatus::Starting | TaskStatus::Running)
    }

    /// The terminal set shared by every task kind
    pub fn is_common_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::CompletedWithErrors
        )
    }

    pub fn is_failure(self) -> bool {
        self == TaskStatus::Failed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Idle => "idle",
            TaskStatus::Starting => "starting",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::CompletedWithErrors => "completed_with_errors",
            TaskStatus::CompletedWithWarnings => "completed_with_warnings",
            TaskStatus::CompletedNoChanges => "completed_no_changes",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a validated job differs between the exported files and the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobChange {
    New,
    Changed,
    Unchanged,
    Deleted,
    Error,
}

impl JobChange {
    /// Jobs the import stage acts on
    pub fn needs_import(self) -> bool {
        matches!(self, JobChange::New | JobChange::Changed)
    }

    /// Jobs the delete stage acts on
    pub fn needs_delete(self) -> bool {
        self == JobChange::Deleted
    }
}

/// One entry of the validation job list.
///
/// Fields the client does not interpret, the job identifier included, are kept
/// in `extra` so the entry can be forwarded verbatim to the import and delete
/// start calls. Deleted jobs carry no file and are identified by `job_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_name: Option<String>,
    pub status: JobChange,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl JobStatusEntry {
    /// Identifier keys, most specific first
    const ID_FIELDS: [&'static str; 3] = ["file_name", "jobId", "id"];

    pub fn new(job_id: impl Into<String>, status: JobChange) -> Self {
        let mut extra = serde_json::Map::new();
        extra.insert(
            Self::ID_FIELDS[0].to_string(),
            serde_json::Value::String(job_id.into()),
        );
        Self {
            job_name: None,
            status,
            extra,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.job_name = Some(name.into());
        self
    }

    /// Opaque job identifier: the first string or numeric id field, else the
    /// job name
    pub fn job_id(&self) -> Option<String> {
        Self::ID_FIELDS
            .iter()
            .filter_map(|key| match self.extra.get(*key)? {
                serde_json::Value::String(id) => Some(id.clone()),
                serde_json::Value::Number(id) => Some(id.to_string()),
                _ => None,
            })
            .next()
            .or_else(|| self.job_name.clone())
    }
}

/// Counts of validated jobs per change category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobChangeSummary {
    pub new: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub error: usize,
}

impl JobChangeSummary {
    pub fn from_entries(entries: &[JobStatusEntry]) -> Self {
        entries.iter().fold(Self::default(), |mut summary, entry| {
            match entry.status {
                JobChange::New => summary.new += 1,
                JobChange::Changed => summary.changed += 1,
                JobChange::Unchanged => summary.unchanged += 1,
                JobChange::Deleted => summary.deleted += 1,
                JobChange::Error => summary.error += 1,
            }
            summary
        })
    }
}

/// Per-job outcome reported by the import and delete tasks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_name: String,
    pub status: String,
    pub error_message: Option<String>,
}

/// Why a monitoring session ended in `failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// The backend (or local payload validation) refused the start call
    StartRejected,
    /// The start or poll request never produced a usable HTTP response
    Transport,
    /// A response arrived but did not follow the status contract
    ProtocolViolation,
    /// The backend itself reported `failed`
    BackendReported,
}

/// Everything a monitor knows about its live (or last) task.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskSnapshot {
    pub id: Option<TaskId>,
    pub status: TaskStatus,
    pub output: String,
    pub message: Option<String>,
    pub progress: TaskProgress,
    pub job_records: Vec<JobRecord>,
    pub job_statuses: Vec<JobStatusEntry>,
    pub task_issues: Vec<serde_json::Value>,
    pub log_records: Vec<String>,
    pub temp_dir: Option<String>,
    pub failure: Option<FailureCause>,
}

impl TaskSnapshot {
    /// Append an error line, separating it from any earlier output
    pub fn append_error(&mut self, message: &str) {
        if !self.output.is_empty() {
            self.output.push('\n');
        }
        self.output.push_str("Error: ");
        self.output.push_str(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_backend_status_parsing() {
        assert_eq!(TaskStatus::from_backend("completed"), Some(TaskStatus::Completed));
        assert_eq!(
            TaskStatus::from_backend("completed_no_changes"),
            Some(TaskStatus::CompletedNoChanges)
        );
        assert_eq!(TaskStatus::from_backend("pending"), Some(TaskStatus::Running));
        assert_eq!(TaskStatus::from_backend("in_progress"), Some(TaskStatus::Running));
        assert_eq!(TaskStatus::from_backend(""), None);
    }

    #[test]
    fn test_job_status_entry_keeps_unknown_fields() {
        let raw = json!({
            "file_name": "job_a.json",
            "job_name": "Job A",
            "status": "changed",
            "differences": [{"path": "tasks[0]"}],
            "validation_issues": []
        });

        let entry: JobStatusEntry = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(entry.job_id().as_deref(), Some("job_a.json"));
        assert_eq!(entry.status, JobChange::Changed);
        assert!(entry.extra.contains_key("differences"));

        // Forwarded to import/delete unchanged
        assert_eq!(serde_json::to_value(&entry).unwrap(), raw);
    }

    #[test]
    fn test_job_id_accepts_numbers_and_falls_back_to_name() {
        let numeric: JobStatusEntry =
            serde_json::from_value(json!({"id": 1, "status": "new"})).unwrap();
        assert_eq!(numeric.job_id().as_deref(), Some("1"));
        assert_eq!(
            serde_json::to_value(&numeric).unwrap(),
            json!({"id": 1, "status": "new"})
        );

        let deleted: JobStatusEntry = serde_json::from_value(json!({
            "job_name": "Old job",
            "status": "deleted",
            "file": null
        }))
        .unwrap();
        assert_eq!(deleted.job_id().as_deref(), Some("Old job"));

        let built = JobStatusEntry::new("a.json", JobChange::New).with_name("A");
        assert_eq!(built.job_id().as_deref(), Some("a.json"));
    }

    #[test]
    fn test_job_change_summary_counts() {
        let entries = vec![
            JobStatusEntry::new("1", JobChange::New),
            JobStatusEntry::new("2", JobChange::Deleted),
            JobStatusEntry::new("3", JobChange::Unchanged),
            JobStatusEntry::new("4", JobChange::New),
        ];
        let summary = JobChangeSummary::from_entries(&entries);
        assert_eq!(summary.new, 2);
        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.changed, 0);
    }

    #[test]
    fn test_status_paths() {
        let id = TaskId::new("abc");
        assert_eq!(TaskKindId::Export.status_path(&id), "/export/abc/status");
        assert_eq!(
            TaskKindId::Validation.status_path(&id),
            "/pre-import-validation/abc/status"
        );
        assert_eq!(TaskKindId::Delete.start_path(), "/delete/start");
    }
}
