use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::tasks::progress::TaskProgress;
use crate::tasks::types::{
    JobChangeSummary, JobRecord, JobStatusEntry, TaskId, TaskKindId, TaskSnapshot, TaskStatus,
};

/// Identity of one monitor instance, so a listener can tell its own tasks apart
/// from those of another pipeline sharing the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonitorId(uuid::Uuid);

impl MonitorId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for MonitorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MonitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable outcome of a finished stage, stored by the orchestrators
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageResult {
    pub status: TaskStatus,
    pub task_id: Option<TaskId>,
    pub message: Option<String>,
    pub output: String,
    pub job_statuses: Vec<JobStatusEntry>,
    pub job_records: Vec<JobRecord>,
    pub summary: Option<JobChangeSummary>,
    pub progress: TaskProgress,
    pub temp_dir: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl StageResult {
    /// Result of a stage with no backend task behind it (the Git handoffs)
    pub fn handoff(status: TaskStatus) -> Self {
        Self {
            status,
            task_id: None,
            message: None,
            output: String::new(),
            job_statuses: Vec::new(),
            job_records: Vec::new(),
            summary: None,
            progress: TaskProgress::default(),
            temp_dir: None,
            completed_at: Utc::now(),
        }
    }

    pub fn from_snapshot(snapshot: &TaskSnapshot, summary: Option<JobChangeSummary>) -> Self {
        Self {
            status: snapshot.status,
            task_id: snapshot.id.clone(),
            message: snapshot.message.clone(),
            output: snapshot.output.clone(),
            job_statuses: snapshot.job_statuses.clone(),
            job_records: snapshot.job_records.clone(),
            summary,
            progress: snapshot.progress,
            temp_dir: snapshot.temp_dir.clone(),
            completed_at: Utc::now(),
        }
    }
}

/// Operations handed off to the user's Git provider; no backend task exists for them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GitOperation {
    Push,
    Pull,
}

/// Input of a stage start, derived by the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub enum StartRequest {
    Validation,
    Import {
        job_statuses: Vec<JobStatusEntry>,
        temp_dir: Option<String>,
    },
    Delete {
        job_statuses: Vec<JobStatusEntry>,
        temp_dir: Option<String>,
    },
    Export,
}

impl StartRequest {
    pub fn kind(&self) -> TaskKindId {
        match self {
            StartRequest::Validation => TaskKindId::Validation,
            StartRequest::Import { .. } => TaskKindId::Import,
            StartRequest::Delete { .. } => TaskKindId::Delete,
            StartRequest::Export => TaskKindId::Export,
        }
    }
}

/// The closed set of events carried by the bus
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// An orchestrator (re)issued a stage start
    StartRequested {
        origin: MonitorId,
        request: StartRequest,
    },
    /// A task reached a terminal status reported by the backend
    TaskCompleted {
        origin: MonitorId,
        kind: TaskKindId,
        result: Arc<StageResult>,
    },
    /// A session ended client-side (start rejected, transport error, protocol violation)
    TaskAborted {
        origin: MonitorId,
        kind: TaskKindId,
        message: String,
    },
    HandoffRequested {
        operation: GitOperation,
    },
    HandoffCompleted {
        operation: GitOperation,
    },
    /// Displays of workspace contents should reload
    WorkspaceRefreshRequested,
}

impl PipelineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineEvent::StartRequested { request, .. } => match request.kind() {
                TaskKindId::Validation => "start-pre-import-validation",
                TaskKindId::Import => "start-import",
                TaskKindId::Delete => "start-delete",
                TaskKindId::Export => "start-export",
            },
            PipelineEvent::TaskCompleted { kind, .. } => match kind {
                TaskKindId::Validation => "pre-import-validation-completed",
                TaskKindId::Import => "import-completed",
                TaskKindId::Delete => "delete-completed",
                TaskKindId::Export => "export-completed",
            },
            PipelineEvent::TaskAborted { .. } => "task-aborted",
            PipelineEvent::HandoffRequested { .. } => "handoff-requested",
            PipelineEvent::HandoffCompleted { .. } => "git-operation-completed",
            PipelineEvent::WorkspaceRefreshRequested => "refresh-workspace-info",
        }
    }
}
