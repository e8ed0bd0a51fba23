// The four backend task kinds. Each one knows its start payload, how to decode
// its status document, and which statuses end a polling session.

use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt::Debug;

use crate::backend::BackendError;
use crate::tasks::progress::RawCounters;
use crate::tasks::types::{
    JobChangeSummary, JobRecord, JobStatusEntry, TaskKindId, TaskSnapshot, TaskStatus,
};

/// How a failed start call is written into the task output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartErrorOutput {
    /// Output becomes `Error: <message>`
    Replace,
    /// The raw message is appended to whatever output exists
    Append,
}

/// Fields decoded from one status response. `None` keeps the previous value.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: TaskStatus,
    pub output: Option<String>,
    pub message: Option<String>,
    pub counters: Option<RawCounters>,
    pub job_records: Option<Vec<JobRecord>>,
    pub job_statuses: Option<Vec<JobStatusEntry>>,
    pub task_issues: Option<Vec<Value>>,
    pub log_records: Option<Vec<String>>,
    pub temp_dir: Option<String>,
}

impl StatusUpdate {
    fn new(status: TaskStatus) -> Self {
        Self {
            status,
            output: None,
            message: None,
            counters: None,
            job_records: None,
            job_statuses: None,
            task_issues: None,
            log_records: None,
            temp_dir: None,
        }
    }
}

/// Static description of a backend task kind, used to instantiate `TaskMonitor`
pub trait TaskKind: Send + Sync + 'static {
    type Payload: Clone + Debug + Send + Sync + 'static;

    const KIND: TaskKindId;
    const START_ERROR_OUTPUT: StartErrorOutput = StartErrorOutput::Replace;
    /// Whether completion should also trigger a workspace refresh
    const REFRESHES_WORKSPACE: bool = false;

    /// Local checks run before the start call is issued
    fn validate(_payload: &Self::Payload) -> Result<(), String> {
        Ok(())
    }

    fn start_body(payload: &Self::Payload) -> Option<Value>;

    /// Counters shown between the start call and the first status response
    fn initial_counters(payload: &Self::Payload) -> RawCounters;

    fn is_terminal(status: TaskStatus) -> bool {
        status.is_common_terminal()
    }

    /// Decode a status document. The caller has already checked that `status`
    /// is present and non-empty.
    fn decode_status(
        status: TaskStatus,
        body: Value,
        payload: &Self::Payload,
    ) -> Result<StatusUpdate, BackendError>;

    fn job_summary(_snapshot: &TaskSnapshot) -> Option<JobChangeSummary> {
        None
    }
}

/// Jobs handed to the import or delete stage, plus the validation staging directory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobBatch {
    pub job_statuses: Vec<JobStatusEntry>,
    pub temp_dir: Option<String>,
}

impl JobBatch {
    pub fn new(job_statuses: Vec<JobStatusEntry>, temp_dir: Option<String>) -> Self {
        Self {
            job_statuses,
            temp_dir,
        }
    }

    fn start_body(&self) -> Value {
        json!({
            "jobStatuses": self.job_statuses,
            "tempDir": self.temp_dir,
        })
    }

    fn count(&self, predicate: impl Fn(&JobStatusEntry) -> bool) -> u64 {
        self.job_statuses.iter().filter(|job| predicate(job)).count() as u64
    }
}

fn decode<T: for<'de> Deserialize<'de>>(body: Value) -> Result<T, BackendError> {
    serde_json::from_value(body).map_err(|e| BackendError::Protocol(e.to_string()))
}

fn non_empty(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.is_empty())
}

// ---- validation ------------------------------------------------------------

pub struct ValidationTask;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ValidationProgressWire {
    total_items: u64,
    processed_items: u64,
    files_to_transfer: u64,
    files_transferred: u64,
    jobs_to_validate: u64,
    jobs_validated: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidationStatusWire {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    task_issues: Vec<Value>,
    #[serde(default)]
    job_statuses: Vec<JobStatusEntry>,
    #[serde(default)]
    log_records: Vec<String>,
    #[serde(default)]
    temp_dir: Option<String>,
    #[serde(default)]
    progress: Option<ValidationProgressWire>,
}

impl TaskKind for ValidationTask {
    type Payload = ();

    const KIND: TaskKindId = TaskKindId::Validation;

    fn start_body(_payload: &()) -> Option<Value> {
        None
    }

    fn initial_counters(_payload: &()) -> RawCounters {
        RawCounters::Validation {
            total_items: 0,
            processed_items: 0,
            files_to_transfer: 0,
            files_transferred: 0,
            jobs_to_validate: 0,
            jobs_validated: 0,
        }
    }

    fn is_terminal(status: TaskStatus) -> bool {
        status.is_common_terminal()
            || matches!(
                status,
                TaskStatus::CompletedWithWarnings | TaskStatus::CompletedNoChanges
            )
    }

    fn decode_status(
        status: TaskStatus,
        body: Value,
        _payload: &(),
    ) -> Result<StatusUpdate, BackendError> {
        let wire: ValidationStatusWire = decode(body)?;
        let mut update = StatusUpdate::new(status);
        // Log records are the full log so far, not a delta
        update.output = Some(wire.log_records.concat());
        update.message = non_empty(wire.message);
        update.counters = wire.progress.map(|p| RawCounters::Validation {
            total_items: p.total_items,
            processed_items: p.processed_items,
            files_to_transfer: p.files_to_transfer,
            files_transferred: p.files_transferred,
            jobs_to_validate: p.jobs_to_validate,
            jobs_validated: p.jobs_validated,
        });
        update.job_statuses = Some(wire.job_statuses);
        update.task_issues = Some(wire.task_issues);
        update.log_records = Some(wire.log_records);
        update.temp_dir = wire.temp_dir;
        Ok(update)
    }

    fn job_summary(snapshot: &TaskSnapshot) -> Option<JobChangeSummary> {
        Some(JobChangeSummary::from_entries(&snapshot.job_statuses))
    }
}

// ---- import ----------------------------------------------------------------

pub struct ImportTask;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ImportProgressWire {
    imported: u64,
    failed_jobs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobImportStatusWire {
    job_name: String,
    import_status: String,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportStatusWire {
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    log_records: Vec<String>,
    #[serde(default)]
    job_import_statuses: Vec<JobImportStatusWire>,
    #[serde(default)]
    progress: Option<ImportProgressWire>,
}

impl TaskKind for ImportTask {
    type Payload = JobBatch;

    const KIND: TaskKindId = TaskKindId::Import;
    const REFRESHES_WORKSPACE: bool = true;

    fn validate(payload: &JobBatch) -> Result<(), String> {
        if payload.temp_dir.as_deref().map_or(true, str::is_empty) {
            return Err("No temporary directory specified for import".to_string());
        }
        if payload.job_statuses.is_empty() {
            return Err("No jobs specified for import".to_string());
        }
        Ok(())
    }

    fn start_body(payload: &JobBatch) -> Option<Value> {
        Some(payload.start_body())
    }

    fn initial_counters(payload: &JobBatch) -> RawCounters {
        RawCounters::Import {
            jobs_to_import: payload.count(|job| job.status.needs_import()),
            imported: 0,
            failed_jobs: 0,
        }
    }

    fn decode_status(
        status: TaskStatus,
        body: Value,
        payload: &JobBatch,
    ) -> Result<StatusUpdate, BackendError> {
        let wire: ImportStatusWire = decode(body)?;
        let mut update = StatusUpdate::new(status);
        update.output = non_empty(wire.output);
        update.counters = wire.progress.map(|p| RawCounters::Import {
            jobs_to_import: payload.count(|job| job.status.needs_import()),
            imported: p.imported,
            failed_jobs: p.failed_jobs,
        });
        update.job_records = Some(
            wire.job_import_statuses
                .into_iter()
                .map(|job| JobRecord {
                    job_name: job.job_name,
                    status: job.import_status,
                    error_message: job.error_message,
                })
                .collect(),
        );
        update.log_records = Some(wire.log_records);
        Ok(update)
    }
}

// ---- delete ----------------------------------------------------------------

pub struct DeleteTask;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DeleteProgressWire {
    deleted: u64,
    failed_jobs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobDeleteStatusWire {
    job_name: String,
    delete_status: String,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteStatusWire {
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    log_records: Vec<String>,
    #[serde(default)]
    job_delete_statuses: Vec<JobDeleteStatusWire>,
    #[serde(default)]
    progress: Option<DeleteProgressWire>,
}

impl TaskKind for DeleteTask {
    type Payload = JobBatch;

    const KIND: TaskKindId = TaskKindId::Delete;
    const REFRESHES_WORKSPACE: bool = true;

    fn validate(payload: &JobBatch) -> Result<(), String> {
        if payload.job_statuses.is_empty() {
            return Err("No jobs specified for deletion".to_string());
        }
        Ok(())
    }

    fn start_body(payload: &JobBatch) -> Option<Value> {
        Some(payload.start_body())
    }

    fn initial_counters(payload: &JobBatch) -> RawCounters {
        RawCounters::Delete {
            jobs_to_delete: payload.count(|job| job.status.needs_delete()),
            deleted: 0,
            failed_jobs: 0,
        }
    }

    fn decode_status(
        status: TaskStatus,
        body: Value,
        payload: &JobBatch,
    ) -> Result<StatusUpdate, BackendError> {
        let wire: DeleteStatusWire = decode(body)?;
        let mut update = StatusUpdate::new(status);
        update.output = non_empty(wire.output);
        update.counters = wire.progress.map(|p| RawCounters::Delete {
            jobs_to_delete: payload.count(|job| job.status.needs_delete()),
            deleted: p.deleted,
            failed_jobs: p.failed_jobs,
        });
        update.job_records = Some(
            wire.job_delete_statuses
                .into_iter()
                .map(|job| JobRecord {
                    job_name: job.job_name,
                    status: job.delete_status,
                    error_message: job.error_message,
                })
                .collect(),
        );
        update.log_records = Some(wire.log_records);
        Ok(update)
    }
}

// ---- export ----------------------------------------------------------------

pub struct ExportTask;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExportProgressWire {
    total_jobs: u64,
    exported_modified: u64,
    exported_unchanged: u64,
    failed_jobs: u64,
    deleted_files: u64,
}

#[derive(Debug, Deserialize)]
struct ExportStatusWire {
    #[serde(default)]
    output: Option<String>,
    #[serde(default)]
    progress: Option<ExportProgressWire>,
}

impl TaskKind for ExportTask {
    type Payload = ();

    const KIND: TaskKindId = TaskKindId::Export;
    const START_ERROR_OUTPUT: StartErrorOutput = StartErrorOutput::Append;

    fn start_body(_payload: &()) -> Option<Value> {
        None
    }

    fn initial_counters(_payload: &()) -> RawCounters {
        RawCounters::default()
    }

    fn decode_status(
        status: TaskStatus,
        body: Value,
        _payload: &(),
    ) -> Result<StatusUpdate, BackendError> {
        let wire: ExportStatusWire = decode(body)?;
        let mut update = StatusUpdate::new(status);
        update.output = non_empty(wire.output);
        update.counters = wire.progress.map(|p| RawCounters::Export {
            total_jobs: p.total_jobs,
            exported_modified: p.exported_modified,
            exported_unchanged: p.exported_unchanged,
            failed_jobs: p.failed_jobs,
            deleted_files: p.deleted_files,
        });
        Ok(update)
    }
}
