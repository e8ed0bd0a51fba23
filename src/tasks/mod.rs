// Task monitoring: one generic monitor, four task kinds, progress aggregation

pub mod kinds;
pub mod monitor;
pub mod progress;
pub mod types;

#[cfg(test)]
mod tests;

pub use kinds::{DeleteTask, ExportTask, ImportTask, JobBatch, TaskKind, ValidationTask};
pub use monitor::{StartError, TaskMonitor, DEFAULT_POLL_INTERVAL};
pub use progress::{ProgressSummary, RawCounters, TaskProgress};
pub use types::{
    FailureCause, JobChange, JobChangeSummary, JobRecord, JobStatusEntry, TaskId, TaskKindId,
    TaskSnapshot, TaskStatus,
};

pub type ValidationMonitor = TaskMonitor<ValidationTask>;
pub type ImportMonitor = TaskMonitor<ImportTask>;
pub type DeleteMonitor = TaskMonitor<DeleteTask>;
pub type ExportMonitor = TaskMonitor<ExportTask>;
