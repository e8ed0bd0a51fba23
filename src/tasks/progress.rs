// Progress aggregation: raw per-category counters in, {processed, total, percent} out.
// Pure functions only; the monitors decide when to call them.

use serde::{Deserialize, Serialize};

/// Counters as reported by each task kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawCounters {
    Validation {
        total_items: u64,
        processed_items: u64,
        files_to_transfer: u64,
        files_transferred: u64,
        jobs_to_validate: u64,
        jobs_validated: u64,
    },
    Import {
        jobs_to_import: u64,
        imported: u64,
        failed_jobs: u64,
    },
    Delete {
        jobs_to_delete: u64,
        deleted: u64,
        failed_jobs: u64,
    },
    Export {
        total_jobs: u64,
        exported_modified: u64,
        exported_unchanged: u64,
        failed_jobs: u64,
        deleted_files: u64,
    },
}

impl Default for RawCounters {
    fn default() -> Self {
        RawCounters::Export {
            total_jobs: 0,
            exported_modified: 0,
            exported_unchanged: 0,
            failed_jobs: 0,
            deleted_files: 0,
        }
    }
}

impl RawCounters {
    pub fn total(&self) -> u64 {
        match *self {
            RawCounters::Validation { total_items, .. } => total_items,
            RawCounters::Import { jobs_to_import, .. } => jobs_to_import,
            RawCounters::Delete { jobs_to_delete, .. } => jobs_to_delete,
            RawCounters::Export { total_jobs, .. } => total_jobs,
        }
    }

    /// Sum of every terminal per-item outcome
    pub fn processed(&self) -> u64 {
        match *self {
            RawCounters::Validation { processed_items, .. } => processed_items,
            RawCounters::Import {
                imported,
                failed_jobs,
                ..
            } => imported.saturating_add(failed_jobs),
            RawCounters::Delete {
                deleted,
                failed_jobs,
                ..
            } => deleted.saturating_add(failed_jobs),
            RawCounters::Export {
                exported_modified,
                exported_unchanged,
                failed_jobs,
                ..
            } => exported_modified
                .saturating_add(exported_unchanged)
                .saturating_add(failed_jobs),
        }
    }

    /// Items that reached a failed outcome; drives the `completed_with_errors` reclassification
    pub fn failed(&self) -> u64 {
        match *self {
            RawCounters::Validation { .. } => 0,
            RawCounters::Import { failed_jobs, .. }
            | RawCounters::Delete { failed_jobs, .. }
            | RawCounters::Export { failed_jobs, .. } => failed_jobs,
        }
    }
}

/// Normalised view of a task's progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub total: u64,
    pub processed: u64,
    pub percent_complete: u64,
}

/// Raw counters together with the summary derived from them
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub counters: RawCounters,
    pub summary: ProgressSummary,
}

impl TaskProgress {
    pub fn from_counters(counters: RawCounters) -> Self {
        Self {
            counters,
            summary: aggregate(&counters),
        }
    }
}

/// `round(100 * processed / total)`, or 0 when there is nothing to process
pub fn percent_complete(processed: u64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    ((processed as f64 / total as f64) * 100.0).round() as u64
}

pub fn aggregate(counters: &RawCounters) -> ProgressSummary {
    let total = counters.total();
    let processed = counters.processed();
    ProgressSummary {
        total,
        processed,
        percent_complete: percent_complete(processed, total),
    }
}

/// Summary reported once the task has completed overall. The last poll can race
/// the completion flag and under-report, so processed is pinned to total.
pub fn finalize(summary: ProgressSummary) -> ProgressSummary {
    ProgressSummary {
        total: summary.total,
        processed: summary.total,
        percent_complete: 100,
    }
}
