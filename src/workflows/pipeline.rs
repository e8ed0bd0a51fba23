// Stage graph bookkeeping shared by both pipelines.
//
// Two fields, set independently: `current` is the display cursor, `results`
// holds the last published outcome per stage. Execution state lives in the
// task monitors.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use tracing::debug;

use crate::events::{GitOperation, StageResult};
use crate::tasks::monitor::StartError;
use crate::tasks::types::{JobStatusEntry, TaskId};

/// A node of a pipeline's stage graph
pub trait Stage: Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// Stage whose result gates this one. `None` means always startable.
    fn predecessor(self) -> Option<Self>;

    /// Stages whose results go stale when this one restarts
    fn downstream(self) -> &'static [Self];

    /// Whether a job in the predecessor's list is work for this stage
    fn admits(self, _job: &JobStatusEntry) -> bool {
        true
    }
}

/// What a call to `transition` did
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// The predecessor gate is closed
    Blocked,
    /// The stage's task is still in progress; nothing changed
    AlreadyRunning,
    /// Only the display cursor moved
    Navigated,
    /// A backend task start was issued
    Started(Result<TaskId, StartError>),
    /// The stage is handed off to the Git provider
    HandoffRequested(GitOperation),
}

impl TransitionOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, TransitionOutcome::Started(Ok(_)))
    }
}

#[derive(Debug)]
pub struct PipelineState<S: Stage> {
    current: Option<S>,
    results: HashMap<S, Arc<StageResult>>,
}

impl<S: Stage> Default for PipelineState<S> {
    fn default() -> Self {
        Self {
            current: None,
            results: HashMap::new(),
        }
    }
}

impl<S: Stage> PipelineState<S> {
    pub fn current(&self) -> Option<S> {
        self.current
    }

    pub fn result(&self, stage: S) -> Option<Arc<StageResult>> {
        self.results.get(&stage).cloned()
    }

    /// Gate: a root stage is always startable, a dependent stage needs a
    /// predecessor result holding at least one job it admits.
    pub fn can_start(&self, stage: S) -> bool {
        match stage.predecessor() {
            None => true,
            Some(predecessor) => self.results.get(&predecessor).is_some_and(|result| {
                result.job_statuses.iter().any(|job| stage.admits(job))
            }),
        }
    }

    /// Number of predecessor jobs the stage would act on
    pub fn candidate_count(&self, stage: S) -> usize {
        let Some(predecessor) = stage.predecessor() else {
            return 0;
        };
        self.results.get(&predecessor).map_or(0, |result| {
            result
                .job_statuses
                .iter()
                .filter(|job| stage.admits(job))
                .count()
        })
    }

    /// A stage restarts on a fresh pipeline or on a repeat click of the
    /// displayed stage. A dependent stage also starts when it has never
    /// produced a result. Any other click only moves the cursor.
    pub fn should_restart(&self, stage: S) -> bool {
        self.current.is_none()
            || self.current == Some(stage)
            || (stage.predecessor().is_some() && !self.results.contains_key(&stage))
    }

    /// Drop the stage's own result and everything downstream of it
    pub fn clear_from(&mut self, stage: S) {
        self.results.remove(&stage);
        for later in stage.downstream() {
            if self.results.remove(later).is_some() {
                debug!(stage = %stage, cleared = %later, "Cleared downstream stage result");
            }
        }
    }

    pub fn set_current(&mut self, stage: S) {
        self.current = Some(stage);
    }

    /// Store a published result; the cursor follows execution
    pub fn record(&mut self, stage: S, result: Arc<StageResult>) {
        debug!(stage = %stage, status = %result.status, "Recorded stage result");
        self.results.insert(stage, result);
        self.current = Some(stage);
    }
}
