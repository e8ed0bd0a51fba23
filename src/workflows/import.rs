// Import pipeline: PRE_VALIDATION compares exported files with the workspace,
// then IMPORT (new or changed jobs) and DELETE (deleted jobs) run as siblings.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

use crate::backend::TaskBackend;
use crate::events::{
    EventBus, GitOperation, MonitorId, PipelineEvent, StageResult, StartRequest, SubscriptionId,
};
use crate::tasks::kinds::JobBatch;
use crate::tasks::types::JobStatusEntry;
use crate::tasks::{DeleteMonitor, ImportMonitor, ValidationMonitor};
use crate::workflows::pipeline::{PipelineState, Stage, TransitionOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportStage {
    PreValidation,
    Import,
    Delete,
}

impl Stage for ImportStage {
    fn predecessor(self) -> Option<Self> {
        match self {
            ImportStage::PreValidation => None,
            ImportStage::Import | ImportStage::Delete => Some(ImportStage::PreValidation),
        }
    }

    fn downstream(self) -> &'static [Self] {
        match self {
            ImportStage::PreValidation => &[ImportStage::Import, ImportStage::Delete],
            ImportStage::Import | ImportStage::Delete => &[],
        }
    }

    fn admits(self, job: &JobStatusEntry) -> bool {
        match self {
            ImportStage::PreValidation => true,
            ImportStage::Import => job.status.needs_import(),
            ImportStage::Delete => job.status.needs_delete(),
        }
    }
}

impl fmt::Display for ImportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ImportStage::PreValidation => "PRE_VALIDATION",
            ImportStage::Import => "IMPORT",
            ImportStage::Delete => "DELETE",
        })
    }
}

type SharedState = Arc<Mutex<PipelineState<ImportStage>>>;

fn lock(state: &SharedState) -> MutexGuard<'_, PipelineState<ImportStage>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Orchestrator of the import pipeline. Owns one monitor per stage.
pub struct ImportWorkflow {
    validation: ValidationMonitor,
    import: ImportMonitor,
    delete: DeleteMonitor,
    bus: Arc<EventBus>,
    state: SharedState,
    subscription: SubscriptionId,
}

impl ImportWorkflow {
    pub fn new(backend: Arc<dyn TaskBackend>, bus: Arc<EventBus>, poll_interval: Duration) -> Self {
        let validation = ValidationMonitor::new(Arc::clone(&backend), Arc::clone(&bus), poll_interval);
        let import = ImportMonitor::new(Arc::clone(&backend), Arc::clone(&bus), poll_interval);
        let delete = DeleteMonitor::new(backend, Arc::clone(&bus), poll_interval);
        let state: SharedState = Arc::default();

        let origins: [(MonitorId, ImportStage); 3] = [
            (validation.id(), ImportStage::PreValidation),
            (import.id(), ImportStage::Import),
            (delete.id(), ImportStage::Delete),
        ];
        let listener_state = Arc::clone(&state);
        let subscription = bus.subscribe(Arc::new(move |event: &PipelineEvent| {
            if let PipelineEvent::TaskCompleted { origin, result, .. } = event {
                if let Some((_, stage)) = origins.iter().find(|(id, _)| id == origin) {
                    lock(&listener_state).record(*stage, Arc::clone(result));
                }
            }
        }));

        Self {
            validation,
            import,
            delete,
            bus,
            state,
            subscription,
        }
    }

    fn is_in_progress(&self, stage: ImportStage) -> bool {
        match stage {
            ImportStage::PreValidation => self.validation.is_in_progress(),
            ImportStage::Import => self.import.is_in_progress(),
            ImportStage::Delete => self.delete.is_in_progress(),
        }
    }

    fn origin(&self, stage: ImportStage) -> MonitorId {
        match stage {
            ImportStage::PreValidation => self.validation.id(),
            ImportStage::Import => self.import.id(),
            ImportStage::Delete => self.delete.id(),
        }
    }

    /// Start input for a stage, derived from the validation result
    fn start_request(state: &PipelineState<ImportStage>, stage: ImportStage) -> StartRequest {
        let validated = state.result(ImportStage::PreValidation);
        let temp_dir = validated.as_ref().and_then(|result| result.temp_dir.clone());
        let jobs = validated
            .as_ref()
            .map(|result| result.job_statuses.as_slice())
            .unwrap_or_default();

        match stage {
            ImportStage::PreValidation => StartRequest::Validation,
            ImportStage::Import => StartRequest::Import {
                job_statuses: jobs
                    .iter()
                    .filter(|job| stage.admits(job))
                    .cloned()
                    .collect(),
                temp_dir,
            },
            // The backend picks the deleted entries itself
            ImportStage::Delete => StartRequest::Delete {
                job_statuses: jobs.to_vec(),
                temp_dir,
            },
        }
    }

    pub fn can_start_stage(&self, stage: ImportStage) -> bool {
        lock(&self.state).can_start(stage)
    }

    pub async fn transition(&self, stage: ImportStage) -> TransitionOutcome {
        let request = {
            let mut state = lock(&self.state);
            if !state.can_start(stage) {
                debug!(stage = %stage, "Stage gate closed");
                return TransitionOutcome::Blocked;
            }
            if self.is_in_progress(stage) {
                debug!(stage = %stage, "Stage task still in progress");
                return TransitionOutcome::AlreadyRunning;
            }
            let restart = state.should_restart(stage);
            let request = restart.then(|| Self::start_request(&state, stage));
            if restart {
                state.clear_from(stage);
            }
            state.set_current(stage);
            request
        };

        let Some(request) = request else {
            debug!(stage = %stage, "Moved display cursor");
            return TransitionOutcome::Navigated;
        };

        let batch = match &request {
            StartRequest::Import {
                job_statuses,
                temp_dir,
            }
            | StartRequest::Delete {
                job_statuses,
                temp_dir,
            } => JobBatch::new(job_statuses.clone(), temp_dir.clone()),
            StartRequest::Validation | StartRequest::Export => JobBatch::default(),
        };

        info!(stage = %stage, jobs = batch.job_statuses.len(), "Starting stage");
        self.bus.publish(PipelineEvent::StartRequested {
            origin: self.origin(stage),
            request,
        });

        let started = match stage {
            ImportStage::PreValidation => self.validation.start(()).await,
            ImportStage::Import => self.import.start(batch).await,
            ImportStage::Delete => self.delete.start(batch).await,
        };
        TransitionOutcome::Started(started)
    }

    /// Jobs the IMPORT stage would act on
    pub fn import_candidate_count(&self) -> usize {
        lock(&self.state).candidate_count(ImportStage::Import)
    }

    /// Jobs the DELETE stage would act on
    pub fn delete_candidate_count(&self) -> usize {
        lock(&self.state).candidate_count(ImportStage::Delete)
    }

    /// Ask the Git provider to pull the latest exported files
    pub fn request_pull(&self) {
        info!("Requesting Git pull");
        self.bus.publish(PipelineEvent::HandoffRequested {
            operation: GitOperation::Pull,
        });
    }

    pub fn current_stage(&self) -> Option<ImportStage> {
        lock(&self.state).current()
    }

    pub fn stage_result(&self, stage: ImportStage) -> Option<Arc<StageResult>> {
        lock(&self.state).result(stage)
    }

    pub fn validation_monitor(&self) -> &ValidationMonitor {
        &self.validation
    }

    pub fn import_monitor(&self) -> &ImportMonitor {
        &self.import
    }

    pub fn delete_monitor(&self) -> &DeleteMonitor {
        &self.delete
    }
}

impl Drop for ImportWorkflow {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.subscription);
        self.validation.stop_polling();
        self.import.stop_polling();
        self.delete.stop_polling();
    }
}
