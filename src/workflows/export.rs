// Export pipeline: EXPORT runs a backend task, PUSH hands the exported files
// to the user's Git provider.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

use crate::backend::TaskBackend;
use crate::events::{
    EventBus, GitOperation, PipelineEvent, StageResult, StartRequest, SubscriptionId,
};
use crate::tasks::types::{TaskKindId, TaskStatus};
use crate::tasks::ExportMonitor;
use crate::workflows::pipeline::{PipelineState, Stage, TransitionOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportStage {
    Export,
    Push,
}

impl Stage for ExportStage {
    fn predecessor(self) -> Option<Self> {
        // PUSH is a handoff and is never gated
        None
    }

    fn downstream(self) -> &'static [Self] {
        match self {
            ExportStage::Export => &[ExportStage::Push],
            ExportStage::Push => &[],
        }
    }
}

impl fmt::Display for ExportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportStage::Export => "EXPORT",
            ExportStage::Push => "PUSH",
        })
    }
}

type SharedState = Arc<Mutex<PipelineState<ExportStage>>>;

fn lock(state: &SharedState) -> MutexGuard<'_, PipelineState<ExportStage>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Orchestrator of the export pipeline. Owns its export monitor.
pub struct ExportWorkflow {
    export: ExportMonitor,
    bus: Arc<EventBus>,
    state: SharedState,
    subscription: SubscriptionId,
}

impl ExportWorkflow {
    pub fn new(backend: Arc<dyn TaskBackend>, bus: Arc<EventBus>, poll_interval: Duration) -> Self {
        let export = ExportMonitor::new(backend, Arc::clone(&bus), poll_interval);
        let state: SharedState = Arc::default();

        let origin = export.id();
        let listener_state = Arc::clone(&state);
        let subscription = bus.subscribe(Arc::new(move |event: &PipelineEvent| match event {
            PipelineEvent::TaskCompleted {
                origin: from,
                kind: TaskKindId::Export,
                result,
            } if *from == origin => {
                lock(&listener_state).record(ExportStage::Export, Arc::clone(result));
            }
            // Pushes may be completed from any surface
            PipelineEvent::HandoffCompleted {
                operation: GitOperation::Push,
            } => {
                lock(&listener_state).record(
                    ExportStage::Push,
                    Arc::new(StageResult::handoff(TaskStatus::Completed)),
                );
            }
            _ => {}
        }));

        Self {
            export,
            bus,
            state,
            subscription,
        }
    }

    pub fn can_start_stage(&self, stage: ExportStage) -> bool {
        lock(&self.state).can_start(stage)
    }

    pub async fn transition(&self, stage: ExportStage) -> TransitionOutcome {
        let restart = {
            let mut state = lock(&self.state);
            if !state.can_start(stage) {
                debug!(stage = %stage, "Stage gate closed");
                return TransitionOutcome::Blocked;
            }
            if stage == ExportStage::Export && self.export.is_in_progress() {
                debug!(stage = %stage, "Stage task still in progress");
                return TransitionOutcome::AlreadyRunning;
            }
            // Every PUSH click hands off again
            let restart = stage == ExportStage::Push || state.should_restart(stage);
            if restart {
                state.clear_from(stage);
            }
            state.set_current(stage);
            restart
        };

        if !restart {
            debug!(stage = %stage, "Moved display cursor");
            return TransitionOutcome::Navigated;
        }

        info!(stage = %stage, "Starting stage");
        match stage {
            ExportStage::Export => {
                self.bus.publish(PipelineEvent::StartRequested {
                    origin: self.export.id(),
                    request: StartRequest::Export,
                });
                TransitionOutcome::Started(self.export.start(()).await)
            }
            ExportStage::Push => {
                self.bus.publish(PipelineEvent::HandoffRequested {
                    operation: GitOperation::Push,
                });
                TransitionOutcome::HandoffRequested(GitOperation::Push)
            }
        }
    }

    pub fn current_stage(&self) -> Option<ExportStage> {
        lock(&self.state).current()
    }

    pub fn stage_result(&self, stage: ExportStage) -> Option<Arc<StageResult>> {
        lock(&self.state).result(stage)
    }

    pub fn export_monitor(&self) -> &ExportMonitor {
        &self.export
    }
}

impl Drop for ExportWorkflow {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.subscription);
        self.export.stop_polling();
    }
}
