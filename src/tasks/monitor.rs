// Generic lifecycle tracker for one backend task kind.
//
// A monitor owns at most one live task. The armed poll session (spawned loop +
// cancellation token) counts towards `is_in_progress`, and `stop_polling` is the
// only code that disarms it.

use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{BackendError, TaskBackend};
use crate::events::{EventBus, MonitorId, PipelineEvent, StageResult};
use crate::tasks::kinds::{StartErrorOutput, StatusUpdate, TaskKind};
use crate::tasks::progress::{aggregate, finalize, TaskProgress};
use crate::tasks::types::{FailureCause, TaskId, TaskKindId, TaskSnapshot, TaskStatus};

/// Poll cadence used when nothing else is configured
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartError {
    /// Re-entrancy guard: the live task was left untouched
    #[error("{kind} task is already in progress (status: {status})")]
    AlreadyInProgress {
        kind: TaskKindId,
        task_id: Option<TaskId>,
        status: TaskStatus,
    },

    #[error("{0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The monitor was reset while the start call was in flight
    #[error("{kind} task was reset before the backend answered the start request")]
    Superseded { kind: TaskKindId },
}

struct PollSession {
    token: CancellationToken,
    _handle: JoinHandle<()>,
}

struct MonitorState<K: TaskKind> {
    task: TaskSnapshot,
    payload: Option<K::Payload>,
    session: Option<PollSession>,
    generation: u64,
}

impl<K: TaskKind> MonitorState<K> {
    fn is_in_progress(&self) -> bool {
        self.task.status.is_active() || self.session.is_some()
    }

    /// Idempotent. Returns whether a session was armed.
    fn stop_polling(&mut self) -> bool {
        match self.session.take() {
            Some(session) => {
                session.token.cancel();
                debug!(task.kind = %K::KIND, task.id = ?self.task.id, "Polling stopped");
                true
            }
            None => false,
        }
    }

    fn fail(&mut self, message: &str, cause: FailureCause) {
        self.task.status = TaskStatus::Failed;
        self.task.failure = Some(cause);
        self.task.message = Some(format!("Error: {message}"));
        self.task.append_error(message);
        self.stop_polling();
    }

    fn fail_start(&mut self, message: &str, cause: FailureCause) {
        self.task.status = TaskStatus::Failed;
        self.task.failure = Some(cause);
        self.task.message = Some(format!("Error: {message}"));
        match K::START_ERROR_OUTPUT {
            StartErrorOutput::Replace => self.task.output = format!("Error: {message}"),
            StartErrorOutput::Append => self.task.output.push_str(message),
        }
        self.stop_polling();
    }

    /// Write one status response. Status goes first, dependent fields after.
    /// Returns true when the status is terminal for this kind.
    fn apply_update(&mut self, update: StatusUpdate) -> bool {
        let counters = update.counters.unwrap_or(self.task.progress.counters);
        let terminal = K::is_terminal(update.status);

        // Itemized counters win over the backend's success flag
        let status = if update.status == TaskStatus::Completed && counters.failed() > 0 {
            TaskStatus::CompletedWithErrors
        } else {
            update.status
        };
        self.task.status = status;

        if let Some(output) = update.output {
            self.task.output = output;
        }
        if let Some(message) = update.message {
            self.task.message = Some(message);
        }
        if let Some(records) = update.job_records {
            self.task.job_records = records;
        }
        if let Some(statuses) = update.job_statuses {
            self.task.job_statuses = statuses;
        }
        if let Some(issues) = update.task_issues {
            self.task.task_issues = issues;
        }
        if let Some(logs) = update.log_records {
            self.task.log_records = logs;
        }
        if update.temp_dir.is_some() {
            self.task.temp_dir = update.temp_dir;
        }

        let mut summary = aggregate(&counters);
        if terminal && !status.is_failure() {
            summary = finalize(summary);
        }
        self.task.progress = TaskProgress { counters, summary };

        if status.is_failure() {
            self.task.failure = Some(FailureCause::BackendReported);
        }
        terminal
    }
}

enum PollStep {
    Continue,
    Finished(Vec<PipelineEvent>),
    Cancelled,
}

struct Shared<K: TaskKind> {
    id: MonitorId,
    backend: Arc<dyn TaskBackend>,
    bus: Arc<EventBus>,
    poll_interval: Duration,
    state: Mutex<MonitorState<K>>,
}

impl<K: TaskKind> Shared<K> {
    fn lock(&self) -> MutexGuard<'_, MonitorState<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn aborted(&self, message: String) -> PipelineEvent {
        PipelineEvent::TaskAborted {
            origin: self.id,
            kind: K::KIND,
            message,
        }
    }

    /// Apply one poll response in a single critical section
    fn apply_poll(
        &self,
        token: &CancellationToken,
        response: Result<Value, BackendError>,
    ) -> PollStep {
        let mut state = self.lock();
        if token.is_cancelled() {
            return PollStep::Cancelled;
        }
        let Some(payload) = state.payload.clone() else {
            return PollStep::Cancelled;
        };

        let update = response.and_then(|body| {
            let status = body
                .get("status")
                .and_then(Value::as_str)
                .and_then(TaskStatus::from_backend)
                .ok_or_else(|| {
                    BackendError::Protocol("missing status field".to_string())
                })?;
            K::decode_status(status, body, &payload)
        });

        let update = match update {
            Ok(update) => update,
            Err(err) => {
                let message = err.to_string();
                warn!(
                    task.kind = %K::KIND,
                    task.id = ?state.task.id,
                    error = %message,
                    "Status poll failed, ending monitoring session"
                );
                state.fail(&message, err.cause());
                return PollStep::Finished(vec![self.aborted(message)]);
            }
        };

        if !state.apply_update(update) {
            debug!(
                task.kind = %K::KIND,
                status = %state.task.status,
                percent = state.task.progress.summary.percent_complete,
                "Task still running"
            );
            return PollStep::Continue;
        }

        state.stop_polling();
        info!(
            task.kind = %K::KIND,
            task.id = ?state.task.id,
            status = %state.task.status,
            "Task finished"
        );

        let result = StageResult::from_snapshot(&state.task, K::job_summary(&state.task));
        let mut events = vec![PipelineEvent::TaskCompleted {
            origin: self.id,
            kind: K::KIND,
            result: Arc::new(result),
        }];
        if K::REFRESHES_WORKSPACE {
            events.push(PipelineEvent::WorkspaceRefreshRequested);
        }
        PollStep::Finished(events)
    }
}

/// Fetch immediately, then once per interval after every non-terminal answer.
/// Holds only a weak handle between polls so a discarded monitor ends its session.
async fn poll_session<K: TaskKind>(
    monitor: Weak<Shared<K>>,
    backend: Arc<dyn TaskBackend>,
    task_id: TaskId,
    token: CancellationToken,
    interval: Duration,
) {
    loop {
        let response = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            response = backend.fetch_status(K::KIND, &task_id) => response,
        };

        let Some(shared) = monitor.upgrade() else {
            return;
        };
        match shared.apply_poll(&token, response) {
            PollStep::Continue => {}
            PollStep::Finished(events) => {
                for event in events {
                    shared.bus.publish(event);
                }
                return;
            }
            PollStep::Cancelled => return,
        }
        drop(shared);

        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

/// Tracks one backend task kind through start, polling and completion
pub struct TaskMonitor<K: TaskKind> {
    shared: Arc<Shared<K>>,
}

impl<K: TaskKind> Clone for TaskMonitor<K> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K: TaskKind> std::fmt::Debug for TaskMonitor<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("TaskMonitor")
            .field("kind", &K::KIND)
            .field("id", &self.shared.id)
            .field("status", &state.task.status)
            .field("armed", &state.session.is_some())
            .finish()
    }
}

impl<K: TaskKind> TaskMonitor<K> {
    pub fn new(backend: Arc<dyn TaskBackend>, bus: Arc<EventBus>, poll_interval: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: MonitorId::new(),
                backend,
                bus,
                poll_interval,
                state: Mutex::new(MonitorState {
                    task: TaskSnapshot::default(),
                    payload: None,
                    session: None,
                    generation: 0,
                }),
            }),
        }
    }

    pub fn id(&self) -> MonitorId {
        self.shared.id
    }

    pub fn kind(&self) -> TaskKindId {
        K::KIND
    }

    /// Start a new task, unless one is already in progress.
    ///
    /// On success the poll session is armed before this returns; the first
    /// status fetch runs as soon as the runtime schedules it.
    pub async fn start(&self, payload: K::Payload) -> Result<TaskId, StartError> {
        let generation = {
            let mut state = self.shared.lock();
            if state.is_in_progress() {
                info!(
                    task.kind = %K::KIND,
                    status = %state.task.status,
                    "Task already in progress, ignoring start request"
                );
                return Err(StartError::AlreadyInProgress {
                    kind: K::KIND,
                    task_id: state.task.id.clone(),
                    status: state.task.status,
                });
            }

            state.generation += 1;
            state.task = TaskSnapshot {
                status: TaskStatus::Starting,
                progress: TaskProgress::from_counters(K::initial_counters(&payload)),
                ..TaskSnapshot::default()
            };
            state.payload = Some(payload.clone());

            if let Err(reason) = K::validate(&payload) {
                warn!(task.kind = %K::KIND, reason = %reason, "Start payload rejected");
                state.fail_start(&reason, FailureCause::StartRejected);
                drop(state);
                self.shared.bus.publish(self.shared.aborted(reason.clone()));
                return Err(StartError::InvalidPayload(reason));
            }
            state.generation
        };

        info!(task.kind = %K::KIND, "Starting task");
        let outcome = self
            .shared
            .backend
            .start_task(K::KIND, K::start_body(&payload))
            .await;

        let mut state = self.shared.lock();
        if state.generation != generation {
            return Err(StartError::Superseded { kind: K::KIND });
        }

        match outcome {
            Ok(task_id) => {
                state.task.id = Some(task_id.clone());
                state.task.status = TaskStatus::Running;

                let token = CancellationToken::new();
                let handle = tokio::spawn(poll_session::<K>(
                    Arc::downgrade(&self.shared),
                    Arc::clone(&self.shared.backend),
                    task_id.clone(),
                    token.clone(),
                    self.shared.poll_interval,
                ));
                state.session = Some(PollSession {
                    token,
                    _handle: handle,
                });

                info!(task.kind = %K::KIND, task.id = %task_id, "Task started, polling");
                Ok(task_id)
            }
            Err(err) => {
                let message = err.to_string();
                warn!(task.kind = %K::KIND, error = %message, "Start request failed");
                state.fail_start(&message, err.cause());
                drop(state);
                self.shared.bus.publish(self.shared.aborted(message));
                Err(StartError::Backend(err))
            }
        }
    }

    /// Disarm the poll session. Safe to call any number of times.
    pub fn stop_polling(&self) -> bool {
        self.shared.lock().stop_polling()
    }

    /// Stop polling and forget the current task
    pub fn reset(&self) {
        let mut state = self.shared.lock();
        state.stop_polling();
        state.generation += 1;
        state.task = TaskSnapshot::default();
        state.payload = None;
        debug!(task.kind = %K::KIND, "Monitor reset");
    }

    /// True while the task is starting or running, or a poll session is armed
    pub fn is_in_progress(&self) -> bool {
        self.shared.lock().is_in_progress()
    }

    pub fn is_polling(&self) -> bool {
        self.shared.lock().session.is_some()
    }

    pub fn status(&self) -> TaskStatus {
        self.shared.lock().task.status
    }

    pub fn task_id(&self) -> Option<TaskId> {
        self.shared.lock().task.id.clone()
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        self.shared.lock().task.clone()
    }

    pub fn payload(&self) -> Option<K::Payload> {
        self.shared.lock().payload.clone()
    }
}
