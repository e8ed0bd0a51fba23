// Job Migrator Library - migration pipeline orchestration
// Task monitors, pipeline orchestrators and the event bus between them

pub mod backend;
pub mod cli;
pub mod config;
pub mod events;
pub mod observability;
pub mod tasks;
pub mod telemetry;
pub mod workflows;

// Re-export key types for easy access
pub use backend::{BackendError, HttpTaskBackend, TaskBackend};
pub use config::MigratorConfig;
pub use events::{EventBus, EventHandler, GitOperation, MonitorId, PipelineEvent, StageResult};
pub use observability::{backend_metrics, BackendApiMetrics, OperationTimer};
pub use tasks::{
    JobChange, JobStatusEntry, StartError, TaskId, TaskKindId, TaskMonitor, TaskSnapshot,
    TaskStatus,
};
pub use telemetry::{create_pipeline_span, generate_correlation_id, init_telemetry};
pub use workflows::{
    ExportStage, ExportWorkflow, ImportStage, ImportWorkflow, TransitionOutcome,
};
