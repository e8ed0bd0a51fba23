// Pipeline orchestration: stage graphs, gating and restart rules

pub mod export;
pub mod import;
pub mod pipeline;

pub use export::{ExportStage, ExportWorkflow};
pub use import::{ImportStage, ImportWorkflow};
pub use pipeline::{PipelineState, Stage, TransitionOutcome};
