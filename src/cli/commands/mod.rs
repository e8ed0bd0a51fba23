use anyhow::{anyhow, bail, Result};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use crate::backend::{HttpTaskBackend, TaskBackend};
use crate::config::MigratorConfig;
use crate::events::{EventBus, MonitorId, PipelineEvent, StageResult};
use crate::tasks::types::TaskStatus;
use crate::workflows::TransitionOutcome;

pub mod config;
pub mod export;
pub mod import;
pub mod validate;

#[allow(async_fn_in_trait)]
pub trait Command {
    async fn execute(&self) -> Result<()>;
}

/// How a stage run ended, as seen from the bus
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Finished(Arc<StageResult>),
    Aborted(String),
}

/// Backend client and bus shared by every stage of one command
pub fn connect(config: &MigratorConfig) -> Result<(Arc<dyn TaskBackend>, Arc<EventBus>)> {
    print!("🔄 Connecting to {}... ", config.backend.base_url);
    flush_stdout();

    match HttpTaskBackend::new(&config.backend) {
        Ok(backend) => {
            println!("✅");
            Ok((Arc::new(backend), Arc::new(EventBus::default())))
        }
        Err(e) => {
            println!("❌");
            Err(anyhow!("Failed to create backend client: {e}"))
        }
    }
}

/// Turn a transition outcome into an error unless a task was started
pub fn ensure_started(stage: &str, outcome: TransitionOutcome) -> Result<()> {
    match outcome {
        TransitionOutcome::Started(Ok(task_id)) => {
            println!("🚀 {stage} started (task {task_id})");
            Ok(())
        }
        TransitionOutcome::Started(Err(e)) => bail!("{stage} could not be started: {e}"),
        TransitionOutcome::Blocked => bail!("{stage} cannot start yet"),
        TransitionOutcome::AlreadyRunning => bail!("{stage} is already running"),
        TransitionOutcome::Navigated | TransitionOutcome::HandoffRequested(_) => {
            bail!("{stage} was not restarted")
        }
    }
}

/// Wait for the terminal event of the task started by monitor `origin`.
/// The receiver must have been taken before the start call.
pub async fn wait_for_stage(
    rx: &mut broadcast::Receiver<PipelineEvent>,
    origin: MonitorId,
) -> Result<StageOutcome> {
    loop {
        match rx.recv().await {
            Ok(PipelineEvent::TaskCompleted {
                origin: from,
                result,
                ..
            }) if from == origin => return Ok(StageOutcome::Finished(result)),
            Ok(PipelineEvent::TaskAborted {
                origin: from,
                message,
                ..
            }) if from == origin => return Ok(StageOutcome::Aborted(message)),
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event receiver lagged");
            }
            Err(RecvError::Closed) => bail!("event bus closed before the stage finished"),
        }
    }
}

/// Print the common part of a stage result
pub fn print_result(stage: &str, result: &StageResult) {
    let icon = match result.status {
        TaskStatus::Completed | TaskStatus::CompletedNoChanges => "✅",
        TaskStatus::CompletedWithErrors | TaskStatus::CompletedWithWarnings => "⚠️ ",
        TaskStatus::Failed => "❌",
        _ => "ℹ️ ",
    };
    println!("{icon} {stage} finished: {}", result.status);

    let progress = result.progress.summary;
    if progress.total > 0 {
        println!(
            "   📊 {}/{} processed ({}%)",
            progress.processed, progress.total, progress.percent_complete
        );
    }
    if let Some(message) = result.message.as_deref().filter(|m| !m.is_empty()) {
        println!("   💬 {message}");
    }
    for record in &result.job_records {
        match &record.error_message {
            Some(error) => println!("   • {} - {} ({error})", record.job_name, record.status),
            None => println!("   • {} - {}", record.job_name, record.status),
        }
    }
    if !result.output.trim().is_empty() {
        println!();
        println!("{}", result.output.trim_end());
    }
}

pub fn flush_stdout() {
    use std::io::Write;
    let _ = std::io::stdout().flush();
}

pub fn show_usage() -> Result<()> {
    println!("🗂️  job-migrator - scheduler job migration");
    println!();
    println!("Import pipeline:");
    println!("  🔍 job-migrator validate   # Compare exported files with the workspace");
    println!("  📥 job-migrator import     # Validate, then import and delete");
    println!();
    println!("Export pipeline:");
    println!("  📤 job-migrator export     # Export jobs and request a Git push");
    println!();
    println!("  ⚙️  job-migrator config     # Show the effective configuration");
    Ok(())
}
