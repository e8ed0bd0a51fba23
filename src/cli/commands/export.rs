use anyhow::{bail, Result};

use crate::cli::commands::{
    connect, ensure_started, print_result, wait_for_stage, Command, StageOutcome,
};
use crate::config::MigratorConfig;
use crate::events::GitOperation;
use crate::observability::{backend_metrics, OperationTimer};
use crate::tasks::types::TaskStatus;
use crate::telemetry::{create_pipeline_span, generate_correlation_id};
use crate::workflows::{ExportStage, ExportWorkflow, TransitionOutcome};

pub struct ExportCommand {
    config: MigratorConfig,
    push: bool,
}

impl ExportCommand {
    pub fn new(config: MigratorConfig) -> Self {
        Self { config, push: true }
    }

    pub fn with_push(mut self, push: bool) -> Self {
        self.push = push;
        self
    }
}

impl Command for ExportCommand {
    async fn execute(&self) -> Result<()> {
        let correlation_id = generate_correlation_id();
        let _span = create_pipeline_span("export", &correlation_id).entered();

        println!("📤 Exporting workspace jobs");
        println!();

        let (backend, bus) = connect(&self.config)?;
        let workflow = ExportWorkflow::new(backend, bus.clone(), self.config.polling.interval());
        let mut rx = bus.receiver();

        let timer = OperationTimer::new("export");
        ensure_started("Export", workflow.transition(ExportStage::Export).await)?;
        let outcome = wait_for_stage(&mut rx, workflow.export_monitor().id()).await?;
        timer.finish();
        backend_metrics().log_stats();

        let result = match outcome {
            StageOutcome::Finished(result) => result,
            StageOutcome::Aborted(message) => bail!("Export aborted: {message}"),
        };
        print_result("Export", &result);

        if let crate::tasks::RawCounters::Export { deleted_files, .. } = result.progress.counters {
            if deleted_files > 0 {
                println!("   🧹 {deleted_files} stale file(s) removed");
            }
        }

        if result.status == TaskStatus::Failed {
            bail!("Export failed");
        }

        if self.push {
            println!();
            if let TransitionOutcome::HandoffRequested(GitOperation::Push) =
                workflow.transition(ExportStage::Push).await
            {
                println!("🔀 Push requested: commit and push the exported files from your Git provider");
            }
        }
        Ok(())
    }
}
