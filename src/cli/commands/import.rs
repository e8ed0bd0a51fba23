use anyhow::Result;
use tokio::sync::broadcast::Receiver;

use crate::cli::commands::validate::{print_validation, run_validation};
use crate::cli::commands::{
    connect, ensure_started, print_result, wait_for_stage, Command, StageOutcome,
};
use crate::events::{MonitorId, PipelineEvent};
use crate::config::MigratorConfig;
use crate::observability::{backend_metrics, OperationTimer};
use crate::tasks::types::TaskStatus;
use crate::telemetry::{create_pipeline_span, generate_correlation_id};
use crate::workflows::{ImportStage, ImportWorkflow};

pub struct ImportCommand {
    config: MigratorConfig,
    skip_import: bool,
    skip_delete: bool,
}

impl ImportCommand {
    pub fn new(config: MigratorConfig) -> Self {
        Self {
            config,
            skip_import: false,
            skip_delete: false,
        }
    }

    pub fn with_skip_import(mut self, skip: bool) -> Self {
        self.skip_import = skip;
        self
    }

    pub fn with_skip_delete(mut self, skip: bool) -> Self {
        self.skip_delete = skip;
        self
    }

    async fn run_stage(
        &self,
        workflow: &ImportWorkflow,
        rx: &mut Receiver<PipelineEvent>,
        stage: ImportStage,
        origin: MonitorId,
        label: &str,
    ) -> Result<bool> {
        println!();
        let timer = OperationTimer::new(label);
        ensure_started(label, workflow.transition(stage).await)?;

        let succeeded = match wait_for_stage(rx, origin).await? {
            StageOutcome::Finished(result) => {
                print_result(label, &result);
                result.status != TaskStatus::Failed
            }
            StageOutcome::Aborted(message) => {
                println!("❌ {label} aborted: {message}");
                false
            }
        };
        timer.finish();
        Ok(succeeded)
    }
}

impl Command for ImportCommand {
    async fn execute(&self) -> Result<()> {
        let correlation_id = generate_correlation_id();
        let _span = create_pipeline_span("import", &correlation_id).entered();

        println!("📥 Importing validated jobs into the workspace");
        println!();

        let (backend, bus) = connect(&self.config)?;
        let workflow = ImportWorkflow::new(backend, bus.clone(), self.config.polling.interval());
        let mut rx = bus.receiver();

        let validated = run_validation(&workflow, &mut rx).await?;
        print_validation(&validated);
        if validated.status == TaskStatus::Failed {
            anyhow::bail!("Validation failed, nothing was imported");
        }

        let mut all_ok = true;

        if self.skip_import {
            println!();
            println!("⏭️  Skipping import");
        } else if workflow.can_start_stage(ImportStage::Import) {
            let origin = workflow.import_monitor().id();
            all_ok &= self
                .run_stage(&workflow, &mut rx, ImportStage::Import, origin, "Import")
                .await?;
        } else {
            println!();
            println!("✅ No new or changed jobs to import");
        }

        if self.skip_delete {
            println!();
            println!("⏭️  Skipping delete");
        } else if workflow.can_start_stage(ImportStage::Delete) {
            let origin = workflow.delete_monitor().id();
            all_ok &= self
                .run_stage(&workflow, &mut rx, ImportStage::Delete, origin, "Delete")
                .await?;
        } else {
            println!();
            println!("✅ No deleted jobs to remove");
        }

        backend_metrics().log_stats();
        if !all_ok {
            anyhow::bail!("One or more stages failed");
        }
        Ok(())
    }
}
