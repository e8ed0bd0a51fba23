use anyhow::{bail, Result};

use crate::cli::commands::{
    connect, ensure_started, print_result, wait_for_stage, Command, StageOutcome,
};
use crate::config::MigratorConfig;
use crate::events::StageResult;
use crate::observability::OperationTimer;
use crate::telemetry::{create_pipeline_span, generate_correlation_id};
use crate::workflows::{ImportStage, ImportWorkflow};

pub struct ValidateCommand {
    config: MigratorConfig,
}

impl ValidateCommand {
    pub fn new(config: MigratorConfig) -> Self {
        Self { config }
    }
}

impl Command for ValidateCommand {
    async fn execute(&self) -> Result<()> {
        let correlation_id = generate_correlation_id();
        let _span = create_pipeline_span("import", &correlation_id).entered();

        println!("🔍 Validating exported jobs against the workspace");
        println!();

        let (backend, bus) = connect(&self.config)?;
        let workflow = ImportWorkflow::new(backend, bus.clone(), self.config.polling.interval());

        let result = run_validation(&workflow, &mut bus.receiver()).await?;
        print_validation(&result);

        println!();
        println!(
            "💡 {} job(s) to import, {} job(s) to delete. Run 'job-migrator import' to apply.",
            workflow.import_candidate_count(),
            workflow.delete_candidate_count()
        );
        Ok(())
    }
}

/// Run PRE_VALIDATION to its terminal status
pub async fn run_validation(
    workflow: &ImportWorkflow,
    rx: &mut tokio::sync::broadcast::Receiver<crate::events::PipelineEvent>,
) -> Result<std::sync::Arc<StageResult>> {
    let timer = OperationTimer::new("pre-import validation");
    ensure_started(
        "Validation",
        workflow.transition(ImportStage::PreValidation).await,
    )?;

    let outcome = wait_for_stage(rx, workflow.validation_monitor().id()).await?;
    timer.finish();
    match outcome {
        StageOutcome::Finished(result) => Ok(result),
        StageOutcome::Aborted(message) => bail!("Validation aborted: {message}"),
    }
}

pub fn print_validation(result: &StageResult) {
    print_result("Validation", result);
    if let Some(summary) = result.summary {
        println!();
        println!("📋 JOB CHANGES:");
        println!("   🆕 New:       {}", summary.new);
        println!("   ✏️  Changed:   {}", summary.changed);
        println!("   💤 Unchanged: {}", summary.unchanged);
        println!("   🗑️  Deleted:   {}", summary.deleted);
        if summary.error > 0 {
            println!("   ❌ Errors:    {}", summary.error);
        }
    }
    if let Some(temp_dir) = &result.temp_dir {
        println!("   📁 Staged in {temp_dir}");
    }
}
