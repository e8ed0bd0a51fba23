use anyhow::Result;
use clap::Parser;

use job_migrator::cli::commands::config::ConfigCommand;
use job_migrator::cli::commands::export::ExportCommand;
use job_migrator::cli::commands::import::ImportCommand;
use job_migrator::cli::commands::validate::ValidateCommand;
use job_migrator::cli::commands::{show_usage, Command};
use job_migrator::cli::{Cli, Commands};
use job_migrator::{init_telemetry, MigratorConfig};

fn main() -> Result<()> {
    let cli = Cli::parse();

    MigratorConfig::load_env_file()?;
    let config = MigratorConfig::load(cli.config.as_deref())?;
    init_telemetry(&config.observability)?;

    match cli.command {
        None => show_usage(),
        Some(Commands::Validate) => tokio::runtime::Runtime::new()?.block_on(async {
            ValidateCommand::new(config).execute().await
        }),
        Some(Commands::Import {
            skip_import,
            skip_delete,
        }) => tokio::runtime::Runtime::new()?.block_on(async {
            ImportCommand::new(config)
                .with_skip_import(skip_import)
                .with_skip_delete(skip_delete)
                .execute()
                .await
        }),
        Some(Commands::Export { no_push }) => tokio::runtime::Runtime::new()?.block_on(async {
            ExportCommand::new(config)
                .with_push(!no_push)
                .execute()
                .await
        }),
        Some(Commands::Config { write }) => tokio::runtime::Runtime::new()?.block_on(async {
            ConfigCommand::new(config).with_write(write).execute().await
        }),
    }
}
