use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

#[derive(Parser)]
#[command(name = "job-migrator")]
#[command(about = "Validate, import and export scheduler jobs through the migration backend")]
#[command(long_about = "job-migrator drives the backend's migration tasks: pre-import validation, \
                       import and delete of validated jobs, and export of the workspace. Each \
                       stage is started on the backend and followed until it finishes.")]
pub struct Cli {
    /// Extra configuration file, applied after job-migrator.toml and .job-migrator-rc
    #[arg(long, global = true, help = "Path to an additional TOML configuration file")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compare the exported job files with the workspace
    Validate,
    /// Validate, then import new and changed jobs and delete removed ones
    Import {
        /// Do not run the import stage
        #[arg(long, help = "Skip importing new and changed jobs")]
        skip_import: bool,
        /// Do not run the delete stage
        #[arg(long, help = "Skip deleting jobs that no longer exist in the export")]
        skip_delete: bool,
    },
    /// Export the workspace jobs and request a push to the Git provider
    Export {
        /// Stop after the export stage
        #[arg(long, help = "Do not request a Git push after a successful export")]
        no_push: bool,
    },
    /// Show the effective configuration
    Config {
        /// Write the effective configuration to a file
        #[arg(long, help = "Write the effective configuration as TOML to this path")]
        write: Option<PathBuf>,
    },
}
