//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{ListCommand, ResetCommand, RunCommand, StatusCommand, ValidateCommand};
use std::ffi::OsString;

/// Resumable step pipeline runner
#[derive(Debug, Parser, Clone)]
#[command(name = "stepwise")]
#[command(version)]
#[command(about = "Runs multi-step pipelines that survive between invocations", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Drive a pipeline forward
    Run(RunCommand),

    /// Clear the stored state of a pipeline
    Reset(ResetCommand),

    /// Show the stored state of a pipeline
    Status(StatusCommand),

    /// List configured pipelines
    List(ListCommand),

    /// Validate the configuration
    Validate(ValidateCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
