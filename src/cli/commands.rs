//! CLI command definitions

use clap::Args;

/// Drive a pipeline forward
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Pipeline ID
    pub pipeline: String,

    /// Form values (key=value)
    #[arg(short, long, value_parser = parse_key_value)]
    pub input: Vec<(String, String)>,

    /// Keep invoking while a batch step is in progress
    #[arg(short, long)]
    pub follow: bool,
}

/// Clear the stored state of a pipeline
#[derive(Debug, Args, Clone)]
pub struct ResetCommand {
    /// Pipeline ID
    pub pipeline: String,
}

/// Show the stored state of a pipeline
#[derive(Debug, Args, Clone)]
pub struct StatusCommand {
    /// Pipeline ID
    pub pipeline: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// List configured pipelines
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Validate the configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Output the parsed configuration as JSON
    #[arg(long)]
    pub json: bool,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid key=value pair: {}", s)),
    }
}
