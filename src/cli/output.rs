//! CLI output formatting

use crate::{
    core::Position,
    execution::{OrchestratorEvent, Response, RunStatus},
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Create a progress bar for a batch step
pub fn create_progress_bar(total: u32) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    if let Ok(bar_style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        progress.set_style(bar_style.progress_chars("#>-"));
    }
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format a stored position for display
pub fn format_position(position: Position) -> String {
    match position {
        Position::At(index) => style(format!("step {}", index + 1)).yellow().to_string(),
        Position::Final => style("FINAL").green().to_string(),
    }
}

/// Format an orchestrator event for display
pub fn format_event(event: &OrchestratorEvent) -> String {
    match event {
        OrchestratorEvent::RunStarted { pipeline_label, .. } => {
            format!("{} Starting pipeline {}", ROCKET, style(pipeline_label).bold())
        }
        OrchestratorEvent::RunResumed {
            pipeline_label,
            position,
            ..
        } => format!(
            "{} Resuming {} at {}",
            ROCKET,
            style(pipeline_label).bold(),
            format_position(*position)
        ),
        OrchestratorEvent::StepStarted { step_label, .. } => {
            format!("{} {}", SPINNER, style(step_label).cyan())
        }
        OrchestratorEvent::StepCompleted { step_label, .. } => {
            format!("{} {}", CHECK, style(step_label).green())
        }
        OrchestratorEvent::AwaitingInput {
            step_label,
            missing,
            ..
        } => format!(
            "{} {} needs input: {}",
            WARN,
            style(step_label).yellow(),
            style(missing.join(", ")).bold()
        ),
        OrchestratorEvent::BatchIteration {
            step_label,
            iteration,
            total_iterations,
            ..
        } => format!(
            "{} {} ({}/{})",
            INFO,
            style(step_label).cyan(),
            iteration,
            total_iterations
        ),
        OrchestratorEvent::PipelineSucceeded { pipeline_label } => format!(
            "{} {} completed {}",
            CHECK,
            style(pipeline_label).bold(),
            style("successfully").green()
        ),
        OrchestratorEvent::StepRejected {
            step_label,
            problems,
            ..
        } => format!(
            "{} {} rejected the input: {}",
            CROSS,
            style(step_label).red(),
            style(problems.join("; ")).dim()
        ),
        OrchestratorEvent::StepFailed {
            step_label, error, ..
        } => {
            if step_label.is_empty() {
                format!("{} {}", CROSS, style(error).red())
            } else {
                format!("{} {}: {}", CROSS, style(step_label).red(), style(error).dim())
            }
        }
        OrchestratorEvent::Reset { pipeline_id } => {
            format!("{} Cleared stored state of {}", INFO, style(pipeline_id).bold())
        }
    }
}

/// Format what an invocation handed back
pub fn format_response(response: &Response) -> String {
    match response {
        Response::Prompt(prompt) => {
            let mut lines = vec![format!(
                "{} {} is waiting for input ({})",
                WARN,
                style(&prompt.step_label).bold(),
                style(&prompt.prompt.form.title).dim()
            )];
            for field in &prompt.prompt.missing {
                let hint = match prompt.prompt.defaults.get(field) {
                    Some(value) => format!(" (last value: {})", value),
                    None => String::new(),
                };
                lines.push(format!("  --input {}=...{}", style(field).cyan(), style(hint).dim()));
            }
            lines.join("\n")
        }
        Response::InProgress(status) => format!(
            "{} {} {} ({:.0}%) - run again to continue",
            SPINNER,
            style(&status.step_label).cyan(),
            status.message,
            status.progress() * 100.0
        ),
        Response::Success(summary) => format!("{} {}", CHECK, style(&summary.message).green()),
    }
}

/// Format a stored run for display
pub fn format_status(status: &RunStatus) -> String {
    let mut lines = vec![format!("{} Pipeline {}", INFO, style(&status.pipeline_id).bold())];

    match &status.state {
        Some(state) => lines.push(format!("  Position: {}", format_position(state.position()))),
        None => lines.push(format!("  Position: {}", style("not started").dim())),
    }
    if let Some(batch) = &status.batch {
        lines.push(format!(
            "  Batch: {}/{} {}",
            batch.batch_iteration(),
            batch.total_batch_iterations(),
            style(batch.status_message()).dim()
        ));
    }
    if let Some(metadata) = &status.metadata {
        lines.push(format!(
            "  Updated: {} by {}",
            style(metadata.updated_at.to_rfc3339()).dim(),
            style(&metadata.owner).cyan()
        ));
    }

    lines.join("\n")
}
