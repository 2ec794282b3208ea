//! Step contract consumed by the orchestrator

use crate::core::{context::StepContext, state::BatchProgress};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Fatal failure raised by step logic
#[derive(Debug, Error)]
pub enum StepError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StepError {
    pub fn failed(message: impl Into<String>) -> Self {
        StepError::Failed(message.into())
    }
}

/// Problems a step found with its input
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub problems: Vec<String>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(problem: impl Into<String>) -> Self {
        Self {
            problems: vec![problem.into()],
        }
    }

    pub fn add(&mut self, problem: impl Into<String>) {
        self.problems.push(problem.into());
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.problems.join("; "))
    }
}

/// What a step reports after running without a fatal error
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// The step did its work (for batch steps: this iteration's work)
    Done,
    /// The step rejected its input; the run cannot continue past it
    Rejected(ValidationReport),
}

/// Description of the input a form step needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormSpec {
    pub form_id: String,
    pub title: String,
    /// Names of the values the submission must carry
    pub fields: Vec<String>,
}

/// A single unit of pipeline work.
///
/// Steps opt into interactive input or chunked execution through
/// [`Step::as_form`] and [`Step::as_batch`]; a step must not do both.
#[async_trait]
pub trait Step: Send + Sync {
    /// Plugin ID this step was resolved from
    fn id(&self) -> &str;

    /// Human-readable name used in notifications
    fn label(&self) -> String {
        self.id().to_string()
    }

    /// Run the step. For form steps `ctx.submission` holds the submitted
    /// values; for batch steps `ctx.batch` holds the progress to update.
    async fn execute(&self, ctx: &mut StepContext) -> Result<StepOutcome, StepError>;

    fn as_form(&self) -> Option<&dyn WithForm> {
        None
    }

    fn as_batch(&self) -> Option<&dyn WithBatch> {
        None
    }
}

/// Capability of steps that need interactive input before executing
pub trait WithForm: Send + Sync {
    fn form(&self) -> FormSpec;
}

/// Capability of steps that execute across several bounded iterations
pub trait WithBatch: Send + Sync {
    /// Status line shown between iterations when the step set none
    fn progress_message(&self, progress: &BatchProgress) -> String {
        format!(
            "Processed {} of {}",
            progress.batch_iteration(),
            progress.total_batch_iterations()
        )
    }
}
