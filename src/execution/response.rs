//! What a single orchestrator invocation hands back to its caller

use crate::execution::form::FormPrompt;
use serde::{Deserialize, Serialize};

/// Result of one `Orchestrator::run` call that did not fail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    /// A step needs input; run again once the form is submitted
    Prompt(PromptResponse),
    /// A batch step did one iteration; run again to continue
    InProgress(ProgressStatus),
    /// Every step ran; nothing is stored for the pipeline anymore
    Success(RunSummary),
}

impl Response {
    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success(_))
    }

    /// Steps completed during this invocation, in order
    pub fn executed(&self) -> &[String] {
        match self {
            Response::Prompt(p) => &p.executed,
            Response::InProgress(p) => &p.executed,
            Response::Success(s) => &s.executed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptResponse {
    pub pipeline_id: String,
    pub pipeline_label: String,
    pub step_label: String,
    pub position: usize,
    pub prompt: FormPrompt,
    pub executed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressStatus {
    pub pipeline_id: String,
    pub pipeline_label: String,
    pub step_label: String,
    pub position: usize,
    pub iteration: u32,
    pub total_iterations: u32,
    pub message: String,
    pub executed: Vec<String>,
}

impl ProgressStatus {
    /// Fraction of the batch done (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_iterations == 0 {
            return 0.0;
        }
        self.iteration.min(self.total_iterations) as f64 / self.total_iterations as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub pipeline_id: String,
    pub pipeline_label: String,
    pub message: String,
    pub executed: Vec<String>,
}
