//! `fail` step, for exercising failure handling

use crate::core::{CatalogEntry, Step, StepContext, StepError, StepOutcome, ValidationReport};
use crate::execution::FactoryError;
use async_trait::async_trait;

/// How the step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailMode {
    /// Raise a fatal execution error
    Error,
    /// Reject the run with a validation report
    Reject,
}

#[derive(Debug, Clone)]
pub struct FailStep {
    mode: FailMode,
    message: String,
}

impl FailStep {
    pub fn new(mode: FailMode, message: impl Into<String>) -> Self {
        Self {
            mode,
            message: message.into(),
        }
    }

    pub fn from_entry(entry: &CatalogEntry) -> Result<Self, FactoryError> {
        let mode = match super::string_param(entry, "mode")?.as_deref() {
            None | Some("error") => FailMode::Error,
            Some("reject") => FailMode::Reject,
            Some(other) => {
                return Err(super::invalid(
                    entry,
                    format!("unknown mode '{}', expected 'error' or 'reject'", other),
                ))
            }
        };
        let message =
            super::string_param(entry, "message")?.unwrap_or_else(|| "step failed".to_string());
        Ok(Self::new(mode, message))
    }
}

#[async_trait]
impl Step for FailStep {
    fn id(&self) -> &str {
        "fail"
    }

    async fn execute(&self, _ctx: &mut StepContext) -> Result<StepOutcome, StepError> {
        match self.mode {
            FailMode::Error => Err(StepError::failed(self.message.clone())),
            FailMode::Reject => Ok(StepOutcome::Rejected(ValidationReport::single(
                self.message.clone(),
            ))),
        }
    }
}
