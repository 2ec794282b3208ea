//! `count` step: a batch step doing one unit of work per invocation

use crate::core::{BatchProgress, CatalogEntry, Step, StepContext, StepError, StepOutcome, WithBatch};
use crate::execution::FactoryError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone)]
pub struct CountStep {
    iterations: u32,
}

/// Carried between iterations
#[derive(Debug, Default, Serialize, Deserialize)]
struct Tally {
    processed: u32,
}

impl CountStep {
    pub fn new(iterations: u32) -> Self {
        Self { iterations }
    }

    pub fn from_entry(entry: &CatalogEntry) -> Result<Self, FactoryError> {
        let iterations = entry
            .params
            .get("iterations")
            .and_then(|v| v.as_u64())
            .filter(|n| *n >= 1 && *n <= u32::MAX as u64)
            .ok_or_else(|| super::invalid(entry, "'iterations' must be a positive integer"))?;
        Ok(Self::new(iterations as u32))
    }
}

#[async_trait]
impl Step for CountStep {
    fn id(&self) -> &str {
        "count"
    }

    fn label(&self) -> String {
        format!("Count to {}", self.iterations)
    }

    async fn execute(&self, ctx: &mut StepContext) -> Result<StepOutcome, StepError> {
        let progress = ctx
            .batch_mut()
            .ok_or_else(|| StepError::failed("count step needs batch progress"))?;

        if progress.needs_initialisation() {
            progress.set_total_batch_iterations(self.iterations);
        }

        let mut tally: Tally = progress
            .data_as()
            .map_err(|e| StepError::Other(e.into()))?
            .unwrap_or_default();
        tally.processed += 1;
        progress
            .set_data_from(&tally)
            .map_err(|e| StepError::Other(e.into()))?;
        progress.advance();

        if progress.completed() {
            ctx.set_value("counted", json!(tally.processed));
        }
        Ok(StepOutcome::Done)
    }

    fn as_batch(&self) -> Option<&dyn WithBatch> {
        Some(self)
    }
}

impl WithBatch for CountStep {
    fn progress_message(&self, progress: &BatchProgress) -> String {
        format!(
            "Counted {} of {}",
            progress.batch_iteration(),
            progress.total_batch_iterations()
        )
    }
}
