//! `log` step

use crate::core::{CatalogEntry, Step, StepContext, StepError, StepOutcome};
use crate::execution::FactoryError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::info;

/// Logs a message. `{{ key }}` placeholders are filled from run data.
#[derive(Debug, Clone)]
pub struct LogStep {
    message: String,
}

impl LogStep {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn from_entry(entry: &CatalogEntry) -> Result<Self, FactoryError> {
        let message = super::string_param(entry, "message")?
            .unwrap_or_else(|| format!("Reached step {}", entry.ordinal + 1));
        Ok(Self::new(message))
    }

    /// Render the message with variable substitution
    pub fn render(&self, data: &Map<String, Value>) -> String {
        let mut message = self.message.clone();

        for (key, value) in data {
            let placeholder = format!("{{{{ {} }}}}", key);
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            message = message.replace(&placeholder, &rendered);
        }

        message
    }
}

#[async_trait]
impl Step for LogStep {
    fn id(&self) -> &str {
        "log"
    }

    fn label(&self) -> String {
        "Log message".to_string()
    }

    async fn execute(&self, ctx: &mut StepContext) -> Result<StepOutcome, StepError> {
        let message = self.render(&ctx.data);
        info!("[{}] {}", ctx.pipeline_id, message);
        ctx.set_value("last_message", Value::String(message));
        Ok(StepOutcome::Done)
    }
}
