//! Step context - what a step sees while executing

use crate::core::state::BatchProgress;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Execution context handed to a step.
///
/// `data` is the run data shared by every step of a run and persisted between
/// invocations; `submission` and `batch` are filled in only for form and
/// batch steps respectively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepContext {
    /// Pipeline the step runs in
    pub pipeline_id: String,

    /// Ordinal of the step within its catalog
    pub position: usize,

    /// Run data carried across steps and invocations
    pub data: Map<String, Value>,

    /// Values submitted through the step's form
    pub submission: Option<Value>,

    /// Progress of a batch step
    pub batch: Option<BatchProgress>,

    /// Parameters configured for this catalog entry
    pub params: Value,
}

impl StepContext {
    pub fn new(pipeline_id: impl Into<String>, position: usize) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            position,
            data: Map::new(),
            submission: None,
            batch: None,
            params: Value::Null,
        }
    }

    /// Set a run data value
    pub fn set_value(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    /// Get a run data value
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Get a configured parameter
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// Mutable batch progress (batch steps only)
    pub fn batch_mut(&mut self) -> Option<&mut BatchProgress> {
        self.batch.as_mut()
    }

    /// A submitted form value
    pub fn submitted(&self, field: &str) -> Option<&Value> {
        self.submission.as_ref().and_then(|s| s.get(field))
    }
}
