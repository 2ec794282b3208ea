//! Execution state models

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Position of a run within its step catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Position {
    /// Index of the step to execute next
    At(usize),
    /// Past the last step
    Final,
}

impl Position {
    /// Storage encoding: the index, or -1 for `Final`
    pub fn to_index(self) -> i64 {
        match self {
            Position::At(index) => index as i64,
            Position::Final => -1,
        }
    }

    /// Inverse of [`Position::to_index`]. Any negative value decodes to `Final`.
    pub fn from_index(index: i64) -> Self {
        if index < 0 {
            Position::Final
        } else {
            Position::At(index as usize)
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::At(index) => write!(f, "{}", index),
            Position::Final => write!(f, "FINAL"),
        }
    }
}

/// Which pipeline a run belongs to and where it currently stands.
///
/// Immutable: advancing means building a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineState {
    pipeline_id: String,
    position: Position,
}

impl PipelineState {
    pub fn new(pipeline_id: impl Into<String>, position: Position) -> Self {
        Self {
            pipeline_id: pipeline_id.into(),
            position,
        }
    }

    /// Initial state: first step of the pipeline
    pub fn initial(pipeline_id: impl Into<String>) -> Self {
        Self::new(pipeline_id, Position::At(0))
    }

    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// A new state for the same pipeline at `position`
    pub fn at(&self, position: Position) -> Self {
        Self::new(self.pipeline_id.clone(), position)
    }
}

/// Progress of a step that executes in bounded chunks.
///
/// Only the step reads and writes `data`; the orchestrator just carries it
/// between invocations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchProgress {
    total_iterations: u32,
    current_iteration: u32,
    completed: bool,
    #[serde(default)]
    status_message: String,
    #[serde(default)]
    data: Value,

    /// True only for a value that has never been stored and reloaded
    #[serde(skip)]
    needs_initialisation: bool,
}

impl BatchProgress {
    pub fn new() -> Self {
        Self {
            total_iterations: 1,
            current_iteration: 0,
            completed: false,
            status_message: String::new(),
            data: Value::Null,
            needs_initialisation: true,
        }
    }

    /// Rebuild a previously persisted progress value
    pub fn restore(
        total_iterations: u32,
        current_iteration: u32,
        completed: bool,
        status_message: String,
        data: Value,
    ) -> Self {
        let mut progress = Self {
            total_iterations: total_iterations.max(1),
            current_iteration,
            completed: false,
            status_message,
            data,
            needs_initialisation: false,
        };
        progress.set_completed(completed);
        progress
    }

    pub fn completed(&self) -> bool {
        self.completed
    }

    /// Marking the progress complete pulls the iteration counter up to the
    /// total so that `completed` always implies `current >= total`.
    pub fn set_completed(&mut self, completed: bool) {
        self.completed = completed;
        if completed && self.current_iteration < self.total_iterations {
            self.current_iteration = self.total_iterations;
        }
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn set_data(&mut self, data: Value) {
        self.data = data;
    }

    /// Decode the carried data into a step-defined type
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        if self.data.is_null() {
            return Ok(None);
        }
        serde_json::from_value(self.data.clone()).map(Some)
    }

    /// Store a step-defined type as the carried data
    pub fn set_data_from<T: Serialize>(&mut self, data: &T) -> Result<(), serde_json::Error> {
        self.data = serde_json::to_value(data)?;
        Ok(())
    }

    pub fn total_batch_iterations(&self) -> u32 {
        self.total_iterations
    }

    /// Zero is treated as "no batching" (one iteration)
    pub fn set_total_batch_iterations(&mut self, total: u32) {
        self.total_iterations = total.max(1);
        if self.completed {
            self.set_completed(true);
        }
    }

    pub fn batch_iteration(&self) -> u32 {
        self.current_iteration
    }

    pub fn set_batch_iteration(&mut self, iteration: u32) {
        self.current_iteration = iteration;
    }

    pub fn needs_initialisation(&self) -> bool {
        self.needs_initialisation
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn set_status_message(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
    }

    /// Count one finished iteration, completing once the total is reached
    pub fn advance(&mut self) {
        self.current_iteration += 1;
        if self.current_iteration >= self.total_iterations {
            self.set_completed(true);
        }
    }

    /// Fraction of work done (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        let done = self.current_iteration.min(self.total_iterations);
        done as f64 / self.total_iterations as f64
    }
}

impl Default for BatchProgress {
    fn default() -> Self {
        Self::new()
    }
}
