//! stepwise - resumable, multi-step pipeline runner

pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;
pub mod steps;

// Re-export commonly used types
pub use core::{
    BatchProgress, OrchestratorError, PipelineDefinition, PipelineRegistry, PipelineState,
    Position, Step, StepCatalog, StepContext, StepError, StepOutcome, StorageError, WithBatch,
    WithForm,
};
pub use execution::{Orchestrator, OrchestratorEvent, Response, StepFactory, StepRegistry};
pub use persistence::{InMemoryStateStore, StateStore};
#[cfg(feature = "sqlite")]
pub use persistence::SqliteStateStore;
