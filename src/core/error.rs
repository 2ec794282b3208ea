//! Error taxonomy for running pipelines

use crate::core::catalog::CatalogError;
use crate::core::step::{StepError, ValidationReport};
use thiserror::Error;

/// Failures of the state store
#[derive(Debug, Error)]
pub enum StorageError {
    #[cfg(feature = "sqlite")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("pipeline '{pipeline_id}' is locked by '{owner}'")]
    Locked { pipeline_id: String, owner: String },

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Everything `Orchestrator::run` can fail with.
///
/// Except for `Storage`, every variant is raised after the run's stored
/// state has been cleared.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("{pipeline}: no step plugin registered for '{plugin_id}'")]
    UnknownStep { pipeline: String, plugin_id: String },

    #[error("{pipeline}: step '{step}' rejected the run: {report}")]
    StepValidation {
        pipeline: String,
        step: String,
        report: ValidationReport,
    },

    #[error("{pipeline}: step '{step}' failed: {source}")]
    StepExecution {
        pipeline: String,
        step: String,
        #[source]
        source: StepError,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("{pipeline}: {source}")]
    OutOfRange {
        pipeline: String,
        #[source]
        source: CatalogError,
    },

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl OrchestratorError {
    /// Label of the step the error happened in, if any
    pub fn step_label(&self) -> Option<&str> {
        match self {
            OrchestratorError::StepValidation { step, .. }
            | OrchestratorError::StepExecution { step, .. } => Some(step.as_str()),
            OrchestratorError::UnknownStep { plugin_id, .. } => Some(plugin_id.as_str()),
            _ => None,
        }
    }
}
