//! Pipeline domain model

use crate::core::{
    catalog::StepCatalog,
    config::{PipelineConfig, StoreConfig},
    error::OrchestratorError,
};

/// A named pipeline: its label and the catalog of steps it runs
#[derive(Debug, Clone)]
pub struct PipelineDefinition {
    /// Pipeline ID, also the key of its stored state
    pub id: String,

    /// Human-readable name used in notifications
    pub label: String,

    /// Steps in execution order
    pub catalog: StepCatalog,
}

impl PipelineDefinition {
    pub fn new(id: impl Into<String>, catalog: StepCatalog) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            catalog,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Create a pipeline from configuration
    pub fn from_config(config: &PipelineConfig) -> Self {
        let catalog = config.steps.iter().fold(StepCatalog::new(), |catalog, step| {
            catalog.add_with(step.plugin.clone(), step.label.clone(), step.params.clone())
        });

        Self {
            id: config.id.clone(),
            label: config.label.clone().unwrap_or_else(|| config.id.clone()),
            catalog,
        }
    }
}

/// The set of pipelines an orchestrator can run
#[derive(Debug, Clone, Default)]
pub struct PipelineRegistry {
    pipelines: Vec<PipelineDefinition>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pipeline, replacing one with the same ID
    pub fn register(&mut self, definition: PipelineDefinition) {
        match self.pipelines.iter_mut().find(|p| p.id == definition.id) {
            Some(existing) => *existing = definition,
            None => self.pipelines.push(definition),
        }
    }

    pub fn with(mut self, definition: PipelineDefinition) -> Self {
        self.register(definition);
        self
    }

    pub fn get(&self, id: &str) -> Result<&PipelineDefinition, OrchestratorError> {
        self.pipelines
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| OrchestratorError::Configuration(format!("unknown pipeline '{}'", id)))
    }

    /// Pipeline IDs in registration order
    pub fn ids(&self) -> Vec<&str> {
        self.pipelines.iter().map(|p| p.id.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PipelineDefinition> {
        self.pipelines.iter()
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

/// Everything loaded from a configuration file
#[derive(Debug, Clone)]
pub struct Workspace {
    pub owner: Option<String>,
    pub store: StoreConfig,
    pub registry: PipelineRegistry,
}
