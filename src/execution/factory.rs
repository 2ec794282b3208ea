//! Step factory - resolves catalog entries into step instances

use crate::core::{CatalogEntry, Step};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Why a catalog entry could not be turned into a step
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FactoryError {
    #[error("no step plugin registered for '{0}'")]
    UnknownStep(String),

    #[error("invalid parameters for step '{plugin_id}': {message}")]
    InvalidParams { plugin_id: String, message: String },
}

/// Builds steps from their plugin IDs
pub trait StepFactory: Send + Sync {
    fn create(&self, entry: &CatalogEntry) -> Result<Box<dyn Step>, FactoryError>;

    /// Whether `plugin_id` can be built at all
    fn knows(&self, plugin_id: &str) -> bool;
}

type Constructor = Arc<dyn Fn(&CatalogEntry) -> Result<Box<dyn Step>, FactoryError> + Send + Sync>;

/// Step factory backed by a table of constructors
#[derive(Clone, Default)]
pub struct StepRegistry {
    constructors: HashMap<String, Constructor>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor for `plugin_id`, replacing any previous one
    pub fn register<F>(&mut self, plugin_id: impl Into<String>, constructor: F)
    where
        F: Fn(&CatalogEntry) -> Result<Box<dyn Step>, FactoryError> + Send + Sync + 'static,
    {
        self.constructors
            .insert(plugin_id.into(), Arc::new(constructor));
    }

    pub fn with<F>(mut self, plugin_id: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&CatalogEntry) -> Result<Box<dyn Step>, FactoryError> + Send + Sync + 'static,
    {
        self.register(plugin_id, constructor);
        self
    }

    /// Registered plugin IDs, sorted
    pub fn plugin_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        ids.sort();
        ids
    }
}

impl StepFactory for StepRegistry {
    fn create(&self, entry: &CatalogEntry) -> Result<Box<dyn Step>, FactoryError> {
        let constructor = self
            .constructors
            .get(&entry.plugin_id)
            .ok_or_else(|| FactoryError::UnknownStep(entry.plugin_id.clone()))?;
        constructor(entry)
    }

    fn knows(&self, plugin_id: &str) -> bool {
        self.constructors.contains_key(plugin_id)
    }
}

impl std::fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepRegistry")
            .field("plugins", &self.plugin_ids())
            .finish()
    }
}
