//! Orchestrator configuration from YAML

use crate::core::pipeline::{PipelineDefinition, PipelineRegistry, Workspace};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "stepwise.yaml";

/// Top-level configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Identity recorded in state metadata and locks
    #[serde(default)]
    pub owner: Option<String>,

    /// State store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Pipeline definitions
    pub pipelines: Vec<PipelineConfig>,
}

/// State store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Database file (sqlite backend only)
    #[serde(default)]
    pub path: Option<String>,

    /// Age after which another owner's lock is considered stale
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: None,
            lock_timeout_secs: default_lock_timeout(),
        }
    }
}

impl StoreConfig {
    /// Configured database path, or `<data_local_dir>/stepwise/state.db`
    pub fn database_path(&self) -> PathBuf {
        match &self.path {
            Some(path) => PathBuf::from(path),
            None => dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("stepwise")
                .join("state.db"),
        }
    }
}

fn default_lock_timeout() -> u64 {
    300
}

/// Which state store implementation to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Durable SQLite database
    #[default]
    Sqlite,
    /// Process-local map, lost on exit
    Memory,
}

/// Pipeline configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Unique pipeline identifier
    pub id: String,

    /// Human-readable pipeline name
    #[serde(default)]
    pub label: Option<String>,

    /// Steps in execution order
    pub steps: Vec<StepConfig>,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Step plugin ID
    pub plugin: String,

    /// Label override
    #[serde(default)]
    pub label: Option<String>,

    /// Plugin parameters
    #[serde(default)]
    pub params: Value,
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: AppConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.pipelines.is_empty() {
            anyhow::bail!("No pipelines defined");
        }

        let mut seen_ids = HashSet::new();
        for pipeline in &self.pipelines {
            if !seen_ids.insert(&pipeline.id) {
                anyhow::bail!("Duplicate pipeline ID: {}", pipeline.id);
            }
            if pipeline.steps.is_empty() {
                anyhow::bail!("Pipeline '{}' has no steps", pipeline.id);
            }
            for (position, step) in pipeline.steps.iter().enumerate() {
                if step.plugin.trim().is_empty() {
                    anyhow::bail!(
                        "Pipeline '{}' step {} has an empty plugin ID",
                        pipeline.id,
                        position
                    );
                }
            }
        }

        Ok(())
    }

    /// Check every step plugin against the set the binary can build
    pub fn validate_plugins<F>(&self, is_known: F) -> Result<()>
    where
        F: Fn(&str) -> bool,
    {
        for pipeline in &self.pipelines {
            for step in &pipeline.steps {
                if !is_known(&step.plugin) {
                    anyhow::bail!(
                        "Pipeline '{}' references unknown step plugin '{}'",
                        pipeline.id,
                        step.plugin
                    );
                }
            }
        }
        Ok(())
    }

    /// Convert config to the runtime model
    pub fn to_workspace(&self) -> Workspace {
        let registry = self
            .pipelines
            .iter()
            .map(PipelineDefinition::from_config)
            .fold(PipelineRegistry::new(), |registry, p| registry.with(p));

        Workspace {
            owner: self.owner.clone(),
            store: self.store.clone(),
            registry,
        }
    }
}
