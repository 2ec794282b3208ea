//! Step catalog - the ordered list of steps making up one pipeline

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Error raised when the catalog is indexed outside its bounds
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("position {position} is out of range for a catalog of {len} steps")]
    OutOfRange { position: usize, len: usize },
}

/// A single entry of a step catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Plugin ID resolved by the step factory
    pub plugin_id: String,

    /// Dense, zero-based index of this entry
    pub ordinal: usize,

    /// Label override (falls back to the step's own label)
    #[serde(default)]
    pub label: Option<String>,

    /// Plugin parameters handed to the factory
    #[serde(default)]
    pub params: Value,
}

/// Ordered, addressable list of step plugin IDs with a forward cursor.
///
/// The cursor follows the usual iterator protocol: `valid()` turns false once
/// `key()` has moved past the last entry, which is how the orchestrator
/// detects that a pipeline has finished.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepCatalog {
    entries: Vec<CatalogEntry>,
    #[serde(skip)]
    cursor: usize,
}

impl StepCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step to the end of the catalog
    pub fn add(mut self, plugin_id: impl Into<String>) -> Self {
        self.push(plugin_id, None, Value::Null);
        self
    }

    /// Append a step carrying a label override and parameters
    pub fn add_with(
        mut self,
        plugin_id: impl Into<String>,
        label: Option<String>,
        params: Value,
    ) -> Self {
        self.push(plugin_id, label, params);
        self
    }

    fn push(&mut self, plugin_id: impl Into<String>, label: Option<String>, params: Value) {
        let ordinal = self.entries.len();
        self.entries.push(CatalogEntry {
            plugin_id: plugin_id.into(),
            ordinal,
            label,
            params,
        });
    }

    /// Plugin ID at the cursor
    pub fn current(&self) -> Result<&str, CatalogError> {
        self.get(self.cursor)
    }

    /// Plugin ID at `position`
    pub fn get(&self, position: usize) -> Result<&str, CatalogError> {
        self.entry(position).map(|e| e.plugin_id.as_str())
    }

    /// Full entry at `position`
    pub fn entry(&self, position: usize) -> Result<&CatalogEntry, CatalogError> {
        self.entries.get(position).ok_or(CatalogError::OutOfRange {
            position,
            len: self.entries.len(),
        })
    }

    /// Move the cursor to `position`. Seeking one past the end is allowed
    /// and leaves the catalog invalid; anything further is out of range.
    pub fn seek(&mut self, position: usize) -> Result<(), CatalogError> {
        if position > self.entries.len() {
            return Err(CatalogError::OutOfRange {
                position,
                len: self.entries.len(),
            });
        }
        self.cursor = position;
        Ok(())
    }

    pub fn next(&mut self) {
        if self.cursor < self.entries.len() {
            self.cursor += 1;
        }
    }

    pub fn key(&self) -> usize {
        self.cursor
    }

    pub fn valid(&self) -> bool {
        self.cursor < self.entries.len()
    }

    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }
}
