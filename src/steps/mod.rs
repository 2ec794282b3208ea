//! Built-in steps available to configured pipelines
//!
//! - `log`: writes a message, with `{{ key }}` replaced from run data
//! - `fail`: raises an execution error or rejects the run
//! - `input`: asks for named values and stores them in run data
//! - `count`: counts up to `iterations`, one iteration per invocation

pub mod count;
pub mod fail;
pub mod input;
pub mod log;

pub use count::CountStep;
pub use fail::FailStep;
pub use input::InputStep;
pub use log::LogStep;

use crate::core::{CatalogEntry, Step};
use crate::execution::{FactoryError, StepRegistry};

/// Step registry with every built-in step
pub fn builtin_registry() -> StepRegistry {
    StepRegistry::new()
        .with("log", |entry| Ok(Box::new(LogStep::from_entry(entry)?) as Box<dyn Step>))
        .with("fail", |entry| Ok(Box::new(FailStep::from_entry(entry)?) as Box<dyn Step>))
        .with("input", |entry| Ok(Box::new(InputStep::from_entry(entry)?) as Box<dyn Step>))
        .with("count", |entry| Ok(Box::new(CountStep::from_entry(entry)?) as Box<dyn Step>))
}

/// String parameter of a catalog entry
pub(crate) fn string_param(entry: &CatalogEntry, key: &str) -> Result<Option<String>, FactoryError> {
    match entry.params.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| invalid(entry, format!("'{}' must be a string", key))),
    }
}

pub(crate) fn invalid(entry: &CatalogEntry, message: impl Into<String>) -> FactoryError {
    FactoryError::InvalidParams {
        plugin_id: entry.plugin_id.clone(),
        message: message.into(),
    }
}
