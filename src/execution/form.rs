//! Form collaborator for steps that need interactive input

use crate::core::FormSpec;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What the user has to be shown to finish a form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormPrompt {
    pub form: FormSpec,

    /// Fields the submission is still missing
    pub missing: Vec<String>,

    /// Values already known from earlier steps, usable as defaults
    pub defaults: Map<String, Value>,
}

/// Result of building a step's form for the current invocation
#[derive(Debug, Clone, PartialEq)]
pub enum FormOutcome {
    /// Not submitted (or incomplete): show this to the user
    Pending(FormPrompt),
    /// Submission complete
    Submitted(Value),
}

/// Builds forms and reports whether they were submitted.
///
/// The orchestrator knows nothing about form internals; it only asks this
/// collaborator whether the form of the current step is complete.
#[async_trait]
pub trait FormBuilder: Send + Sync {
    async fn build(&self, form: &FormSpec, prior: &Map<String, Value>) -> FormOutcome;
}

/// Form builder fed with a fixed set of submitted values.
///
/// A form counts as submitted once every one of its fields has a value.
#[derive(Debug, Clone, Default)]
pub struct SubmittedValues {
    values: Map<String, Value>,
}

impl SubmittedValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[async_trait]
impl FormBuilder for SubmittedValues {
    async fn build(&self, form: &FormSpec, prior: &Map<String, Value>) -> FormOutcome {
        let missing: Vec<String> = form
            .fields
            .iter()
            .filter(|field| !self.values.contains_key(field.as_str()))
            .cloned()
            .collect();

        if missing.is_empty() {
            let submission: Map<String, Value> = form
                .fields
                .iter()
                .filter_map(|field| self.values.get(field).map(|v| (field.clone(), v.clone())))
                .collect();
            return FormOutcome::Submitted(Value::Object(submission));
        }

        let defaults = form
            .fields
            .iter()
            .filter_map(|field| prior.get(field).map(|v| (field.clone(), v.clone())))
            .collect();

        FormOutcome::Pending(FormPrompt {
            form: form.clone(),
            missing,
            defaults,
        })
    }
}
