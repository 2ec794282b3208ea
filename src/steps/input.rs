//! `input` step: collects named values through a form

use crate::core::{
    CatalogEntry, FormSpec, Step, StepContext, StepError, StepOutcome, ValidationReport, WithForm,
};
use crate::execution::FactoryError;
use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct InputStep {
    form_id: String,
    title: String,
    fields: Vec<String>,
}

impl InputStep {
    pub fn new(form_id: impl Into<String>, title: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            form_id: form_id.into(),
            title: title.into(),
            fields,
        }
    }

    pub fn from_entry(entry: &CatalogEntry) -> Result<Self, FactoryError> {
        let fields: Vec<String> = match entry.params.get("fields") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| super::invalid(entry, "'fields' must list strings"))
                })
                .collect::<Result<_, _>>()?,
            _ => return Err(super::invalid(entry, "'fields' must be a non-empty list")),
        };
        if fields.is_empty() {
            return Err(super::invalid(entry, "'fields' must be a non-empty list"));
        }

        let title = super::string_param(entry, "title")?
            .unwrap_or_else(|| format!("Provide {}", fields.join(", ")));
        Ok(Self::new(
            format!("input_{}", entry.ordinal),
            title,
            fields,
        ))
    }
}

#[async_trait]
impl Step for InputStep {
    fn id(&self) -> &str {
        "input"
    }

    fn label(&self) -> String {
        self.title.clone()
    }

    async fn execute(&self, ctx: &mut StepContext) -> Result<StepOutcome, StepError> {
        let submission = ctx
            .submission
            .clone()
            .ok_or_else(|| StepError::failed("no form submission available"))?;

        let mut report = ValidationReport::new();
        for field in &self.fields {
            match submission.get(field) {
                Some(Value::String(s)) if s.trim().is_empty() => {
                    report.add(format!("'{}' must not be empty", field))
                }
                Some(Value::Null) | None => report.add(format!("'{}' is required", field)),
                Some(value) => ctx.set_value(field.clone(), value.clone()),
            }
        }

        if report.is_empty() {
            Ok(StepOutcome::Done)
        } else {
            Ok(StepOutcome::Rejected(report))
        }
    }

    fn as_form(&self) -> Option<&dyn WithForm> {
        Some(self)
    }
}

impl WithForm for InputStep {
    fn form(&self) -> FormSpec {
        FormSpec {
            form_id: self.form_id.clone(),
            title: self.title.clone(),
            fields: self.fields.clone(),
        }
    }
}
