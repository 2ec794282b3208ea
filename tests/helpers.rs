//! Test utilities for stepwise scenarios
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stepwise::core::config::AppConfig;
use stepwise::core::{
    BatchProgress, FormSpec, PipelineState, Step, StepContext, StepError, StepOutcome,
    StorageError, ValidationReport, WithBatch, WithForm,
};
use stepwise::execution::{
    FormBuilder, FormOutcome, FormPrompt, Orchestrator, OrchestratorEvent, StepRegistry,
};
use stepwise::persistence::{InMemoryStateStore, StateMetadata, StateStore};

/// Names of executed steps, in order, across invocations
pub type ExecutionLog = Arc<Mutex<Vec<String>>>;

fn step_name(entry: &stepwise::core::CatalogEntry) -> String {
    entry
        .params
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}{}", entry.plugin_id, entry.ordinal))
}

/// Plain step that records its name
pub struct RecordStep {
    name: String,
    log: ExecutionLog,
}

#[async_trait]
impl Step for RecordStep {
    fn id(&self) -> &str {
        "record"
    }

    fn label(&self) -> String {
        self.name.clone()
    }

    async fn execute(&self, ctx: &mut StepContext) -> Result<StepOutcome, StepError> {
        self.log.lock().unwrap().push(self.name.clone());
        ctx.set_value(format!("{}_seen", self.name), Value::Bool(true));
        Ok(StepOutcome::Done)
    }
}

/// Form step that copies its submission into run data
pub struct FormStep {
    name: String,
    fields: Vec<String>,
    log: ExecutionLog,
}

#[async_trait]
impl Step for FormStep {
    fn id(&self) -> &str {
        "form"
    }

    fn label(&self) -> String {
        self.name.clone()
    }

    async fn execute(&self, ctx: &mut StepContext) -> Result<StepOutcome, StepError> {
        self.log.lock().unwrap().push(self.name.clone());
        let submission = ctx
            .submission
            .clone()
            .ok_or_else(|| StepError::failed("form executed without a submission"))?;
        if let Value::Object(values) = submission {
            ctx.data.extend(values);
        }
        Ok(StepOutcome::Done)
    }

    fn as_form(&self) -> Option<&dyn WithForm> {
        Some(self)
    }
}

impl WithForm for FormStep {
    fn form(&self) -> FormSpec {
        FormSpec {
            form_id: format!("{}_form", self.name),
            title: self.name.clone(),
            fields: self.fields.clone(),
        }
    }
}

/// Batch step doing one iteration per invocation
pub struct BatchStep {
    name: String,
    total: u32,
    log: ExecutionLog,
}

#[async_trait]
impl Step for BatchStep {
    fn id(&self) -> &str {
        "batch"
    }

    fn label(&self) -> String {
        self.name.clone()
    }

    async fn execute(&self, ctx: &mut StepContext) -> Result<StepOutcome, StepError> {
        let progress = ctx
            .batch_mut()
            .ok_or_else(|| StepError::failed("batch executed without progress"))?;
        if progress.needs_initialisation() {
            progress.set_total_batch_iterations(self.total);
        }
        progress.advance();
        let iteration = progress.batch_iteration();

        self.log
            .lock()
            .unwrap()
            .push(format!("{}#{}", self.name, iteration));
        Ok(StepOutcome::Done)
    }

    fn as_batch(&self) -> Option<&dyn WithBatch> {
        Some(self)
    }
}

impl WithBatch for BatchStep {}

/// Plain step that fails, either fatally or with a validation rejection
pub struct FailingStep {
    name: String,
    reject: bool,
    log: ExecutionLog,
}

#[async_trait]
impl Step for FailingStep {
    fn id(&self) -> &str {
        "fail"
    }

    fn label(&self) -> String {
        self.name.clone()
    }

    async fn execute(&self, _ctx: &mut StepContext) -> Result<StepOutcome, StepError> {
        self.log.lock().unwrap().push(self.name.clone());
        if self.reject {
            let mut report = ValidationReport::new();
            report.add("graph is missing");
            report.add("format is unsupported");
            Ok(StepOutcome::Rejected(report))
        } else {
            Err(StepError::failed("disk on fire"))
        }
    }
}

/// Plain step that takes a while, so overlapping runs can collide
pub struct SlowStep {
    log: ExecutionLog,
}

#[async_trait]
impl Step for SlowStep {
    fn id(&self) -> &str {
        "slow"
    }

    async fn execute(&self, _ctx: &mut StepContext) -> Result<StepOutcome, StepError> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        self.log.lock().unwrap().push("slow".to_string());
        Ok(StepOutcome::Done)
    }
}

/// A step claiming both capabilities, which the orchestrator refuses
pub struct HybridStep;

#[async_trait]
impl Step for HybridStep {
    fn id(&self) -> &str {
        "hybrid"
    }

    async fn execute(&self, _ctx: &mut StepContext) -> Result<StepOutcome, StepError> {
        Ok(StepOutcome::Done)
    }

    fn as_form(&self) -> Option<&dyn WithForm> {
        Some(self)
    }

    fn as_batch(&self) -> Option<&dyn WithBatch> {
        Some(self)
    }
}

impl WithForm for HybridStep {
    fn form(&self) -> FormSpec {
        FormSpec {
            form_id: "hybrid".to_string(),
            title: "Hybrid".to_string(),
            fields: vec![],
        }
    }
}

impl WithBatch for HybridStep {
    fn progress_message(&self, progress: &BatchProgress) -> String {
        format!("{}", progress.batch_iteration())
    }
}

/// Step factory knowing the scripted plugins above
pub fn scripted_factory(log: &ExecutionLog) -> StepRegistry {
    let record_log = log.clone();
    let form_log = log.clone();
    let batch_log = log.clone();
    let fail_log = log.clone();
    let reject_log = log.clone();
    let slow_log = log.clone();

    StepRegistry::new()
        .with("record", move |entry| {
            Ok(Box::new(RecordStep {
                name: step_name(entry),
                log: record_log.clone(),
            }) as Box<dyn Step>)
        })
        .with("form", move |entry| {
            let fields = entry
                .params
                .get("fields")
                .and_then(Value::as_array)
                .map(|fields| {
                    fields
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_else(|| vec!["graph".to_string()]);
            Ok(Box::new(FormStep {
                name: step_name(entry),
                fields,
                log: form_log.clone(),
            }) as Box<dyn Step>)
        })
        .with("batch", move |entry| {
            let total = entry
                .params
                .get("total")
                .and_then(Value::as_u64)
                .unwrap_or(3) as u32;
            Ok(Box::new(BatchStep {
                name: step_name(entry),
                total,
                log: batch_log.clone(),
            }) as Box<dyn Step>)
        })
        .with("fail", move |entry| {
            Ok(Box::new(FailingStep {
                name: step_name(entry),
                reject: false,
                log: fail_log.clone(),
            }) as Box<dyn Step>)
        })
        .with("reject", move |entry| {
            Ok(Box::new(FailingStep {
                name: step_name(entry),
                reject: true,
                log: reject_log.clone(),
            }) as Box<dyn Step>)
        })
        .with("hybrid", |_| Ok(Box::new(HybridStep) as Box<dyn Step>))
        .with("slow", move |_| {
            Ok(Box::new(SlowStep {
                log: slow_log.clone(),
            }) as Box<dyn Step>)
        })
}

/// Form builder that reports forms as submitted once switched on,
/// simulating the user filling in the form between two requests
#[derive(Default)]
pub struct ToggleForms {
    submitted: AtomicBool,
    values: Mutex<Map<String, Value>>,
}

impl ToggleForms {
    pub fn submit(&self, values: Map<String, Value>) {
        *self.values.lock().unwrap() = values;
        self.submitted.store(true, Ordering::SeqCst);
    }

    pub fn withdraw(&self) {
        self.submitted.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl FormBuilder for ToggleForms {
    async fn build(&self, form: &FormSpec, prior: &Map<String, Value>) -> FormOutcome {
        if self.submitted.load(Ordering::SeqCst) {
            return FormOutcome::Submitted(Value::Object(self.values.lock().unwrap().clone()));
        }
        FormOutcome::Pending(FormPrompt {
            form: form.clone(),
            missing: form.fields.clone(),
            defaults: prior.clone(),
        })
    }
}

/// Everything a scenario needs to drive and inspect a pipeline
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub store: Arc<dyn StateStore>,
    pub forms: Arc<ToggleForms>,
    pub log: ExecutionLog,
    pub events: Arc<Mutex<Vec<OrchestratorEvent>>>,
}

impl Harness {
    /// Build a harness for the pipelines defined in `yaml`
    pub async fn from_yaml(yaml: &str) -> Self {
        Self::with_store(yaml, Arc::new(InMemoryStateStore::new())).await
    }

    /// Build a harness whose orchestrator keeps its state in `store`
    pub async fn with_store(yaml: &str, store: Arc<dyn StateStore>) -> Self {
        let config = AppConfig::from_yaml(yaml).unwrap();
        let log: ExecutionLog = Arc::new(Mutex::new(Vec::new()));
        let forms = Arc::new(ToggleForms::default());

        let orchestrator = Orchestrator::new(
            config.to_workspace().registry,
            Arc::new(scripted_factory(&log)),
            store.clone(),
        )
        .with_form_builder(forms.clone())
        .with_owner("tester");

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        orchestrator
            .add_event_handler(move |event| sink.lock().unwrap().push(event))
            .await;

        Self {
            orchestrator,
            store,
            forms,
            log,
            events,
        }
    }

    pub fn executed(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear_log(&self) {
        self.log.lock().unwrap().clear();
    }

    pub fn events(&self) -> Vec<OrchestratorEvent> {
        self.events.lock().unwrap().clone()
    }
}

/// Store whose batch progress writes fail; everything else goes to memory
#[derive(Default)]
pub struct BrokenBatchStore {
    inner: InMemoryStateStore,
}

#[async_trait]
impl StateStore for BrokenBatchStore {
    async fn is_persisted(&self, pipeline_id: &str) -> Result<bool, StorageError> {
        self.inner.is_persisted(pipeline_id).await
    }

    async fn get_state(&self, pipeline_id: &str) -> Result<Option<PipelineState>, StorageError> {
        self.inner.get_state(pipeline_id).await
    }

    async fn set_state(&self, state: &PipelineState, owner: &str) -> Result<(), StorageError> {
        self.inner.set_state(state, owner).await
    }

    async fn get_batch_progress(&self, pipeline_id: &str) -> Result<BatchProgress, StorageError> {
        self.inner.get_batch_progress(pipeline_id).await
    }

    async fn set_batch_progress(
        &self,
        _pipeline_id: &str,
        _progress: &BatchProgress,
    ) -> Result<(), StorageError> {
        Err(StorageError::Backend("disk full".to_string()))
    }

    async fn reset_batch_progress(&self, pipeline_id: &str) -> Result<(), StorageError> {
        self.inner.reset_batch_progress(pipeline_id).await
    }

    async fn get_run_data(&self, pipeline_id: &str) -> Result<Map<String, Value>, StorageError> {
        self.inner.get_run_data(pipeline_id).await
    }

    async fn set_run_data(
        &self,
        pipeline_id: &str,
        data: &Map<String, Value>,
    ) -> Result<(), StorageError> {
        self.inner.set_run_data(pipeline_id, data).await
    }

    async fn reset(&self, pipeline_id: &str) -> Result<(), StorageError> {
        self.inner.reset(pipeline_id).await
    }

    async fn state_metadata(
        &self,
        pipeline_id: &str,
    ) -> Result<Option<StateMetadata>, StorageError> {
        self.inner.state_metadata(pipeline_id).await
    }

    async fn acquire_lock(&self, pipeline_id: &str, owner: &str) -> Result<(), StorageError> {
        self.inner.acquire_lock(pipeline_id, owner).await
    }

    async fn release_lock(&self, pipeline_id: &str, owner: &str) -> Result<(), StorageError> {
        self.inner.release_lock(pipeline_id, owner).await
    }
}

/// Assert nothing at all is stored for `pipeline_id`
pub async fn assert_store_empty(store: &dyn StateStore, pipeline_id: &str) {
    assert!(
        !store.is_persisted(pipeline_id).await.unwrap(),
        "expected no stored state for {}",
        pipeline_id
    );
    assert!(store.get_run_data(pipeline_id).await.unwrap().is_empty());
    assert!(store
        .get_batch_progress(pipeline_id)
        .await
        .unwrap()
        .needs_initialisation());
}

/// Build a JSON object from string pairs
pub fn values(pairs: &[(&str, &str)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect()
}
