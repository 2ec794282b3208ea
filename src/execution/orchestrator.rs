//! Orchestrator - drives a pipeline run forward, one invocation at a time
//!
//! Each `run` call loads the stored state of the pipeline (or starts at the
//! first step), then executes steps back to back until one of them needs
//! input, a batch step has more iterations to go, the pipeline finishes, or
//! something fails. Only the position of the run survives between calls,
//! together with the batch progress of the current step and the run data.

use crate::{
    core::{
        BatchProgress, OrchestratorError, PipelineDefinition, PipelineRegistry, PipelineState,
        Position, Step, StepContext, StepOutcome, ValidationReport,
    },
    execution::{
        factory::{FactoryError, StepFactory},
        form::{FormBuilder, FormOutcome, SubmittedValues},
        response::{ProgressStatus, PromptResponse, Response, RunSummary},
    },
    persistence::{StateMetadata, StateStore},
};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Events that can occur while a pipeline is driven
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorEvent {
    RunStarted {
        pipeline_id: String,
        pipeline_label: String,
    },
    RunResumed {
        pipeline_id: String,
        pipeline_label: String,
        position: Position,
    },
    StepStarted {
        pipeline_label: String,
        step_label: String,
        position: usize,
    },
    StepCompleted {
        pipeline_label: String,
        step_label: String,
        position: usize,
    },
    AwaitingInput {
        pipeline_label: String,
        step_label: String,
        missing: Vec<String>,
    },
    BatchIteration {
        pipeline_label: String,
        step_label: String,
        iteration: u32,
        total_iterations: u32,
    },
    PipelineSucceeded {
        pipeline_label: String,
    },
    StepRejected {
        pipeline_label: String,
        step_label: String,
        problems: Vec<String>,
    },
    StepFailed {
        pipeline_label: String,
        step_label: String,
        error: String,
    },
    Reset {
        pipeline_id: String,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(OrchestratorEvent) + Send + Sync>;

/// What is stored for a pipeline right now
#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub pipeline_id: String,
    pub state: Option<PipelineState>,
    pub batch: Option<BatchProgress>,
    pub metadata: Option<StateMetadata>,
}

/// Drives pipelines through their step catalogs
pub struct Orchestrator {
    registry: PipelineRegistry,
    factory: Arc<dyn StepFactory>,
    store: Arc<dyn StateStore>,
    forms: Arc<dyn FormBuilder>,
    owner: String,
    instance_id: Uuid,
    run_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    event_handlers: Mutex<Vec<EventHandler>>,
}

impl Orchestrator {
    pub fn new(
        registry: PipelineRegistry,
        factory: Arc<dyn StepFactory>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            registry,
            factory,
            store,
            forms: Arc::new(SubmittedValues::new()),
            owner: "anonymous".to_string(),
            instance_id: Uuid::new_v4(),
            run_locks: Mutex::new(HashMap::new()),
            event_handlers: Mutex::new(Vec::new()),
        }
    }

    /// Use `forms` to decide whether form steps were submitted
    pub fn with_form_builder(mut self, forms: Arc<dyn FormBuilder>) -> Self {
        self.forms = forms;
        self
    }

    /// Identity recorded with stored state
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn registry(&self) -> &PipelineRegistry {
        &self.registry
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Who holds the store lock while this orchestrator drives a run.
    /// Unique per instance, so two processes of the same owner still
    /// exclude each other.
    pub fn lock_holder(&self) -> String {
        format!("{}#{}", self.owner, self.instance_id)
    }

    /// Add an event handler
    pub async fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(OrchestratorEvent) + Send + Sync + 'static,
    {
        self.event_handlers.lock().await.push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    async fn emit_event(&self, event: OrchestratorEvent) {
        let handlers = self.event_handlers.lock().await;
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }

    async fn pipeline_lock(&self, pipeline_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.run_locks.lock().await;
        locks
            .entry(pipeline_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drive `pipeline_id` forward as far as this invocation can go
    pub async fn run(&self, pipeline_id: &str) -> Result<Response, OrchestratorError> {
        let definition = self.registry.get(pipeline_id)?;

        let lock = self.pipeline_lock(pipeline_id).await;
        let _guard = lock.lock().await;

        let holder = self.lock_holder();
        self.store.acquire_lock(pipeline_id, &holder).await?;
        let result = self.drive(definition).await;
        let released = self.store.release_lock(pipeline_id, &holder).await;

        match (result, released) {
            (Err(err), Err(release_err)) => {
                warn!("Failed to release lock on {}: {}", pipeline_id, release_err);
                Err(err)
            }
            (Err(err), Ok(())) => Err(err),
            (Ok(_), Err(release_err)) => Err(release_err.into()),
            (Ok(response), Ok(())) => Ok(response),
        }
    }

    /// Clear everything stored for `pipeline_id`. Succeeds when nothing is
    /// stored, and does not require the pipeline to still be configured.
    pub async fn reset(&self, pipeline_id: &str) -> Result<(), OrchestratorError> {
        let lock = self.pipeline_lock(pipeline_id).await;
        let _guard = lock.lock().await;

        let holder = self.lock_holder();
        self.store.acquire_lock(pipeline_id, &holder).await?;
        let result = self.store.reset(pipeline_id).await;
        self.store.release_lock(pipeline_id, &holder).await?;
        result?;

        info!("Reset pipeline {}", pipeline_id);
        self.emit_event(OrchestratorEvent::Reset {
            pipeline_id: pipeline_id.to_string(),
        })
        .await;
        Ok(())
    }

    /// Inspect what is stored for `pipeline_id`
    pub async fn status(&self, pipeline_id: &str) -> Result<RunStatus, OrchestratorError> {
        let state = self.store.get_state(pipeline_id).await?;
        let progress = self.store.get_batch_progress(pipeline_id).await?;
        let metadata = self.store.state_metadata(pipeline_id).await?;

        Ok(RunStatus {
            pipeline_id: pipeline_id.to_string(),
            state,
            batch: (!progress.needs_initialisation()).then_some(progress),
            metadata,
        })
    }

    /// The state machine proper. Runs with both locks held.
    async fn drive(&self, definition: &PipelineDefinition) -> Result<Response, OrchestratorError> {
        let pipeline_id = definition.id.as_str();
        let mut catalog = definition.catalog.clone();
        let mut executed: Vec<String> = Vec::new();

        match self.store.get_state(pipeline_id).await? {
            Some(state) => {
                info!(
                    "Resuming pipeline {} at position {}",
                    definition.label,
                    state.position()
                );
                self.emit_event(OrchestratorEvent::RunResumed {
                    pipeline_id: pipeline_id.to_string(),
                    pipeline_label: definition.label.clone(),
                    position: state.position(),
                })
                .await;

                match state.position() {
                    Position::Final => return self.complete(definition, executed).await,
                    Position::At(position) => {
                        if let Err(source) = catalog.seek(position) {
                            let err = OrchestratorError::OutOfRange {
                                pipeline: definition.label.clone(),
                                source,
                            };
                            return Err(self.abort(definition, None, err).await);
                        }
                    }
                }
            }
            None => {
                info!("Starting pipeline {}", definition.label);
                self.emit_event(OrchestratorEvent::RunStarted {
                    pipeline_id: pipeline_id.to_string(),
                    pipeline_label: definition.label.clone(),
                })
                .await;
            }
        }

        let mut data = self.store.get_run_data(pipeline_id).await?;

        loop {
            if !catalog.valid() {
                return self.complete(definition, executed).await;
            }

            let position = catalog.key();
            let entry = match catalog.entry(position) {
                Ok(entry) => entry.clone(),
                Err(source) => {
                    let err = OrchestratorError::OutOfRange {
                        pipeline: definition.label.clone(),
                        source,
                    };
                    return Err(self.abort(definition, None, err).await);
                }
            };

            let step = match self.factory.create(&entry) {
                Ok(step) => step,
                Err(FactoryError::UnknownStep(plugin_id)) => {
                    let err = OrchestratorError::UnknownStep {
                        pipeline: definition.label.clone(),
                        plugin_id,
                    };
                    return Err(self.abort(definition, Some(&entry.plugin_id), err).await);
                }
                Err(err @ FactoryError::InvalidParams { .. }) => {
                    let err = OrchestratorError::Configuration(err.to_string());
                    return Err(self.abort(definition, Some(&entry.plugin_id), err).await);
                }
            };
            let step_label = entry.label.clone().unwrap_or_else(|| step.label());

            let mut ctx = StepContext {
                pipeline_id: pipeline_id.to_string(),
                position,
                data: std::mem::take(&mut data),
                submission: None,
                batch: None,
                params: entry.params.clone(),
            };

            match (step.as_form(), step.as_batch()) {
                (Some(_), Some(_)) => {
                    let err = OrchestratorError::Configuration(format!(
                        "step '{}' of {} needs both a form and batching; split it into two steps",
                        step_label, definition.label
                    ));
                    return Err(self.abort(definition, Some(&step_label), err).await);
                }
                (Some(form), None) => match self.forms.build(&form.form(), &ctx.data).await {
                    FormOutcome::Pending(prompt) => {
                        debug!("Step {} is waiting for input", step_label);
                        self.persist(pipeline_id, position, &ctx.data).await?;
                        self.emit_event(OrchestratorEvent::AwaitingInput {
                            pipeline_label: definition.label.clone(),
                            step_label: step_label.clone(),
                            missing: prompt.missing.clone(),
                        })
                        .await;
                        return Ok(Response::Prompt(PromptResponse {
                            pipeline_id: pipeline_id.to_string(),
                            pipeline_label: definition.label.clone(),
                            step_label,
                            position,
                            prompt,
                            executed,
                        }));
                    }
                    FormOutcome::Submitted(values) => ctx.submission = Some(values),
                },
                (None, Some(_)) => {
                    let mut progress = self.store.get_batch_progress(pipeline_id).await?;
                    // A message only lives for the iteration that set it
                    progress.set_status_message("");
                    ctx.batch = Some(progress);
                }
                (None, None) => {}
            }

            info!("Executing step {} ({}/{})", step_label, position + 1, catalog.len());
            self.emit_event(OrchestratorEvent::StepStarted {
                pipeline_label: definition.label.clone(),
                step_label: step_label.clone(),
                position,
            })
            .await;

            match step.execute(&mut ctx).await {
                Ok(StepOutcome::Done) => {}
                Ok(StepOutcome::Rejected(report)) => {
                    return Err(self.reject(definition, &step_label, report).await);
                }
                Err(source) => {
                    let err = OrchestratorError::StepExecution {
                        pipeline: definition.label.clone(),
                        step: step_label.clone(),
                        source,
                    };
                    return Err(self.abort(definition, Some(&step_label), err).await);
                }
            }
            data = ctx.data;

            if let Some(progress) = ctx.batch {
                if !progress.completed() {
                    let status = self
                        .suspend_batch(
                            definition,
                            step.as_ref(),
                            &step_label,
                            position,
                            progress,
                            &data,
                            executed,
                        )
                        .await?;
                    return Ok(Response::InProgress(status));
                }
                self.store.reset_batch_progress(pipeline_id).await?;
            }

            info!("Step {} completed", step_label);
            self.emit_event(OrchestratorEvent::StepCompleted {
                pipeline_label: definition.label.clone(),
                step_label: step_label.clone(),
                position,
            })
            .await;
            executed.push(step_label);

            catalog.next();
            if !catalog.valid() {
                return self.complete(definition, executed).await;
            }
            self.persist(pipeline_id, catalog.key(), &data).await?;
        }
    }

    /// Store the run at `position` together with its run data
    async fn persist(
        &self,
        pipeline_id: &str,
        position: usize,
        data: &Map<String, Value>,
    ) -> Result<(), OrchestratorError> {
        let state = PipelineState::new(pipeline_id, Position::At(position));
        self.store.set_state(&state, &self.owner).await?;
        self.store.set_run_data(pipeline_id, data).await?;
        Ok(())
    }

    /// Park a batch step between iterations
    #[allow(clippy::too_many_arguments)]
    async fn suspend_batch(
        &self,
        definition: &PipelineDefinition,
        step: &dyn Step,
        step_label: &str,
        position: usize,
        mut progress: BatchProgress,
        data: &Map<String, Value>,
        executed: Vec<String>,
    ) -> Result<ProgressStatus, OrchestratorError> {
        if progress.status_message().is_empty() {
            if let Some(batch) = step.as_batch() {
                let message = batch.progress_message(&progress);
                progress.set_status_message(message);
            }
        }

        self.persist(&definition.id, position, data).await?;
        self.store
            .set_batch_progress(&definition.id, &progress)
            .await?;

        debug!(
            "Step {} finished iteration {}/{}",
            step_label,
            progress.batch_iteration(),
            progress.total_batch_iterations()
        );
        self.emit_event(OrchestratorEvent::BatchIteration {
            pipeline_label: definition.label.clone(),
            step_label: step_label.to_string(),
            iteration: progress.batch_iteration(),
            total_iterations: progress.total_batch_iterations(),
        })
        .await;

        Ok(ProgressStatus {
            pipeline_id: definition.id.clone(),
            pipeline_label: definition.label.clone(),
            step_label: step_label.to_string(),
            position,
            iteration: progress.batch_iteration(),
            total_iterations: progress.total_batch_iterations(),
            message: progress.status_message().to_string(),
            executed,
        })
    }

    /// Past the last step: clear the run and report success
    async fn complete(
        &self,
        definition: &PipelineDefinition,
        executed: Vec<String>,
    ) -> Result<Response, OrchestratorError> {
        self.store.reset(&definition.id).await?;

        info!("Pipeline {} completed", definition.label);
        self.emit_event(OrchestratorEvent::PipelineSucceeded {
            pipeline_label: definition.label.clone(),
        })
        .await;

        Ok(Response::Success(RunSummary {
            pipeline_id: definition.id.clone(),
            pipeline_label: definition.label.clone(),
            message: format!("{} completed successfully", definition.label),
            executed,
        }))
    }

    /// A step rejected its input: clear the run and report the problems
    async fn reject(
        &self,
        definition: &PipelineDefinition,
        step_label: &str,
        report: ValidationReport,
    ) -> OrchestratorError {
        warn!(
            "Step {} of {} rejected the run: {}",
            step_label, definition.label, report
        );
        self.clear_after_failure(definition).await;
        self.emit_event(OrchestratorEvent::StepRejected {
            pipeline_label: definition.label.clone(),
            step_label: step_label.to_string(),
            problems: report.problems.clone(),
        })
        .await;

        OrchestratorError::StepValidation {
            pipeline: definition.label.clone(),
            step: step_label.to_string(),
            report,
        }
    }

    /// Fatal failure: clear the run so the next invocation starts over
    async fn abort(
        &self,
        definition: &PipelineDefinition,
        step_label: Option<&str>,
        err: OrchestratorError,
    ) -> OrchestratorError {
        error!("Pipeline {} failed: {}", definition.label, err);
        self.clear_after_failure(definition).await;
        self.emit_event(OrchestratorEvent::StepFailed {
            pipeline_label: definition.label.clone(),
            step_label: step_label.unwrap_or_default().to_string(),
            error: err.to_string(),
        })
        .await;
        err
    }

    async fn clear_after_failure(&self, definition: &PipelineDefinition) {
        if let Err(reset_err) = self.store.reset(&definition.id).await {
            error!(
                "Failed to clear state of {} after a failure: {}",
                definition.label, reset_err
            );
        }
    }
}
