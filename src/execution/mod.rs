//! Pipeline orchestration

pub mod factory;
pub mod form;
pub mod orchestrator;
pub mod response;

pub use factory::{FactoryError, StepFactory, StepRegistry};
pub use form::{FormBuilder, FormOutcome, FormPrompt, SubmittedValues};
pub use orchestrator::{EventHandler, Orchestrator, OrchestratorEvent, RunStatus};
pub use response::{ProgressStatus, PromptResponse, Response, RunSummary};
