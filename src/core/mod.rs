//! Core domain models for pipeline runs
//!
//! This module defines the step catalog, the persisted run state, the step
//! contract and the configuration that wires them into named pipelines.

pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod pipeline;
pub mod state;
pub mod step;

pub use catalog::*;
pub use context::*;
pub use error::*;
pub use pipeline::*;
pub use state::*;
pub use step::*;
