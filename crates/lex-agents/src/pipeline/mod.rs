//! Pipeline module.
//!
//! This module provides the orchestrator that drives the agents and the
//! progress types it reports through.

mod orchestrator;
pub mod progress;

pub use orchestrator::{Artifacts, Orchestrator, OrchestratorBuilder};
pub use progress::{ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate};
