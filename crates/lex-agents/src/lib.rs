//! Staged Agent Pipeline Library
//!
//! A small tabular machine-learning pipeline built with Rust and Polars.
//!
//! # Overview
//!
//! Four agents run in a fixed order, each behind the same [`Stage`] contract:
//!
//! - **Data Collection**: Load a CSV file, drop duplicate and incomplete rows
//! - **Feature Processing**: Split off the label, standardize numeric columns,
//!   encode categorical columns as integer codes
//! - **Prediction**: Train a random forest (classification or regression,
//!   chosen from the label cardinality) or apply a previously trained one
//! - **Visualization**: Render a multi-panel PNG of the data and predictions
//!
//! The [`Orchestrator`] owns one instance of each agent, passes outputs
//! downstream, and reports progress.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use lex_agents::{Orchestrator, PipelineConfig, PipelineRequest};
//!
//! let config = PipelineConfig::builder()
//!     .n_estimators(50)
//!     .random_seed(7)
//!     .build()?;
//!
//! let mut orchestrator = Orchestrator::builder()
//!     .config(config)
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?;
//!
//! let summary = orchestrator.run_pipeline(
//!     &PipelineRequest::new("data.csv").label_column("target"),
//! )?;
//!
//! println!("Data shape: {:?}", summary.data_shape);
//! println!("Task: {:?}", summary.task_kind);
//! ```
//!
//! # Models
//!
//! A trained model can be saved and loaded again for inference:
//!
//! ```rust,ignore
//! orchestrator.save_model("model.json")?;
//!
//! let mut fresh = Orchestrator::builder().build()?;
//! fresh.load_model("model.json")?;
//! fresh.run_pipeline(&PipelineRequest::new("new_rows.csv").train(false))?;
//! ```
//!
//! # Optional capabilities
//!
//! - `plotting` (default): PNG rendering through the `image` crate. Without
//!   it the visualization agent logs a warning and writes nothing.
//! - `label-encoder` (default): sorted-vocabulary category encoding. Without
//!   it categories are coded in order of first appearance.

pub mod agents;
pub mod config;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod types;
pub mod utils;

// Re-exports for convenient access
#[cfg(feature = "label-encoder")]
pub use agents::LabelEncoder;
pub use agents::{
    CategoricalEncoder, CategoryCodes, DataCollector, FeatureProcessor, FeatureRequest, PanelKind,
    PlotBackend, PredictionAgent, PredictionRequest, RenderReport, Stage, VisualizationAgent,
    VisualizationRequest,
};
pub use config::{CleaningOrder, ConfigValidationError, PipelineConfig, PipelineConfigBuilder};
pub use error::{Capability, PipelineError, Result as PipelineResult, ResultExt};
pub use model::{ForestSettings, ModelHandle, RandomForest};
pub use pipeline::{
    Artifacts, ClosureProgressReporter, Orchestrator, OrchestratorBuilder, PipelineStage,
    ProgressReporter, ProgressUpdate,
};
pub use types::{FeatureResult, PipelineRequest, PipelineSummary, StageState, TaskKind};
