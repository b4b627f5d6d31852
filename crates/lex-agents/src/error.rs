//! Error types for the agent pipeline.
//!
//! [`PipelineError`] covers every failure a stage can raise. Stage-level
//! failures are fatal and propagate unchanged through the orchestrator;
//! [`PipelineError::CapabilityUnavailable`] is the one variant that never
//! reaches a caller, because agents recover from it locally and log a note.
//!
//! Errors are serializable as `{code, message}` so that front-end clients
//! can render them without matching on variants.

use crate::config::ConfigValidationError;
use serde::Serialize;
use serde::ser::SerializeStruct;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Optional capabilities an agent can probe for at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Raster image output for the visualization agent.
    Plotting,
    /// Sorted-vocabulary categorical encoding for the feature agent.
    LabelEncoding,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plotting => write!(f, "plotting"),
            Self::LabelEncoding => write!(f, "label encoding"),
        }
    }
}

/// The main error type for the agent pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The source path does not resolve to anything on disk.
    #[error("Source not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    /// The source exists but cannot be parsed as delimited tabular data.
    #[error("Failed to parse '{}' as delimited data: {reason}", path.display())]
    FormatError { path: PathBuf, reason: String },

    /// Training was requested without a label series.
    #[error("Training requires a label series, but none was provided")]
    MissingLabel,

    /// A persisted model could not be restored.
    #[error("Failed to load model from '{}': {reason}", path.display())]
    LoadError { path: PathBuf, reason: String },

    /// An optional library-backed capability is not compiled in.
    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(Capability),

    /// The label series cannot be used for the selected task.
    #[error("Invalid label: {0}")]
    InvalidLabel(String),

    /// The feature matrix cannot be handed to the estimator.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Feature count does not match what the model was trained on.
    #[error("Expected {expected} feature columns, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// The visualization could not be encoded or written.
    #[error("Failed to render visualization: {0}")]
    RenderFailed(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigValidationError),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PipelineError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Get error code for frontend handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::SourceNotFound { .. } => "SOURCE_NOT_FOUND",
            Self::FormatError { .. } => "FORMAT_ERROR",
            Self::MissingLabel => "MISSING_LABEL",
            Self::LoadError { .. } => "LOAD_ERROR",
            Self::CapabilityUnavailable(_) => "CAPABILITY_UNAVAILABLE",
            Self::InvalidLabel(_) => "INVALID_LABEL",
            Self::InvalidData(_) => "INVALID_DATA",
            Self::ShapeMismatch { .. } => "SHAPE_MISMATCH",
            Self::RenderFailed(_) => "RENDER_FAILED",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check if this error describes a degraded capability rather than a failure.
    pub fn is_degraded(&self) -> bool {
        match self {
            Self::CapabilityUnavailable(_) => true,
            Self::WithContext { source, .. } => source.is_degraded(),
            _ => false,
        }
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for PipelineError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("PipelineError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| PipelineError::Polars(e).with_context(context))
    }
}
