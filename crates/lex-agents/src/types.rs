//! Shared data types handed between agents and returned to callers.

use chrono::{DateTime, Utc};
use polars::prelude::{DataFrame, Series};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Kind of supervised task a trained model solves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Classification,
    Regression,
}

impl TaskKind {
    /// Pick a task kind from the number of distinct label values.
    ///
    /// Fewer than `threshold` distinct values selects classification. This is
    /// a cardinality heuristic: a numeric target with few levels is treated
    /// as classes even when it is really continuous.
    pub fn from_cardinality(distinct: usize, threshold: usize) -> Self {
        if distinct < threshold {
            TaskKind::Classification
        } else {
            TaskKind::Regression
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Classification => "classification",
            TaskKind::Regression => "regression",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the feature agent: the predictor matrix and, when a label
/// column was requested and present, the row-aligned label series.
#[derive(Debug, Clone)]
pub struct FeatureResult {
    pub features: DataFrame,
    pub label: Option<Series>,
}

impl FeatureResult {
    /// `(rows, columns)` of the feature matrix.
    pub fn shape(&self) -> (usize, usize) {
        self.features.shape()
    }

    pub fn has_label(&self) -> bool {
        self.label.is_some()
    }
}

/// Free-form diagnostics an agent keeps about its last invocation.
///
/// Written only by the owning agent; everyone else gets `&StageState`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageState {
    values: BTreeMap<String, Value>,
    notes: Vec<String>,
}

impl StageState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic value, replacing any previous value for `key`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Convenience accessor for counters.
    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.values
            .get(key)
            .and_then(Value::as_u64)
            .map(|v| v as usize)
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    pub fn push_note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    /// Progress notes in the order they were emitted.
    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.notes.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.notes.is_empty()
    }
}

/// Parameters of one pipeline run.
///
/// # Example
///
/// ```rust,ignore
/// let request = PipelineRequest::new("data/sample.csv")
///     .label_column("target")
///     .visualize(false);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRequest {
    pub source_path: PathBuf,
    pub label_column: Option<String>,
    pub train: bool,
    pub visualize: bool,
    pub viz_output: Option<PathBuf>,
}

impl PipelineRequest {
    /// A request that trains (when a label exists) and visualizes.
    pub fn new(source_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            label_column: None,
            train: true,
            visualize: true,
            viz_output: None,
        }
    }

    pub fn label_column(mut self, column: impl Into<String>) -> Self {
        self.label_column = Some(column.into());
        self
    }

    pub fn train(mut self, train: bool) -> Self {
        self.train = train;
        self
    }

    pub fn visualize(mut self, visualize: bool) -> Self {
        self.visualize = visualize;
        self
    }

    pub fn viz_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.viz_output = Some(path.into());
        self
    }
}

/// Summary of a completed pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// `(rows, columns)` of the cleaned dataset.
    pub data_shape: (usize, usize),
    /// `(rows, columns)` of the feature matrix.
    pub feature_shape: (usize, usize),
    pub has_predictions: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction_count: Option<usize>,
    /// Task kind of the model held after the run, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_kind: Option<TaskKind>,
    /// Set only when an image was actually written.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visualization_path: Option<PathBuf>,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_kind_boundary() {
        assert_eq!(TaskKind::from_cardinality(19, 20), TaskKind::Classification);
        assert_eq!(TaskKind::from_cardinality(20, 20), TaskKind::Regression);
        assert_eq!(TaskKind::from_cardinality(21, 20), TaskKind::Regression);
        assert_eq!(TaskKind::from_cardinality(1, 20), TaskKind::Classification);
    }

    #[test]
    fn test_stage_state_roundtrip() {
        let mut state = StageState::new();
        state.set("rows", 20usize);
        state.set("encoder", "label_encoder");
        state.push_note("Loaded 20 rows");

        assert_eq!(state.get_usize("rows"), Some(20));
        assert_eq!(state.get("encoder"), Some(&Value::from("label_encoder")));
        assert_eq!(state.notes(), ["Loaded 20 rows".to_string()]);

        state.clear();
        assert!(state.is_empty());
    }

    #[test]
    fn test_request_builder() {
        let request = PipelineRequest::new("data.csv")
            .label_column("target")
            .train(false)
            .viz_output("out.png");

        assert_eq!(request.label_column.as_deref(), Some("target"));
        assert!(!request.train);
        assert!(request.visualize);
        assert_eq!(request.viz_output, Some(PathBuf::from("out.png")));
    }

    #[test]
    fn test_summary_serialization_skips_absent_fields() {
        let summary = PipelineSummary {
            data_shape: (20, 4),
            feature_shape: (20, 4),
            has_predictions: false,
            prediction_count: None,
            task_kind: None,
            visualization_path: None,
            duration_ms: 3,
            completed_at: Utc::now(),
        };
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"data_shape\":[20,4]"));
        assert!(!json.contains("prediction_count"));
    }
}
