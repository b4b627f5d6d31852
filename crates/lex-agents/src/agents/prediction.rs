//! Prediction agent: train or apply a random forest.
//!
//! The agent starts untrained. Training selects classification or
//! regression from the label cardinality (see [`TaskKind::from_cardinality`])
//! and replaces the held model only once fitting succeeds. Inference without
//! a model is not an error: it returns one zero per row.

use super::Stage;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::model::{ForestSettings, ModelHandle};
use crate::types::{StageState, TaskKind};
use crate::utils::LabelValues;
use polars::prelude::*;
use std::path::Path;
use tracing::warn;

/// Input of [`PredictionAgent`].
#[derive(Debug, Clone, Copy)]
pub struct PredictionRequest<'a> {
    pub features: &'a DataFrame,
    pub train: bool,
    pub label: Option<&'a Series>,
}

impl<'a> PredictionRequest<'a> {
    /// Train on `features` and `label`, then predict the training rows.
    pub fn train(features: &'a DataFrame, label: Option<&'a Series>) -> Self {
        Self {
            features,
            train: true,
            label,
        }
    }

    /// Apply the held model to `features`.
    pub fn infer(features: &'a DataFrame) -> Self {
        Self {
            features,
            train: false,
            label: None,
        }
    }
}

/// Owns the trained model, if any.
#[derive(Debug, Clone)]
pub struct PredictionAgent {
    classification_threshold: usize,
    settings: ForestSettings,
    model: Option<ModelHandle>,
    state: StageState,
}

impl Default for PredictionAgent {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl PredictionAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            classification_threshold: config.classification_threshold,
            settings: ForestSettings::from_config(config),
            model: None,
            state: StageState::new(),
        }
    }

    /// Train (when `train`) or infer, returning one prediction per row.
    pub fn predict(
        &mut self,
        features: &DataFrame,
        train: bool,
        label: Option<&Series>,
    ) -> Result<Vec<f64>> {
        self.run(PredictionRequest {
            features,
            train,
            label,
        })
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    pub fn model(&self) -> Option<&ModelHandle> {
        self.model.as_ref()
    }

    pub fn task_kind(&self) -> Option<TaskKind> {
        self.model.as_ref().map(|m| m.task_kind)
    }

    /// Persist the held model. Returns `false`, after logging a note, when
    /// there is nothing to save.
    pub fn save_model(&mut self, path: impl AsRef<Path>) -> Result<bool> {
        let path = path.as_ref();
        let Some(model) = &self.model else {
            self.note("No trained model to save");
            return Ok(false);
        };

        model.save(path)?;
        self.note(format!("Saved model to {}", path.display()));
        Ok(true)
    }

    /// Replace the held model with one read from `path`.
    ///
    /// On failure the current model, trained or not, is kept.
    pub fn load_model(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let model = ModelHandle::load(path)?;
        self.note(format!(
            "Loaded {} model with {} features from {}",
            model.task_kind,
            model.n_features(),
            path.display()
        ));
        self.model = Some(model);
        Ok(())
    }

    fn train(&mut self, features: &DataFrame, label: &Series) -> Result<Vec<f64>> {
        if label.len() != features.height() {
            return Err(PipelineError::ShapeMismatch {
                expected: features.height(),
                actual: label.len(),
            });
        }

        let distinct = label.drop_nulls().n_unique()?;
        let task_kind = TaskKind::from_cardinality(distinct, self.classification_threshold);
        self.note(format!(
            "Label '{}' has {} distinct values; selected {}",
            label.name(),
            distinct,
            task_kind
        ));

        let labels = LabelValues::from_series(label)?;
        let model = ModelHandle::fit(features, &labels, task_kind, &self.settings)?;
        let predictions = model.predict(features)?;

        self.state.set("task_kind", task_kind.as_str());
        self.state.set("distinct_labels", distinct);
        self.state.set("n_estimators", self.settings.n_estimators);
        self.note(format!(
            "Trained {} forest with {} trees on {} rows",
            task_kind,
            model.forest.n_trees(),
            features.height()
        ));

        self.model = Some(model);
        Ok(predictions)
    }
}

impl Stage for PredictionAgent {
    type Input<'a> = PredictionRequest<'a>;
    type Output = Vec<f64>;

    fn name(&self) -> &'static str {
        "PredictionAgent"
    }

    fn run(&mut self, request: PredictionRequest<'_>) -> Result<Vec<f64>> {
        self.state.clear();
        let rows = request.features.height();
        self.state.set("rows", rows);
        self.state.set("mode", if request.train { "train" } else { "infer" });

        let predictions = if request.train {
            let label = request.label.ok_or(PipelineError::MissingLabel)?;
            self.train(request.features, label)?
        } else {
            match &self.model {
                Some(model) => {
                    let task_kind = model.task_kind;
                    let predictions = model.predict(request.features)?;
                    self.note(format!("Predicted {} rows with {} model", rows, task_kind));
                    predictions
                }
                None => {
                    warn!("Prediction requested without a trained model; returning zeros");
                    self.note("No trained model; returning zero predictions");
                    vec![0.0; rows]
                }
            }
        };

        self.state.set("prediction_count", predictions.len());
        Ok(predictions)
    }

    fn state(&self) -> &StageState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut StageState {
        &mut self.state
    }
}
