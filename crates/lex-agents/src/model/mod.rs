//! Trained model state owned by the prediction agent.
//!
//! A [`ModelHandle`] bundles a fitted [`RandomForest`] with everything needed
//! to apply it again: the task kind, the feature column names it was trained
//! on, and the class values its class indices decode to. Handles persist as
//! JSON; loading validates the structure before anything is handed back.

pub mod forest;
pub mod tree;

pub use forest::{ForestSettings, RandomForest};

use crate::error::{PipelineError, Result};
use crate::types::TaskKind;
use crate::utils::{LabelValues, to_feature_matrix};
use chrono::{DateTime, Utc};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Version tag written into every persisted model.
pub const MODEL_FORMAT_VERSION: u32 = 1;

/// A trained estimator plus the metadata needed to apply it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelHandle {
    pub format_version: u32,
    pub task_kind: TaskKind,
    /// Feature columns in training order.
    pub feature_names: Vec<String>,
    /// Label value of each class index (classification only). For text
    /// labels these are positions in `label_vocabulary`.
    #[serde(default)]
    pub classes: Vec<f64>,
    /// Sorted distinct label strings when the label was not numeric.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_vocabulary: Option<Vec<String>>,
    pub forest: RandomForest,
    pub trained_at: DateTime<Utc>,
}

impl ModelHandle {
    /// Fit a forest of the given kind on `features` and `labels`.
    ///
    /// Fails with [`PipelineError::InvalidLabel`] when a label is missing, or
    /// when regression is requested on a non-numeric label.
    pub fn fit(
        features: &DataFrame,
        labels: &LabelValues,
        task_kind: TaskKind,
        settings: &ForestSettings,
    ) -> Result<Self> {
        if task_kind == TaskKind::Regression && !labels.is_numeric() {
            return Err(PipelineError::InvalidLabel(
                "regression requires a numeric label".to_string(),
            ));
        }

        let values = labels
            .values()
            .iter()
            .map(|v| v.filter(|x| !x.is_nan()))
            .collect::<Option<Vec<f64>>>()
            .ok_or_else(|| PipelineError::InvalidLabel("label has missing values".to_string()))?;

        let x = to_feature_matrix(features)?;

        let (classes, y) = match task_kind {
            TaskKind::Classification => {
                let mut classes = values.clone();
                classes.sort_by(f64::total_cmp);
                classes.dedup();
                let y = values
                    .iter()
                    .map(|v| {
                        classes
                            .binary_search_by(|c| c.total_cmp(v))
                            .map(|idx| idx as f64)
                            .unwrap_or(0.0)
                    })
                    .collect();
                (classes, y)
            }
            TaskKind::Regression => (Vec::new(), values),
        };

        let forest = RandomForest::fit(task_kind, &x, &y, classes.len(), settings)?;

        Ok(Self {
            format_version: MODEL_FORMAT_VERSION,
            task_kind,
            feature_names: features
                .get_column_names()
                .into_iter()
                .map(|name| name.to_string())
                .collect(),
            classes,
            label_vocabulary: labels.vocabulary().map(<[String]>::to_vec),
            forest,
            trained_at: Utc::now(),
        })
    }

    /// Predict one value per row of `features`.
    ///
    /// Classification outputs are label values (or vocabulary positions for
    /// text labels), never raw class indices.
    pub fn predict(&self, features: &DataFrame) -> Result<Vec<f64>> {
        if features.width() != self.feature_names.len() {
            return Err(PipelineError::ShapeMismatch {
                expected: self.feature_names.len(),
                actual: features.width(),
            });
        }

        let x = to_feature_matrix(features)?;
        let raw = self.forest.predict(&x)?;

        Ok(match self.task_kind {
            TaskKind::Regression => raw,
            TaskKind::Classification => raw
                .into_iter()
                .map(|idx| self.classes.get(idx as usize).copied().unwrap_or(idx))
                .collect(),
        })
    }

    /// Write the handle as JSON, replacing any existing file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Read a handle written by [`ModelHandle::save`].
    ///
    /// Every failure, including a structurally inconsistent model, is
    /// reported as [`PipelineError::LoadError`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let load_error = |reason: String| PipelineError::LoadError {
            path: path.to_path_buf(),
            reason,
        };

        let file = File::open(path).map_err(|e| load_error(e.to_string()))?;
        let handle: ModelHandle = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| load_error(e.to_string()))?;

        if handle.format_version != MODEL_FORMAT_VERSION {
            return Err(load_error(format!(
                "unsupported model format version {}",
                handle.format_version
            )));
        }
        if handle.task_kind != handle.forest.task()
            || handle.feature_names.len() != handle.forest.n_features()
            || (handle.task_kind == TaskKind::Classification
                && handle.classes.len() != handle.forest.n_classes())
            || !handle.forest.is_well_formed()
        {
            return Err(load_error("model structure is inconsistent".to_string()));
        }

        Ok(handle)
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn settings() -> ForestSettings {
        ForestSettings {
            n_estimators: 10,
            ..ForestSettings::default()
        }
    }

    fn features() -> DataFrame {
        df!(
            "x1" => [0.1f64, 0.2, 0.3, 0.4, 5.1, 5.2, 5.3, 5.4],
            "x2" => [1i64, 1, 2, 2, 8, 8, 9, 9]
        )
        .unwrap()
    }

    #[test]
    fn test_fit_decodes_class_values() {
        let labels = LabelValues::from_series(&Series::new(
            "y".into(),
            &[3i64, 3, 3, 3, 7, 7, 7, 7],
        ))
        .unwrap();
        let model = ModelHandle::fit(&features(), &labels, TaskKind::Classification, &settings()).unwrap();

        assert_eq!(model.classes, vec![3.0, 7.0]);
        assert_eq!(model.feature_names, vec!["x1".to_string(), "x2".to_string()]);
        assert_eq!(
            model.predict(&features()).unwrap(),
            vec![3.0, 3.0, 3.0, 3.0, 7.0, 7.0, 7.0, 7.0]
        );
    }

    #[test]
    fn test_regression_on_text_label_is_rejected() {
        let labels = LabelValues::from_series(&Series::new(
            "y".into(),
            &["a", "b", "c", "d", "e", "f", "g", "h"],
        ))
        .unwrap();
        let result = ModelHandle::fit(&features(), &labels, TaskKind::Regression, &settings());
        assert!(matches!(result, Err(PipelineError::InvalidLabel(_))));
    }

    #[test]
    fn test_missing_label_value_is_rejected() {
        let labels = LabelValues::Numeric(vec![Some(1.0), None, Some(1.0), Some(0.0), Some(0.0), Some(1.0), Some(0.0), Some(1.0)]);
        let result = ModelHandle::fit(&features(), &labels, TaskKind::Classification, &settings());
        assert!(matches!(result, Err(PipelineError::InvalidLabel(_))));
    }

    #[test]
    fn test_save_load_preserves_predictions() {
        let labels = LabelValues::from_series(&Series::new(
            "y".into(),
            &[1.5f64, 2.5, 3.5, 4.5, 10.0, 11.0, 12.0, 13.0],
        ))
        .unwrap();
        let model = ModelHandle::fit(&features(), &labels, TaskKind::Regression, &settings()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        model.save(&path).unwrap();
        let restored = ModelHandle::load(&path).unwrap();

        assert_eq!(restored, model);
        assert_eq!(
            restored.predict(&features()).unwrap(),
            model.predict(&features()).unwrap()
        );
    }

    #[test]
    fn test_load_garbage_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            ModelHandle::load(&path),
            Err(PipelineError::LoadError { .. })
        ));
        assert!(matches!(
            ModelHandle::load(dir.path().join("missing.json")),
            Err(PipelineError::LoadError { .. })
        ));
    }

    #[test]
    fn test_predict_rejects_wrong_width() {
        let labels = LabelValues::Numeric(vec![Some(0.0), Some(0.0), Some(0.0), Some(0.0), Some(1.0), Some(1.0), Some(1.0), Some(1.0)]);
        let model = ModelHandle::fit(&features(), &labels, TaskKind::Classification, &settings()).unwrap();

        let narrow = features().drop("x2").unwrap();
        assert!(matches!(
            model.predict(&narrow),
            Err(PipelineError::ShapeMismatch {
                expected: 2,
                actual: 1
            })
        ));
    }
}
