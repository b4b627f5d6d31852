//! Feature agent: split off the label, normalize numbers, encode categories.
//!
//! Numeric columns are z-scored with the sample standard deviation. A column
//! whose standard deviation is zero, or cannot be computed because fewer
//! than two values exist, is passed through unchanged. Every other column is
//! treated as categorical and replaced by dense `u32` codes.

mod encoder;

pub use encoder::{CategoricalEncoder, CategoryCodes, EncodedColumn};
#[cfg(feature = "label-encoder")]
pub use encoder::LabelEncoder;

use super::Stage;
use crate::error::{Result, ResultExt};
use crate::types::{FeatureResult, StageState};
use crate::utils::{is_numeric_dtype, mean_and_std, numeric_values};
use polars::prelude::*;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

/// Input of [`FeatureProcessor`].
#[derive(Debug, Clone, Copy)]
pub struct FeatureRequest<'a> {
    pub dataset: &'a DataFrame,
    /// Column to split off as the label. A name that is not in the dataset
    /// is ignored and every column becomes a feature.
    pub label_column: Option<&'a str>,
}

impl<'a> FeatureRequest<'a> {
    pub fn new(dataset: &'a DataFrame, label_column: Option<&'a str>) -> Self {
        Self {
            dataset,
            label_column,
        }
    }
}

/// Turns a cleaned dataset into a fully numeric feature matrix.
#[derive(Debug)]
pub struct FeatureProcessor {
    encoder: Box<dyn CategoricalEncoder>,
    /// Why the preferred encoder is not in use, if it is not.
    fallback_reason: Option<String>,
    state: StageState,
}

impl Default for FeatureProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureProcessor {
    /// Create the agent with the best encoder available in this build.
    pub fn new() -> Self {
        let (encoder, fallback_reason) = match encoder::probe_label_encoder() {
            Ok(encoder) => (encoder, None),
            Err(e) => {
                warn!("{}; falling back to category codes", e);
                (
                    Box::new(CategoryCodes) as Box<dyn CategoricalEncoder>,
                    Some(e.to_string()),
                )
            }
        };

        Self {
            encoder,
            fallback_reason,
            state: StageState::new(),
        }
    }

    /// Create the agent with an explicit encoder.
    pub fn with_encoder(encoder: Box<dyn CategoricalEncoder>) -> Self {
        Self {
            encoder,
            fallback_reason: None,
            state: StageState::new(),
        }
    }

    pub fn encoder_name(&self) -> &'static str {
        self.encoder.name()
    }

    /// Build the feature matrix and, when present, the label series.
    pub fn process(&mut self, dataset: &DataFrame, label_column: Option<&str>) -> Result<FeatureResult> {
        self.run(FeatureRequest::new(dataset, label_column))
    }

    fn normalize(&mut self, column: &Column, stats: &mut Map<String, Value>) -> Result<Option<Series>> {
        let name = column.name().clone();
        let values = numeric_values(column.as_materialized_series())?;

        let Some((mean, std)) = mean_and_std(&values) else {
            debug!("Column '{}' has fewer than two values; left unchanged", name);
            return Ok(None);
        };
        stats.insert(name.to_string(), json!({ "mean": mean, "std": std }));

        if std == 0.0 || !std.is_finite() {
            self.note(format!("Column '{}' has zero variance; left unchanged", name));
            return Ok(None);
        }

        let scaled: Vec<Option<f64>> = values
            .into_iter()
            .map(|v| v.map(|x| (x - mean) / std))
            .collect();
        Ok(Some(Series::new(name, scaled)))
    }

    fn encode(&self, column: &Column, sizes: &mut Map<String, Value>) -> Result<Series> {
        let name = column.name().clone();
        let text = column
            .as_materialized_series()
            .cast(&DataType::String)
            .context(format!("Casting column '{}' to text", name))?;
        let encoded = self.encoder.encode(text.str()?);

        sizes.insert(name.to_string(), json!(encoded.vocabulary_size()));
        Ok(Series::new(name, encoded.codes))
    }
}

impl Stage for FeatureProcessor {
    type Input<'a> = FeatureRequest<'a>;
    type Output = FeatureResult;

    fn name(&self) -> &'static str {
        "FeatureProcessor"
    }

    fn run(&mut self, request: FeatureRequest<'_>) -> Result<FeatureResult> {
        self.state.clear();
        self.state.set("encoder", self.encoder.name());
        if let Some(reason) = self.fallback_reason.clone() {
            self.note(format!("{}; using category codes", reason));
        }

        let dataset = request.dataset;
        let present_label = request
            .label_column
            .filter(|name| dataset.get_column_index(name).is_some());

        let (mut features, label) = match (request.label_column, present_label) {
            (_, Some(name)) => {
                let label = dataset.column(name)?.as_materialized_series().clone();
                let features = dataset
                    .drop(name)
                    .context(format!("Splitting off label column '{}'", name))?;
                (features, Some(label))
            }
            (Some(name), None) => {
                self.note(format!(
                    "Label column '{}' not found; using all columns as features",
                    name
                ));
                (dataset.clone(), None)
            }
            (None, None) => (dataset.clone(), None),
        };
        self.state.set("label_column", present_label);

        let mut numeric = Vec::new();
        let mut categorical = Vec::new();
        let mut stats = Map::new();
        let mut sizes = Map::new();
        let mut replacements = Vec::with_capacity(features.width());

        for column in features.get_columns() {
            let name = column.name().to_string();
            if is_numeric_dtype(column.dtype()) {
                if let Some(scaled) = self.normalize(column, &mut stats)? {
                    replacements.push((name.clone(), scaled));
                }
                numeric.push(name);
            } else {
                replacements.push((name.clone(), self.encode(column, &mut sizes)?));
                categorical.push(name);
            }
        }

        for (name, series) in replacements {
            features.replace(&name, series)?;
        }

        self.note(format!(
            "Normalized {} numeric and encoded {} categorical columns",
            numeric.len(),
            categorical.len()
        ));
        self.state.set("numeric_columns", numeric);
        self.state.set("categorical_columns", categorical);
        self.state.set("feature_stats", Value::Object(stats));
        self.state.set("vocabulary_sizes", Value::Object(sizes));
        self.state.set("feature_shape", json!([features.height(), features.width()]));

        Ok(FeatureResult { features, label })
    }

    fn state(&self) -> &StageState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut StageState {
        &mut self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn dataset() -> DataFrame {
        df!(
            "age" => [25i64, 35, 45, 55],
            "constant" => [7.0f64, 7.0, 7.0, 7.0],
            "city" => ["paris", "rome", "paris", "oslo"],
            "target" => [0i64, 1, 0, 1]
        )
        .unwrap()
    }

    fn column_f64(df: &DataFrame, name: &str) -> Vec<f64> {
        numeric_values(df.column(name).unwrap().as_materialized_series())
            .unwrap()
            .into_iter()
            .map(|v| v.unwrap())
            .collect()
    }

    #[test]
    fn test_label_is_split_off() {
        let mut processor = FeatureProcessor::new();
        let result = processor.process(&dataset(), Some("target")).unwrap();

        assert_eq!(result.shape(), (4, 3));
        assert_eq!(result.label.as_ref().unwrap().len(), 4);
        assert!(result.features.column("target").is_err());
        assert_eq!(processor.state().get("label_column"), Some(&json!("target")));
    }

    #[test]
    fn test_missing_label_column_is_ignored() {
        let mut processor = FeatureProcessor::new();
        let result = processor.process(&dataset(), Some("nope")).unwrap();

        assert_eq!(result.shape(), (4, 4));
        assert!(!result.has_label());
        assert!(
            processor
                .state()
                .notes()
                .iter()
                .any(|note| note.contains("not found"))
        );
    }

    #[test]
    fn test_numeric_columns_are_standardized() {
        let mut processor = FeatureProcessor::new();
        let result = processor.process(&dataset(), Some("target")).unwrap();

        let age = column_f64(&result.features, "age");
        let n = age.len() as f64;
        let mean = age.iter().sum::<f64>() / n;
        let std = (age.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt();
        assert!(mean.abs() < 1e-9);
        assert!((std - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_variance_column_is_unchanged() {
        let mut processor = FeatureProcessor::new();
        let result = processor.process(&dataset(), None).unwrap();

        assert_eq!(column_f64(&result.features, "constant"), vec![7.0; 4]);
    }

    #[test]
    fn test_categorical_column_gets_one_code_per_value() {
        let mut processor = FeatureProcessor::new();
        let result = processor.process(&dataset(), None).unwrap();

        let city = result.features.column("city").unwrap();
        assert_eq!(city.dtype(), &DataType::UInt32);
        assert_eq!(city.null_count(), 0);

        let codes: Vec<u32> = city
            .as_materialized_series()
            .u32()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(codes[0], codes[2]);
        assert_ne!(codes[0], codes[1]);
        assert_ne!(codes[1], codes[3]);
        assert_eq!(
            processor.state().get("vocabulary_sizes"),
            Some(&json!({ "city": 3 }))
        );
    }

    #[test]
    fn test_with_encoder_uses_category_codes() {
        let mut processor = FeatureProcessor::with_encoder(Box::new(CategoryCodes));
        let result = processor.process(&dataset(), None).unwrap();

        let codes: Vec<u32> = result
            .features
            .column("city")
            .unwrap()
            .as_materialized_series()
            .u32()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(codes, vec![0, 1, 0, 2]);
        assert_eq!(processor.state().get("encoder"), Some(&json!("category_codes")));
    }
}
