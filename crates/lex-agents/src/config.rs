//! Configuration types for the agent pipeline.
//!
//! The heuristics baked into the pipeline (the classification cardinality
//! threshold, the ensemble size and seed, the cleaning order) live here as
//! named defaults so callers can override them without touching the agents.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Label cardinality below which the prediction agent picks classification.
pub const DEFAULT_CLASSIFICATION_THRESHOLD: usize = 20;

/// Number of trees in the forest.
pub const DEFAULT_N_ESTIMATORS: usize = 100;

/// Seed shared by every tree (offset by tree index).
pub const DEFAULT_RANDOM_SEED: u64 = 42;

/// Histogram bin count for distribution panels.
pub const DEFAULT_HISTOGRAM_BINS: usize = 30;

/// Output file used when no visualization path is supplied.
pub const DEFAULT_VISUALIZATION_PATH: &str = "visualization.png";

/// Order in which the collection agent sanitizes a freshly loaded dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CleaningOrder {
    /// Drop exact duplicates, then rows with incomplete cells.
    #[default]
    DuplicatesFirst,
    /// Drop rows with incomplete cells, then exact duplicates.
    IncompleteFirst,
}

/// Configuration for the agent pipeline.
///
/// Use [`PipelineConfig::builder()`] for a validated configuration, or
/// [`PipelineConfig::from_json_file`] to read one from disk. Missing JSON
/// fields take their defaults.
///
/// # Example
///
/// ```rust,ignore
/// use lex_agents::config::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .classification_threshold(10)
///     .n_estimators(50)
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Labels with fewer distinct values than this are treated as classes.
    /// Default: 20
    pub classification_threshold: usize,

    /// Number of trees in the ensemble.
    /// Default: 100
    pub n_estimators: usize,

    /// Random seed for bootstrap sampling and feature selection.
    /// Default: 42
    pub random_seed: u64,

    /// Maximum tree depth. `None` grows trees until leaves are pure.
    /// Default: None
    pub max_depth: Option<usize>,

    /// Minimum samples a node needs before it may split.
    /// Default: 2
    pub min_samples_split: usize,

    /// Minimum samples on each side of a split.
    /// Default: 1
    pub min_samples_leaf: usize,

    /// Sanitation order used by the collection agent.
    /// Default: DuplicatesFirst
    pub cleaning_order: CleaningOrder,

    /// Number of histogram bins in distribution panels.
    /// Default: 30
    pub histogram_bins: usize,

    /// Where the visualization goes when the caller gives no path.
    /// Default: "visualization.png"
    pub default_visualization_path: PathBuf,

    /// Field separator of the delimited source. Written as a one-character
    /// string in JSON.
    /// Default: b','
    #[serde(with = "separator_char")]
    pub separator: u8,

    /// Rows scanned when inferring column types. `None` scans the whole file.
    /// Default: None
    pub infer_schema_length: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            classification_threshold: DEFAULT_CLASSIFICATION_THRESHOLD,
            n_estimators: DEFAULT_N_ESTIMATORS,
            random_seed: DEFAULT_RANDOM_SEED,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            cleaning_order: CleaningOrder::default(),
            histogram_bins: DEFAULT_HISTOGRAM_BINS,
            default_visualization_path: PathBuf::from(DEFAULT_VISUALIZATION_PATH),
            separator: b',',
            infer_schema_length: None,
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Read a configuration from a JSON file and validate it.
    pub fn from_json_file(path: impl AsRef<Path>) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: PipelineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.classification_threshold == 0 {
            return Err(ConfigValidationError::InvalidThreshold(
                self.classification_threshold,
            ));
        }

        if self.n_estimators == 0 {
            return Err(ConfigValidationError::InvalidEstimatorCount(self.n_estimators));
        }

        if self.min_samples_split < 2 {
            return Err(ConfigValidationError::InvalidTreeParameter {
                field: "min_samples_split".to_string(),
                value: self.min_samples_split,
                minimum: 2,
            });
        }

        if self.min_samples_leaf == 0 {
            return Err(ConfigValidationError::InvalidTreeParameter {
                field: "min_samples_leaf".to_string(),
                value: self.min_samples_leaf,
                minimum: 1,
            });
        }

        if self.max_depth == Some(0) {
            return Err(ConfigValidationError::InvalidTreeParameter {
                field: "max_depth".to_string(),
                value: 0,
                minimum: 1,
            });
        }

        if self.histogram_bins == 0 {
            return Err(ConfigValidationError::InvalidHistogramBins(self.histogram_bins));
        }

        Ok(())
    }
}

/// (De)serializes the separator byte as a single ASCII character.
mod separator_char {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(separator: &u8, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_char(char::from(*separator))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
        let text = String::deserialize(deserializer)?;
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii() => Ok(c as u8),
            _ => Err(D::Error::custom(format!(
                "separator must be a single ASCII character, got {:?}",
                text
            ))),
        }
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid classification threshold: {0} (must be at least 1)")]
    InvalidThreshold(usize),

    #[error("Invalid estimator count: {0} (must be at least 1)")]
    InvalidEstimatorCount(usize),

    #[error("Invalid value for '{field}': {value} (must be at least {minimum})")]
    InvalidTreeParameter {
        field: String,
        value: usize,
        minimum: usize,
    },

    #[error("Invalid histogram bins: {0} (must be at least 1)")]
    InvalidHistogramBins(usize),
}

/// Builder for [`PipelineConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    classification_threshold: Option<usize>,
    n_estimators: Option<usize>,
    random_seed: Option<u64>,
    max_depth: Option<usize>,
    min_samples_split: Option<usize>,
    min_samples_leaf: Option<usize>,
    cleaning_order: Option<CleaningOrder>,
    histogram_bins: Option<usize>,
    default_visualization_path: Option<PathBuf>,
    separator: Option<u8>,
    infer_schema_length: Option<Option<usize>>,
}

impl PipelineConfigBuilder {
    /// Set the label cardinality below which classification is selected.
    pub fn classification_threshold(mut self, threshold: usize) -> Self {
        self.classification_threshold = Some(threshold);
        self
    }

    /// Set the number of trees in the ensemble.
    pub fn n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = Some(n);
        self
    }

    /// Set the random seed.
    pub fn random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    /// Limit tree depth.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set the minimum samples required to split a node.
    pub fn min_samples_split(mut self, n: usize) -> Self {
        self.min_samples_split = Some(n);
        self
    }

    /// Set the minimum samples required in each leaf.
    pub fn min_samples_leaf(mut self, n: usize) -> Self {
        self.min_samples_leaf = Some(n);
        self
    }

    /// Set the sanitation order of the collection agent.
    pub fn cleaning_order(mut self, order: CleaningOrder) -> Self {
        self.cleaning_order = Some(order);
        self
    }

    /// Set the histogram bin count.
    pub fn histogram_bins(mut self, bins: usize) -> Self {
        self.histogram_bins = Some(bins);
        self
    }

    /// Set the fallback visualization output path.
    pub fn default_visualization_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.default_visualization_path = Some(path.into());
        self
    }

    /// Set the field separator of the source file.
    pub fn separator(mut self, separator: u8) -> Self {
        self.separator = Some(separator);
        self
    }

    /// Set how many rows are scanned for type inference (`None` = all).
    pub fn infer_schema_length(mut self, rows: Option<usize>) -> Self {
        self.infer_schema_length = Some(rows);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `PipelineConfig` or an error if validation fails.
    pub fn build(self) -> Result<PipelineConfig, ConfigValidationError> {
        let defaults = PipelineConfig::default();
        let config = PipelineConfig {
            classification_threshold: self
                .classification_threshold
                .unwrap_or(defaults.classification_threshold),
            n_estimators: self.n_estimators.unwrap_or(defaults.n_estimators),
            random_seed: self.random_seed.unwrap_or(defaults.random_seed),
            max_depth: self.max_depth.or(defaults.max_depth),
            min_samples_split: self.min_samples_split.unwrap_or(defaults.min_samples_split),
            min_samples_leaf: self.min_samples_leaf.unwrap_or(defaults.min_samples_leaf),
            cleaning_order: self.cleaning_order.unwrap_or(defaults.cleaning_order),
            histogram_bins: self.histogram_bins.unwrap_or(defaults.histogram_bins),
            default_visualization_path: self
                .default_visualization_path
                .unwrap_or(defaults.default_visualization_path),
            separator: self.separator.unwrap_or(defaults.separator),
            infer_schema_length: self
                .infer_schema_length
                .unwrap_or(defaults.infer_schema_length),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.classification_threshold, 20);
        assert_eq!(config.n_estimators, 100);
        assert_eq!(config.random_seed, 42);
        assert_eq!(config.cleaning_order, CleaningOrder::DuplicatesFirst);
        assert_eq!(
            config.default_visualization_path,
            PathBuf::from("visualization.png")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_custom_values() {
        let config = PipelineConfig::builder()
            .classification_threshold(5)
            .n_estimators(10)
            .random_seed(7)
            .max_depth(4)
            .cleaning_order(CleaningOrder::IncompleteFirst)
            .separator(b';')
            .build()
            .unwrap();

        assert_eq!(config.classification_threshold, 5);
        assert_eq!(config.n_estimators, 10);
        assert_eq!(config.random_seed, 7);
        assert_eq!(config.max_depth, Some(4));
        assert_eq!(config.cleaning_order, CleaningOrder::IncompleteFirst);
        assert_eq!(config.separator, b';');
    }

    #[test]
    fn test_validation_rejects_zero_estimators() {
        let result = PipelineConfig::builder().n_estimators(0).build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::InvalidEstimatorCount(0)
        ));
    }

    #[test]
    fn test_validation_rejects_small_split() {
        let result = PipelineConfig::builder().min_samples_split(1).build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::InvalidTreeParameter { .. }
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "classification_threshold": 8, "cleaning_order": "IncompleteFirst" }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.classification_threshold, 8);
        assert_eq!(config.cleaning_order, CleaningOrder::IncompleteFirst);
        assert_eq!(config.n_estimators, DEFAULT_N_ESTIMATORS);
        assert_eq!(config.histogram_bins, DEFAULT_HISTOGRAM_BINS);
    }

    #[test]
    fn test_separator_is_a_character_in_json() {
        let json = serde_json::to_value(PipelineConfig::default()).unwrap();
        assert_eq!(json["separator"], serde_json::json!(","));
        assert_eq!(json["infer_schema_length"], serde_json::Value::Null);

        let config: PipelineConfig = serde_json::from_str(r#"{ "separator": ";" }"#).unwrap();
        assert_eq!(config.separator, b';');

        let tab: PipelineConfig = serde_json::from_str(r#"{ "separator": "\t" }"#).unwrap();
        assert_eq!(tab.separator, b'\t');

        assert!(serde_json::from_str::<PipelineConfig>(r#"{ "separator": ";;" }"#).is_err());
        assert!(serde_json::from_str::<PipelineConfig>(r#"{ "separator": 44 }"#).is_err());
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "n_estimators": 12, "random_seed": 3 }"#).unwrap();

        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.n_estimators, 12);
        assert_eq!(config.random_seed, 3);
    }
}
