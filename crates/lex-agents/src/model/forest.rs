//! Bagged ensemble of decision trees.

use super::tree::{DecisionTree, Node, TreeParams};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::types::TaskKind;
use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Hyperparameters of the forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestSettings {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Tree `t` is grown from a generator seeded with `random_seed + t`.
    pub random_seed: u64,
}

impl Default for ForestSettings {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl ForestSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            n_estimators: config.n_estimators,
            max_depth: config.max_depth,
            min_samples_split: config.min_samples_split,
            min_samples_leaf: config.min_samples_leaf,
            random_seed: config.random_seed,
        }
    }
}

/// A random forest for either classification or regression.
///
/// Classification targets must be class indices `0..n_classes`; predictions
/// are class indices too, chosen by averaging the leaf class fractions of all
/// trees. Regression predictions are the mean of the tree outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    task: TaskKind,
    n_features: usize,
    n_classes: usize,
    settings: ForestSettings,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fit a forest on `x` (rows are samples) and aligned targets `y`.
    pub fn fit(
        task: TaskKind,
        x: &Array2<f64>,
        y: &[f64],
        n_classes: usize,
        settings: &ForestSettings,
    ) -> Result<Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(PipelineError::ShapeMismatch {
                expected: n_samples,
                actual: y.len(),
            });
        }
        if n_samples == 0 {
            return Err(PipelineError::InvalidData(
                "cannot train on an empty feature matrix".to_string(),
            ));
        }
        if task == TaskKind::Classification && y.iter().any(|&v| v < 0.0 || v as usize >= n_classes)
        {
            return Err(PipelineError::InvalidLabel(
                "class index out of range".to_string(),
            ));
        }

        let max_features = match task {
            TaskKind::Classification => ((n_features as f64).sqrt().floor() as usize).max(1),
            TaskKind::Regression => n_features,
        };
        let params = TreeParams {
            task,
            n_classes,
            max_depth: settings.max_depth,
            min_samples_split: settings.min_samples_split,
            min_samples_leaf: settings.min_samples_leaf,
            max_features,
        };

        let trees: Vec<DecisionTree> = (0..settings.n_estimators)
            .map(|tree_idx| {
                let mut rng =
                    ChaCha8Rng::seed_from_u64(settings.random_seed.wrapping_add(tree_idx as u64));
                let sample: Vec<usize> = (0..n_samples)
                    .map(|_| rng.gen_range(0..n_samples))
                    .collect();
                DecisionTree::fit(x, y, &sample, &params, &mut rng)
            })
            .collect();

        debug!(
            "Fitted {} {} trees on {} samples x {} features",
            trees.len(),
            task,
            n_samples,
            n_features
        );

        Ok(Self {
            task,
            n_features,
            n_classes,
            settings: settings.clone(),
            trees,
        })
    }

    /// Predict one value per row of `x`.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<f64>> {
        if x.ncols() != self.n_features {
            return Err(PipelineError::ShapeMismatch {
                expected: self.n_features,
                actual: x.ncols(),
            });
        }

        let n_trees = self.trees.len().max(1) as f64;
        let predictions = x
            .rows()
            .into_iter()
            .map(|row| match self.task {
                TaskKind::Regression => {
                    self.trees
                        .iter()
                        .map(|tree| match tree.leaf_for(row) {
                            Node::Leaf { value, .. } => *value,
                            Node::Split { .. } => 0.0,
                        })
                        .sum::<f64>()
                        / n_trees
                }
                TaskKind::Classification => {
                    let mut votes = vec![0.0; self.n_classes];
                    for tree in &self.trees {
                        if let Node::Leaf { class_weights, .. } = tree.leaf_for(row) {
                            for (vote, weight) in votes.iter_mut().zip(class_weights) {
                                *vote += weight;
                            }
                        }
                    }
                    let mut winner = 0;
                    for (class, &vote) in votes.iter().enumerate() {
                        if vote > votes[winner] {
                            winner = class;
                        }
                    }
                    winner as f64
                }
            })
            .collect();

        Ok(predictions)
    }

    pub fn task(&self) -> TaskKind {
        self.task
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn settings(&self) -> &ForestSettings {
        &self.settings
    }

    /// Structural check for forests restored from disk.
    pub(crate) fn is_well_formed(&self) -> bool {
        !self.trees.is_empty()
            && self
                .trees
                .iter()
                .all(|tree| tree.is_well_formed(self.n_features, self.n_classes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn small_settings() -> ForestSettings {
        ForestSettings {
            n_estimators: 15,
            ..ForestSettings::default()
        }
    }

    fn two_blobs() -> (Array2<f64>, Vec<f64>) {
        let mut rows = Vec::new();
        let mut y = Vec::new();
        for i in 0..20 {
            let offset = if i < 10 { 0.0 } else { 10.0 };
            rows.push(offset + (i % 10) as f64 * 0.1);
            rows.push(offset - (i % 10) as f64 * 0.05);
            y.push(if i < 10 { 0.0 } else { 1.0 });
        }
        (Array2::from_shape_vec((20, 2), rows).unwrap(), y)
    }

    #[test]
    fn test_classifier_learns_separable_data() {
        let (x, y) = two_blobs();
        let forest = RandomForest::fit(TaskKind::Classification, &x, &y, 2, &small_settings()).unwrap();

        assert_eq!(forest.n_trees(), 15);
        let predictions = forest.predict(&x).unwrap();
        assert_eq!(predictions, y);
    }

    #[test]
    fn test_regressor_tracks_trend() {
        let x = Array2::from_shape_fn((30, 1), |(i, _)| i as f64);
        let y: Vec<f64> = (0..30).map(|i| 2.0 * i as f64).collect();
        let forest = RandomForest::fit(TaskKind::Regression, &x, &y, 0, &small_settings()).unwrap();

        let predictions = forest.predict(&x).unwrap();
        assert_eq!(predictions.len(), 30);
        assert!(predictions[0] < predictions[29]);
        assert!(predictions.iter().all(|p| (0.0..=58.0).contains(p)));
    }

    #[test]
    fn test_same_seed_same_forest() {
        let (x, y) = two_blobs();
        let a = RandomForest::fit(TaskKind::Classification, &x, &y, 2, &small_settings()).unwrap();
        let b = RandomForest::fit(TaskKind::Classification, &x, &y, 2, &small_settings()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_predict_rejects_wrong_width() {
        let (x, y) = two_blobs();
        let forest = RandomForest::fit(TaskKind::Classification, &x, &y, 2, &small_settings()).unwrap();

        let narrow = Array2::<f64>::zeros((3, 1));
        assert!(matches!(
            forest.predict(&narrow),
            Err(PipelineError::ShapeMismatch {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_fit_rejects_empty_matrix() {
        let x = Array2::<f64>::zeros((0, 2));
        let result = RandomForest::fit(TaskKind::Regression, &x, &[], 0, &small_settings());
        assert!(matches!(result, Err(PipelineError::InvalidData(_))));
    }
}
