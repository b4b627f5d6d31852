//! CART decision tree stored as a flat node arena.
//!
//! Nodes reference their children by index into `nodes`, so a fitted tree is
//! built and serialized without recursion regardless of its depth.

use crate::types::TaskKind;
use ndarray::{Array2, ArrayView1};
use rand::Rng;
use rand::seq::index;
use serde::{Deserialize, Serialize};

/// A node of a fitted tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    /// Terminal node.
    ///
    /// For classification `value` is the majority class index and
    /// `class_weights` holds the class fractions of the training samples
    /// that reached the leaf. Regression leaves keep the mean target and no
    /// weights.
    Leaf {
        value: f64,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        class_weights: Vec<f64>,
    },
    /// Samples with `x[feature] <= threshold` go left.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

impl Node {
    fn placeholder() -> Self {
        Node::Leaf {
            value: 0.0,
            class_weights: Vec::new(),
        }
    }
}

/// Growth limits for a single tree.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeParams {
    pub task: TaskKind,
    /// Number of classes; targets are class indices in `0..n_classes`.
    pub n_classes: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features examined at each split.
    pub max_features: usize,
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// A fitted decision tree. The root is `nodes[0]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    /// Grow a tree on the rows of `x` listed in `sample` (repeats allowed).
    pub(crate) fn fit<R: Rng>(
        x: &Array2<f64>,
        y: &[f64],
        sample: &[usize],
        params: &TreeParams,
        rng: &mut R,
    ) -> Self {
        let mut nodes = vec![Node::placeholder()];
        let mut pending = vec![(0usize, sample.to_vec(), 0usize)];

        while let Some((slot, indices, depth)) = pending.pop() {
            let should_stop = indices.len() < params.min_samples_split
                || params.max_depth.is_some_and(|d| depth >= d)
                || is_pure(y, &indices);

            let split = if should_stop {
                None
            } else {
                best_split(x, y, &indices, params, rng)
            };

            let Some(split) = split else {
                nodes[slot] = leaf(y, &indices, params);
                continue;
            };

            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = indices
                .iter()
                .partition(|&&i| x[[i, split.feature]] <= split.threshold);

            let left = nodes.len();
            nodes.push(Node::placeholder());
            let right = nodes.len();
            nodes.push(Node::placeholder());

            nodes[slot] = Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                left,
                right,
            };

            pending.push((right, right_rows, depth + 1));
            pending.push((left, left_rows, depth + 1));
        }

        Self { nodes }
    }

    /// The leaf reached by `row`.
    pub fn leaf_for(&self, row: ArrayView1<'_, f64>) -> &Node {
        let mut current = 0;
        loop {
            match &self.nodes[current] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    current = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                leaf => return leaf,
            }
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, Node::Leaf { .. }))
            .count()
    }

    /// Longest root-to-leaf path, counted in edges.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut pending = vec![(0usize, 0usize)];
        while let Some((idx, depth)) = pending.pop() {
            match &self.nodes[idx] {
                Node::Split { left, right, .. } => {
                    pending.push((*left, depth + 1));
                    pending.push((*right, depth + 1));
                }
                Node::Leaf { .. } => deepest = deepest.max(depth),
            }
        }
        deepest
    }

    /// Check that every split points at existing, later nodes and only uses
    /// features below `n_features`. Used when a tree comes from disk.
    pub(crate) fn is_well_formed(&self, n_features: usize, n_classes: usize) -> bool {
        if self.nodes.is_empty() {
            return false;
        }
        self.nodes.iter().enumerate().all(|(idx, node)| match node {
            Node::Split {
                feature,
                left,
                right,
                ..
            } => {
                *feature < n_features
                    && *left > idx
                    && *right > idx
                    && *left < self.nodes.len()
                    && *right < self.nodes.len()
            }
            Node::Leaf { class_weights, .. } => {
                class_weights.is_empty() || class_weights.len() == n_classes
            }
        })
    }
}

fn is_pure(y: &[f64], indices: &[usize]) -> bool {
    match indices.split_first() {
        Some((first, rest)) => rest.iter().all(|&i| y[i] == y[*first]),
        None => true,
    }
}

fn leaf(y: &[f64], indices: &[usize], params: &TreeParams) -> Node {
    if indices.is_empty() {
        return Node::placeholder();
    }
    let n = indices.len() as f64;

    match params.task {
        TaskKind::Regression => Node::Leaf {
            value: indices.iter().map(|&i| y[i]).sum::<f64>() / n,
            class_weights: Vec::new(),
        },
        TaskKind::Classification => {
            let mut counts = vec![0.0; params.n_classes];
            for &i in indices {
                counts[y[i] as usize] += 1.0;
            }

            // first class wins ties
            let mut majority = 0;
            for (class, &count) in counts.iter().enumerate() {
                if count > counts[majority] {
                    majority = class;
                }
            }

            Node::Leaf {
                value: majority as f64,
                class_weights: counts.into_iter().map(|c| c / n).collect(),
            }
        }
    }
}

fn gini(counts: &[f64], total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    1.0 - counts.iter().map(|c| (c / total).powi(2)).sum::<f64>()
}

fn variance(sum: f64, sq_sum: f64, total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    let mean = sum / total;
    (sq_sum / total - mean * mean).max(0.0)
}

/// Search the candidate features for the split with the largest impurity
/// decrease. Returns `None` when no split improves on the parent.
fn best_split<R: Rng>(
    x: &Array2<f64>,
    y: &[f64],
    indices: &[usize],
    params: &TreeParams,
    rng: &mut R,
) -> Option<SplitCandidate> {
    let n_features = x.ncols();
    let n = indices.len();
    if n_features == 0 || n < 2 * params.min_samples_leaf {
        return None;
    }

    let mut features: Vec<usize> = if params.max_features >= n_features {
        (0..n_features).collect()
    } else {
        index::sample(rng, n_features, params.max_features).into_vec()
    };
    features.sort_unstable();

    let total = n as f64;
    let mut class_totals = vec![0.0; params.n_classes];
    let (mut sum_total, mut sq_total) = (0.0, 0.0);
    for &i in indices {
        match params.task {
            TaskKind::Classification => class_totals[y[i] as usize] += 1.0,
            TaskKind::Regression => {
                sum_total += y[i];
                sq_total += y[i] * y[i];
            }
        }
    }
    let parent = match params.task {
        TaskKind::Classification => gini(&class_totals, total),
        TaskKind::Regression => variance(sum_total, sq_total, total),
    };

    let mut best: Option<SplitCandidate> = None;
    let mut order = indices.to_vec();

    for feature in features {
        order.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

        let mut left_counts = vec![0.0; params.n_classes];
        let (mut left_sum, mut left_sq) = (0.0, 0.0);

        for pos in 0..n - 1 {
            let row = order[pos];
            match params.task {
                TaskKind::Classification => left_counts[y[row] as usize] += 1.0,
                TaskKind::Regression => {
                    left_sum += y[row];
                    left_sq += y[row] * y[row];
                }
            }

            let left_n = pos + 1;
            let right_n = n - left_n;
            if left_n < params.min_samples_leaf || right_n < params.min_samples_leaf {
                continue;
            }

            let here = x[[row, feature]];
            let next = x[[order[pos + 1], feature]];
            if here == next {
                continue;
            }

            let (left_impurity, right_impurity) = match params.task {
                TaskKind::Classification => {
                    let right_counts: Vec<f64> = class_totals
                        .iter()
                        .zip(&left_counts)
                        .map(|(t, l)| t - l)
                        .collect();
                    (
                        gini(&left_counts, left_n as f64),
                        gini(&right_counts, right_n as f64),
                    )
                }
                TaskKind::Regression => (
                    variance(left_sum, left_sq, left_n as f64),
                    variance(sum_total - left_sum, sq_total - left_sq, right_n as f64),
                ),
            };

            let weighted =
                (left_n as f64 * left_impurity + right_n as f64 * right_impurity) / total;
            let gain = parent - weighted;

            if gain > best.map_or(f64::EPSILON, |b| b.gain) {
                let mut threshold = (here + next) / 2.0;
                if threshold >= next {
                    threshold = here;
                }
                best = Some(SplitCandidate {
                    feature,
                    threshold,
                    gain,
                });
            }
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn params(task: TaskKind, n_classes: usize) -> TreeParams {
        TreeParams {
            task,
            n_classes,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: usize::MAX,
        }
    }

    #[test]
    fn test_classifier_separates_classes() {
        let x = array![[1.0], [2.0], [3.0], [10.0], [11.0], [12.0]];
        let y = [0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let sample: Vec<usize> = (0..6).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let tree = DecisionTree::fit(&x, &y, &sample, &params(TaskKind::Classification, 2), &mut rng);

        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.n_leaves(), 2);
        for (row, expected) in x.rows().into_iter().zip(y) {
            match tree.leaf_for(row) {
                Node::Leaf { value, class_weights } => {
                    assert_eq!(*value, expected);
                    assert_eq!(class_weights.len(), 2);
                }
                Node::Split { .. } => panic!("walk must end at a leaf"),
            }
        }
    }

    #[test]
    fn test_regressor_fits_training_points() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = [1.5, 3.0, 4.5, 6.0];
        let sample: Vec<usize> = (0..4).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let tree = DecisionTree::fit(&x, &y, &sample, &params(TaskKind::Regression, 0), &mut rng);

        for (row, expected) in x.rows().into_iter().zip(y) {
            match tree.leaf_for(row) {
                Node::Leaf { value, .. } => assert!((value - expected).abs() < 1e-12),
                Node::Split { .. } => panic!("walk must end at a leaf"),
            }
        }
    }

    #[test]
    fn test_max_depth_limits_growth() {
        let x = array![[0.0], [1.0], [2.0], [3.0], [4.0], [5.0], [6.0], [7.0]];
        let y = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        let sample: Vec<usize> = (0..8).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let mut limited = params(TaskKind::Regression, 0);
        limited.max_depth = Some(2);
        let tree = DecisionTree::fit(&x, &y, &sample, &limited, &mut rng);

        assert!(tree.depth() <= 2);
        assert!(tree.is_well_formed(1, 0));
    }

    #[test]
    fn test_constant_features_yield_single_leaf() {
        let x = array![[1.0], [1.0], [1.0]];
        let y = [0.0, 1.0, 0.0];
        let sample: Vec<usize> = (0..3).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let tree = DecisionTree::fit(&x, &y, &sample, &params(TaskKind::Classification, 2), &mut rng);

        assert_eq!(tree.n_nodes(), 1);
        assert_eq!(
            tree.leaf_for(x.row(0)),
            &Node::Leaf {
                value: 0.0,
                class_weights: vec![2.0 / 3.0, 1.0 / 3.0]
            }
        );
    }

    #[test]
    fn test_malformed_tree_is_detected() {
        let tree = DecisionTree {
            nodes: vec![Node::Split {
                feature: 3,
                threshold: 0.0,
                left: 1,
                right: 2,
            }],
        };
        assert!(!tree.is_well_formed(1, 0));
    }
}
