use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::model::{BinaryForest, MODEL_VERSION, Node, Tree, sigmoid};

const MIN_PROBABILITY: f64 = 1e-6;
const MIN_DENOMINATOR: f64 = 1e-12;

/// Errors raised by the boosting trainer.
#[derive(Debug, Error)]
pub enum TrainError {
    /// Feature rows and labels disagree in length.
    #[error("Mismatched feature rows ({rows}) and labels ({labels})")]
    LengthMismatch {
        /// Feature row count.
        rows: usize,
        /// Label count.
        labels: usize,
    },
    /// No rows to train on.
    #[error("Empty training set")]
    Empty,
    /// A row has the wrong number of features.
    #[error("Row {row} has {len} features but expected {expected}")]
    RowWidth {
        /// Offending row index.
        row: usize,
        /// Row length.
        len: usize,
        /// Declared feature count.
        expected: usize,
    },
    /// A label is neither 0 nor 1.
    #[error("Label at row {row} is {label}; binary labels must be 0 or 1")]
    Label {
        /// Offending row index.
        row: usize,
        /// Label value.
        label: u8,
    },
    /// Hyperparameters are out of range.
    #[error("Invalid training parameter: {0}")]
    Params(String),
}

/// Learning objective. Only binary classification is supported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// Logistic loss on 0/1 labels.
    #[default]
    Binary,
}

impl Objective {
    /// Stable name written into model files.
    pub fn as_str(self) -> &'static str {
        match self {
            Objective::Binary => "binary",
        }
    }
}

/// Hyperparameters for boosted tree training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainParams {
    /// Maximum leaves per tree.
    pub num_leaves: usize,
    /// Number of boosting rounds (trees).
    pub boosting_rounds: usize,
    /// Learning objective.
    pub objective: Objective,
    /// Seed for every random draw made during training.
    pub random_seed: u64,
    /// Shrinkage applied to each leaf output.
    pub learning_rate: f64,
    /// Histogram bins per feature used for split search.
    pub max_bins: usize,
    /// Minimum rows on each side of a split.
    pub min_data_in_leaf: usize,
    /// L2 regularization on leaf outputs.
    pub lambda_l2: f64,
    /// Fraction of features considered per tree.
    pub feature_fraction: f64,
}

impl Default for TrainParams {
    fn default() -> Self {
        Self {
            num_leaves: 5,
            boosting_rounds: 10,
            objective: Objective::Binary,
            random_seed: 0,
            learning_rate: 0.1,
            max_bins: 32,
            min_data_in_leaf: 20,
            lambda_l2: 0.0,
            feature_fraction: 1.0,
        }
    }
}

impl TrainParams {
    fn validate(&self) -> Result<(), TrainError> {
        if self.num_leaves < 2 {
            return Err(TrainError::Params("num_leaves must be at least 2".into()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(TrainError::Params("learning_rate must be positive".into()));
        }
        if !(self.lambda_l2.is_finite() && self.lambda_l2 >= 0.0) {
            return Err(TrainError::Params("lambda_l2 must be non-negative".into()));
        }
        if !(self.feature_fraction > 0.0 && self.feature_fraction <= 1.0) {
            return Err(TrainError::Params(
                "feature_fraction must be in (0, 1]".into(),
            ));
        }
        Ok(())
    }
}

/// Row-major feature matrix with named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    /// Column names, in row order.
    pub feature_names: Vec<String>,
    /// Feature rows. NaN marks a missing value.
    pub rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the matrix has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Train a binary boosted-tree classifier with leaf-wise growth.
pub fn train_binary_forest(
    features: &FeatureMatrix,
    labels: &[u8],
    params: &TrainParams,
) -> Result<BinaryForest, TrainError> {
    params.validate()?;
    if features.rows.len() != labels.len() {
        return Err(TrainError::LengthMismatch {
            rows: features.rows.len(),
            labels: labels.len(),
        });
    }
    if features.rows.is_empty() {
        return Err(TrainError::Empty);
    }
    let d = features.feature_names.len();
    if d == 0 {
        return Err(TrainError::Params("at least one feature is required".into()));
    }
    for (row, values) in features.rows.iter().enumerate() {
        if values.len() != d {
            return Err(TrainError::RowWidth {
                row,
                len: values.len(),
                expected: d,
            });
        }
    }
    if let Some((row, &label)) = labels.iter().enumerate().find(|(_, l)| **l > 1) {
        return Err(TrainError::Label { row, label });
    }

    let n = features.rows.len();
    let bins = params.max_bins.clamp(2, 256);
    let edges = compute_bin_edges(&features.rows, d, bins);
    let binned = bin_features(&features.rows, &edges);
    let targets: Vec<f64> = labels.iter().map(|&l| f64::from(l)).collect();

    let positive_rate = (targets.iter().sum::<f64>() / n as f64)
        .clamp(MIN_PROBABILITY, 1.0 - MIN_PROBABILITY);
    let init_score = (positive_rate / (1.0 - positive_rate)).ln();
    let mut raw = vec![init_score; n];

    let mut rng = StdRng::seed_from_u64(params.random_seed);
    let mut trees = Vec::with_capacity(params.boosting_rounds);
    for _round in 0..params.boosting_rounds {
        let (grad, hess) = logistic_gradients(&raw, &targets);
        let candidates = sample_features(&mut rng, d, params.feature_fraction);
        let tree = grow_tree(&binned, &edges, &grad, &hess, &candidates, params);
        for (i, row) in features.rows.iter().enumerate() {
            raw[i] += tree.predict(row);
        }
        trees.push(tree);
    }

    Ok(BinaryForest {
        model_version: MODEL_VERSION,
        objective: params.objective.as_str().to_string(),
        feature_names: features.feature_names.clone(),
        init_score,
        trees,
    })
}

fn logistic_gradients(raw: &[f64], targets: &[f64]) -> (Vec<f64>, Vec<f64>) {
    raw.iter()
        .zip(targets)
        .map(|(&margin, &y)| {
            let p = sigmoid(margin);
            (p - y, p * (1.0 - p))
        })
        .unzip()
}

fn sample_features(rng: &mut StdRng, d: usize, fraction: f64) -> Vec<usize> {
    if fraction >= 1.0 {
        return (0..d).collect();
    }
    let amount = ((d as f64 * fraction).ceil() as usize).clamp(1, d);
    let mut picked = rand::seq::index::sample(rng, d, amount).into_vec();
    picked.sort_unstable();
    picked
}

/// Upper edges per feature: bin `b` holds values `v` with `edges[b-1] < v <= edges[b]`.
fn compute_bin_edges(rows: &[Vec<f64>], d: usize, bins: usize) -> Vec<Vec<f64>> {
    let mut mins = vec![f64::INFINITY; d];
    let mut maxs = vec![f64::NEG_INFINITY; d];
    for row in rows {
        for (j, &v) in row.iter().enumerate() {
            if v.is_finite() {
                mins[j] = mins[j].min(v);
                maxs[j] = maxs[j].max(v);
            }
        }
    }
    (0..d)
        .map(|j| {
            let (min, max) = if mins[j].is_finite() {
                (mins[j], maxs[j])
            } else {
                (0.0, 0.0)
            };
            let width = (max - min) / bins as f64;
            (0..bins)
                .map(|b| min + width * (b + 1) as f64)
                .collect()
        })
        .collect()
}

fn bin_features(rows: &[Vec<f64>], edges: &[Vec<f64>]) -> Vec<Vec<u8>> {
    rows.iter()
        .map(|row| {
            row.iter()
                .zip(edges)
                .map(|(&v, feature_edges)| {
                    let last = feature_edges.len() - 1;
                    // NaN sits in the last bin, which never lands left of a split.
                    let bin = if v.is_nan() {
                        last
                    } else {
                        feature_edges.partition_point(|&edge| edge < v).min(last)
                    };
                    bin as u8
                })
                .collect()
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    gain: f64,
    feature: usize,
    bin: usize,
}

struct LeafState {
    node: usize,
    rows: Vec<usize>,
    best: Option<SplitCandidate>,
}

fn grow_tree(
    binned: &[Vec<u8>],
    edges: &[Vec<f64>],
    grad: &[f64],
    hess: &[f64],
    candidates: &[usize],
    params: &TrainParams,
) -> Tree {
    let min_data = params.min_data_in_leaf.max(1);
    let bins = edges.first().map(Vec::len).unwrap_or(2);
    let find = |rows: &[usize]| {
        best_split(binned, grad, hess, rows, candidates, bins, min_data, params.lambda_l2)
    };

    let all_rows: Vec<usize> = (0..binned.len()).collect();
    let root_best = find(&all_rows);
    let mut nodes = vec![Node::Leaf { value: 0.0 }];
    let mut leaves = vec![LeafState {
        node: 0,
        rows: all_rows,
        best: root_best,
    }];

    while leaves.len() < params.num_leaves {
        let mut chosen: Option<(usize, SplitCandidate)> = None;
        for (idx, leaf) in leaves.iter().enumerate() {
            if let Some(split) = leaf.best
                && chosen.is_none_or(|(_, best)| split.gain > best.gain)
            {
                chosen = Some((idx, split));
            }
        }
        let Some((idx, split)) = chosen else {
            break;
        };
        let leaf = leaves.remove(idx);
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = leaf
            .rows
            .iter()
            .partition(|&&row| usize::from(binned[row][split.feature]) <= split.bin);

        let left = nodes.len();
        let right = left + 1;
        nodes.push(Node::Leaf { value: 0.0 });
        nodes.push(Node::Leaf { value: 0.0 });
        nodes[leaf.node] = Node::Split {
            feature: split.feature,
            threshold: edges[split.feature][split.bin],
            left,
            right,
        };
        let left_best = find(&left_rows);
        let right_best = find(&right_rows);
        leaves.push(LeafState {
            node: left,
            rows: left_rows,
            best: left_best,
        });
        leaves.push(LeafState {
            node: right,
            rows: right_rows,
            best: right_best,
        });
    }

    for leaf in &leaves {
        let (g, h) = sum_grad_hess(grad, hess, &leaf.rows);
        let value = -params.learning_rate * g / (h + params.lambda_l2).max(MIN_DENOMINATOR);
        nodes[leaf.node] = Node::Leaf { value };
    }
    Tree { nodes }
}

fn sum_grad_hess(grad: &[f64], hess: &[f64], rows: &[usize]) -> (f64, f64) {
    rows.iter()
        .fold((0.0, 0.0), |(g, h), &row| (g + grad[row], h + hess[row]))
}

fn leaf_score(g: f64, h: f64, lambda: f64) -> f64 {
    g * g / (h + lambda).max(MIN_DENOMINATOR)
}

#[allow(clippy::too_many_arguments)]
fn best_split(
    binned: &[Vec<u8>],
    grad: &[f64],
    hess: &[f64],
    rows: &[usize],
    candidates: &[usize],
    bins: usize,
    min_data: usize,
    lambda: f64,
) -> Option<SplitCandidate> {
    if rows.len() < 2 * min_data {
        return None;
    }
    let (total_g, total_h) = sum_grad_hess(grad, hess, rows);
    let parent_score = leaf_score(total_g, total_h, lambda);

    let mut best: Option<SplitCandidate> = None;
    for &feature in candidates {
        let mut counts = vec![0usize; bins];
        let mut sum_g = vec![0f64; bins];
        let mut sum_h = vec![0f64; bins];
        for &row in rows {
            let b = usize::from(binned[row][feature]);
            counts[b] += 1;
            sum_g[b] += grad[row];
            sum_h[b] += hess[row];
        }

        let mut left_count = 0usize;
        let mut left_g = 0f64;
        let mut left_h = 0f64;
        for bin in 0..(bins - 1) {
            left_count += counts[bin];
            left_g += sum_g[bin];
            left_h += sum_h[bin];
            let right_count = rows.len() - left_count;
            if left_count < min_data || right_count < min_data {
                continue;
            }
            let gain = leaf_score(left_g, left_h, lambda)
                + leaf_score(total_g - left_g, total_h - left_h, lambda)
                - parent_score;
            if gain > MIN_DENOMINATOR && best.is_none_or(|b| gain > b.gain) {
                best = Some(SplitCandidate { gain, feature, bin });
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable(n: usize) -> (FeatureMatrix, Vec<u8>) {
        let mut rows = Vec::with_capacity(n);
        let mut labels = Vec::with_capacity(n);
        for i in 0..n {
            let x = i as f64 / n as f64;
            rows.push(vec![x, (i % 7) as f64]);
            labels.push(u8::from(x >= 0.5));
        }
        (
            FeatureMatrix {
                feature_names: vec!["signal".into(), "noise".into()],
                rows,
            },
            labels,
        )
    }

    #[test]
    fn learns_a_separable_threshold() {
        let (x, y) = separable(200);
        let model = train_binary_forest(&x, &y, &TrainParams::default()).unwrap();
        assert_eq!(model.trees.len(), 10);
        assert!(model.predict_proba(&[0.9, 3.0]) > model.predict_proba(&[0.1, 3.0]));
        assert!(model.trees.iter().all(|tree| tree.num_leaves() <= 5));
        model.validate().unwrap();
    }

    #[test]
    fn training_is_deterministic() {
        let (x, y) = separable(120);
        let params = TrainParams {
            feature_fraction: 0.5,
            ..TrainParams::default()
        };
        let a = train_binary_forest(&x, &y, &params).unwrap();
        let b = train_binary_forest(&x, &y, &params).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn single_class_yields_constant_trees() {
        let (x, _) = separable(50);
        let y = vec![0u8; 50];
        let model = train_binary_forest(&x, &y, &TrainParams::default()).unwrap();
        assert!(model.trees.iter().all(|tree| tree.num_leaves() == 1));
        assert!(model.predict_proba(&[0.7, 1.0]) < 0.01);
    }

    #[test]
    fn small_datasets_respect_min_data_in_leaf() {
        let (x, y) = separable(30);
        let model = train_binary_forest(&x, &y, &TrainParams::default()).unwrap();
        assert!(model.trees.iter().all(|tree| tree.num_leaves() == 1));
    }

    #[test]
    fn nan_features_are_routed_right() {
        let (mut x, y) = separable(100);
        x.rows[0][0] = f64::NAN;
        let model = train_binary_forest(&x, &y, &TrainParams::default()).unwrap();
        assert!(model.predict_proba(&[f64::NAN, 0.0]).is_finite());
    }

    #[test]
    fn rejects_mismatched_inputs() {
        let (x, _) = separable(10);
        let err = train_binary_forest(&x, &[0, 1], &TrainParams::default()).unwrap_err();
        assert!(matches!(err, TrainError::LengthMismatch { .. }));
    }

    #[test]
    fn rejects_non_binary_labels() {
        let (x, mut y) = separable(10);
        y[3] = 2;
        let err = train_binary_forest(&x, &y, &TrainParams::default()).unwrap_err();
        assert!(matches!(err, TrainError::Label { row: 3, label: 2 }));
    }

    #[test]
    fn bin_edges_are_consistent_with_thresholds() {
        let rows = vec![vec![0.0], vec![0.5], vec![1.0]];
        let edges = compute_bin_edges(&rows, 1, 4);
        let binned = bin_features(&rows, &edges);
        for (row, bins) in rows.iter().zip(&binned) {
            let b = usize::from(bins[0]);
            assert!(row[0] <= edges[0][b]);
            if b > 0 {
                assert!(row[0] > edges[0][b - 1]);
            }
        }
    }
}
