use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::fs_ops::{self, FsError};

/// Current on-disk model format version.
pub const MODEL_VERSION: i64 = 1;

/// Errors raised while persisting or loading a forest.
#[derive(Debug, Error)]
pub enum ModelIoError {
    /// Failed to read the model file.
    #[error("Failed to read model {path}: {source}")]
    Read {
        /// Model file path.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to write the model file.
    #[error(transparent)]
    Write(#[from] FsError),
    /// Model text could not be parsed.
    #[error("Invalid model text in {path}: {source}")]
    Parse {
        /// Model file path.
        path: PathBuf,
        /// JSON parse error.
        source: serde_json::Error,
    },
    /// Failed to serialize the model.
    #[error("Failed to serialize model: {0}")]
    Serialize(serde_json::Error),
    /// Parsed model violates a structural invariant.
    #[error("Invalid model structure: {0}")]
    Invalid(String),
}

/// One node of a regression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    /// Internal node routing `x[feature] <= threshold` left, everything else right.
    Split {
        /// Feature column index.
        feature: usize,
        /// Split threshold in feature units.
        threshold: f64,
        /// Index of the left child.
        left: usize,
        /// Index of the right child.
        right: usize,
    },
    /// Terminal node holding an additive margin contribution.
    Leaf {
        /// Shrunk leaf output.
        value: f64,
    },
}

/// Regression tree stored as a flat node arena; `nodes[0]` is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    /// Node arena.
    pub nodes: Vec<Node>,
}

impl Tree {
    /// Tree with a single constant leaf.
    pub fn constant(value: f64) -> Self {
        Self {
            nodes: vec![Node::Leaf { value }],
        }
    }

    /// Walk the tree for a feature row. NaN never satisfies `<=`, so it goes right.
    pub fn predict(&self, features: &[f64]) -> f64 {
        let mut idx = 0usize;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = features.get(*feature).copied().unwrap_or(f64::NAN);
                    idx = if value <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Number of leaves in the tree.
    pub fn num_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, Node::Leaf { .. }))
            .count()
    }
}

/// Boosted binary classifier: a logistic model over a sum of regression trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryForest {
    /// Model format version.
    pub model_version: i64,
    /// Objective the forest was trained for.
    pub objective: String,
    /// Ordered feature column names expected at prediction time.
    pub feature_names: Vec<String>,
    /// Initial margin (log-odds of the training positive rate).
    pub init_score: f64,
    /// Boosted trees, one per round.
    pub trees: Vec<Tree>,
}

impl BinaryForest {
    /// Validate structural invariants of the forest.
    pub fn validate(&self) -> Result<(), String> {
        if self.model_version != MODEL_VERSION {
            return Err(format!(
                "Unsupported model_version {} (expected {MODEL_VERSION})",
                self.model_version
            ));
        }
        if self.feature_names.is_empty() {
            return Err("Model must declare at least one feature".to_string());
        }
        if !self.init_score.is_finite() {
            return Err("init_score must be finite".to_string());
        }
        let n_features = self.feature_names.len();
        for (tree_idx, tree) in self.trees.iter().enumerate() {
            if tree.nodes.is_empty() {
                return Err(format!("Tree {tree_idx} has no nodes"));
            }
            for (node_idx, node) in tree.nodes.iter().enumerate() {
                match node {
                    Node::Leaf { value } if !value.is_finite() => {
                        return Err(format!("Tree {tree_idx} node {node_idx} has a non-finite leaf"));
                    }
                    Node::Leaf { .. } => {}
                    Node::Split {
                        feature,
                        threshold,
                        left,
                        right,
                    } => {
                        if *feature >= n_features {
                            return Err(format!(
                                "Tree {tree_idx} node {node_idx} references feature {feature} of {n_features}"
                            ));
                        }
                        if !threshold.is_finite() {
                            return Err(format!(
                                "Tree {tree_idx} node {node_idx} has a non-finite threshold"
                            ));
                        }
                        // Children always follow their parent, which rules out cycles.
                        for child in [left, right] {
                            if *child <= node_idx || *child >= tree.nodes.len() {
                                return Err(format!(
                                    "Tree {tree_idx} node {node_idx} has invalid child {child}"
                                ));
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Number of input features.
    pub fn num_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Raw margin (log-odds) for a feature row.
    pub fn predict_margin(&self, features: &[f64]) -> f64 {
        self.init_score
            + self
                .trees
                .iter()
                .map(|tree| tree.predict(features))
                .sum::<f64>()
    }

    /// Probability of the positive class for a feature row.
    pub fn predict_proba(&self, features: &[f64]) -> f64 {
        sigmoid(self.predict_margin(features))
    }

    /// Serialize the forest as model text.
    pub fn to_text(&self) -> Result<String, ModelIoError> {
        serde_json::to_string_pretty(self).map_err(ModelIoError::Serialize)
    }

    /// Persist the forest to `path`, replacing any previous file atomically.
    pub fn save_text(&self, path: &Path) -> Result<(), ModelIoError> {
        let text = self.to_text()?;
        fs_ops::atomic_write(path, text.as_bytes())?;
        Ok(())
    }

    /// Load and validate a forest previously written by [`BinaryForest::save_text`].
    pub fn load_text(path: &Path) -> Result<Self, ModelIoError> {
        let bytes = std::fs::read(path).map_err(|source| ModelIoError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let model: Self = serde_json::from_slice(&bytes).map_err(|source| ModelIoError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        model.validate().map_err(ModelIoError::Invalid)?;
        Ok(model)
    }
}

/// Logistic function.
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn split_forest() -> BinaryForest {
        BinaryForest {
            model_version: MODEL_VERSION,
            objective: "binary".into(),
            feature_names: vec!["a".into(), "b".into()],
            init_score: 0.0,
            trees: vec![Tree {
                nodes: vec![
                    Node::Split {
                        feature: 1,
                        threshold: 0.5,
                        left: 1,
                        right: 2,
                    },
                    Node::Leaf { value: -2.0 },
                    Node::Leaf { value: 2.0 },
                ],
            }],
        }
    }

    #[test]
    fn tree_routes_left_on_equal_and_nan_right() {
        let forest = split_forest();
        let tree = &forest.trees[0];
        assert_eq!(tree.predict(&[0.0, 0.5]), -2.0);
        assert_eq!(tree.predict(&[0.0, 0.6]), 2.0);
        assert_eq!(tree.predict(&[0.0, f64::NAN]), 2.0);
        assert_eq!(tree.num_leaves(), 2);
    }

    #[test]
    fn probability_is_sigmoid_of_margin() {
        let forest = split_forest();
        let p = forest.predict_proba(&[0.0, 1.0]);
        assert!((p - sigmoid(2.0)).abs() < 1e-12);
        assert!(forest.predict_proba(&[0.0, 0.0]) < 0.5);
    }

    #[test]
    fn validate_rejects_backward_children() {
        let mut forest = split_forest();
        forest.trees[0].nodes[0] = Node::Split {
            feature: 0,
            threshold: 0.0,
            left: 0,
            right: 2,
        };
        assert!(forest.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_feature() {
        let mut forest = split_forest();
        forest.trees[0].nodes[0] = Node::Split {
            feature: 7,
            threshold: 0.0,
            left: 1,
            right: 2,
        };
        assert!(forest.validate().unwrap_err().contains("feature 7"));
    }

    #[test]
    fn saved_text_loads_back_identically() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("024H_0.1000.txt");
        let forest = split_forest();
        forest.save_text(&path).unwrap();
        assert_eq!(BinaryForest::load_text(&path).unwrap(), forest);
    }

    #[test]
    fn load_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        std::fs::write(&path, "tree=0").unwrap();
        assert!(matches!(
            BinaryForest::load_text(&path),
            Err(ModelIoError::Parse { .. })
        ));
    }
}
