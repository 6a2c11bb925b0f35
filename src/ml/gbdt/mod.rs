//! Deterministic gradient-boosted trees for binary classification.
//!
//! This is the built-in primary trainer:
//! - Leaf-wise growth bounded by `num_leaves`, split search over histogram bins.
//! - Logistic loss with a log-odds starting score.
//! - Seeded feature sampling so identical inputs always give identical forests.
//! - Text export/load of the trained forest.

mod model;
mod train;

pub use model::{BinaryForest, MODEL_VERSION, ModelIoError, Node, Tree, sigmoid};
pub use train::{FeatureMatrix, Objective, TrainError, TrainParams, train_binary_forest};
