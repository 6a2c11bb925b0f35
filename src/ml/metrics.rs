//! Evaluation metrics for binary classifiers.

use serde::{Deserialize, Serialize};

use super::gbdt::{BinaryForest, FeatureMatrix};

const LOG_LOSS_EPS: f64 = 1e-15;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// 2x2 confusion matrix for a binary classifier.
pub struct ConfusionMatrix {
    /// Row-major counts (`truth * 2 + predicted`).
    pub counts: [u32; 4],
}

impl ConfusionMatrix {
    pub fn add(&mut self, truth: u8, predicted: u8) {
        if truth > 1 || predicted > 1 {
            return;
        }
        let idx = usize::from(truth) * 2 + usize::from(predicted);
        self.counts[idx] = self.counts[idx].saturating_add(1);
    }

    pub fn get(&self, truth: u8, predicted: u8) -> u32 {
        self.counts[usize::from(truth) * 2 + usize::from(predicted)]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| u64::from(c)).sum()
    }
}

/// Summary of a trained cell evaluated on its own training rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinaryMetrics {
    /// Rows evaluated.
    pub rows: usize,
    /// Share of rows labelled 1.
    pub positive_rate: f64,
    /// Share of rows classified correctly at probability 0.5.
    pub accuracy: f64,
    /// Mean logistic loss.
    pub log_loss: f64,
}

/// Compute overall accuracy from a confusion matrix.
pub fn accuracy(cm: &ConfusionMatrix) -> f64 {
    let total = cm.total();
    if total == 0 {
        return 0.0;
    }
    let correct = u64::from(cm.get(0, 0)) + u64::from(cm.get(1, 1));
    correct as f64 / total as f64
}

/// Evaluate a forest on labelled rows.
pub fn evaluate_binary(model: &BinaryForest, features: &FeatureMatrix, labels: &[u8]) -> BinaryMetrics {
    let mut cm = ConfusionMatrix::default();
    let mut loss = 0.0f64;
    let mut positives = 0usize;
    for (row, &truth) in features.rows.iter().zip(labels) {
        let p = model.predict_proba(row).clamp(LOG_LOSS_EPS, 1.0 - LOG_LOSS_EPS);
        let predicted = u8::from(p >= 0.5);
        cm.add(truth, predicted);
        if truth == 1 {
            positives += 1;
            loss -= p.ln();
        } else {
            loss -= (1.0 - p).ln();
        }
    }
    let rows = features.rows.len().min(labels.len());
    let denom = rows.max(1) as f64;
    BinaryMetrics {
        rows,
        positive_rate: positives as f64 / denom,
        accuracy: accuracy(&cm),
        log_loss: loss / denom,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::gbdt::{MODEL_VERSION, Tree};

    #[test]
    fn accuracy_counts_diagonal() {
        let mut cm = ConfusionMatrix::default();
        cm.add(0, 0);
        cm.add(1, 1);
        cm.add(1, 0);
        cm.add(0, 1);
        cm.add(2, 0);
        assert_eq!(cm.total(), 4);
        assert!((accuracy(&cm) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn constant_model_metrics() {
        let model = BinaryForest {
            model_version: MODEL_VERSION,
            objective: "binary".into(),
            feature_names: vec!["x".into()],
            init_score: 0.0,
            trees: vec![Tree::constant(0.0)],
        };
        let features = FeatureMatrix {
            feature_names: vec!["x".into()],
            rows: vec![vec![0.0], vec![1.0]],
        };
        let metrics = evaluate_binary(&model, &features, &[1, 0]);
        assert_eq!(metrics.rows, 2);
        assert!((metrics.positive_rate - 0.5).abs() < 1e-12);
        assert!((metrics.accuracy - 0.5).abs() < 1e-12);
        assert!((metrics.log_loss - std::f64::consts::LN_2).abs() < 1e-9);
    }
}
