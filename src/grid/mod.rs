//! Grid orchestration: one binary classifier per (lead time, threshold) cell.
//!
//! The capability probe happens once, in [`Orchestrator::new`], and binds one
//! of two variants behind the shared [`GridProcess`] contract:
//! - [`ModelTrainer`] trains and persists a primary model per cell.
//! - [`ModelCompiler`] additionally compiles each primary model to a native
//!   predictor.
//!
//! Traversal is sequential with lead times outer and thresholds inner. Any
//! failure aborts the run; a returned [`ConfigTree`] is always complete.

mod backend;
mod compiler;
mod error;
pub mod naming;
mod trainer;
mod tree;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::GridConfig;
use crate::dataset::{ColumnSpec, TrainingTable};

pub use backend::{
    BackendProvider, Backends, Compiler, GbdtTrainer, SystemBackends, Trainer, Variant,
};
pub use compiler::ModelCompiler;
pub use error::GridError;
pub use trainer::{ModelTrainer, TrainedCell};
pub use tree::{ArtifactRecord, ConfigTree, ConfigTreeBuilder, TreeError};

/// Shared contract of both orchestrator variants.
pub trait GridProcess {
    /// Run the whole grid and return the completed config tree.
    fn process(&self, data: &TrainingTable) -> Result<ConfigTree, GridError>;
}

/// One cell of the grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridCoord {
    /// Lead time in hours.
    pub lead_time: u32,
    /// Decision threshold on the observed quantity.
    pub threshold: f64,
}

impl GridCoord {
    /// Canonical lead-time key.
    pub fn lead_time_key(&self) -> String {
        naming::lead_time_key(self.lead_time)
    }

    /// Canonical threshold key.
    pub fn threshold_key(&self) -> String {
        naming::threshold_key(self.threshold)
    }

    /// File stem shared by every artifact of the cell, e.g. `024H_0.1000`.
    pub fn file_stem(&self) -> String {
        naming::artifact_stem(self.lead_time, self.threshold)
    }

    /// Primary model path under `output_dir`.
    pub fn primary_model_path(&self, output_dir: &Path) -> PathBuf {
        naming::primary_model_path(output_dir, self.lead_time, self.threshold)
    }

    /// Compiled predictor path under `output_dir`.
    pub fn compiled_model_path(&self, output_dir: &Path, extension: &str) -> PathBuf {
        naming::compiled_model_path(output_dir, self.lead_time, self.threshold, extension)
    }
}

/// Validated cartesian product of lead times and thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSpec {
    lead_times: Vec<u32>,
    thresholds: Vec<f64>,
    cells: Vec<GridCoord>,
}

impl GridSpec {
    /// Validate the coordinate sets and enumerate every cell.
    ///
    /// Two entries whose canonical keys coincide are rejected rather than merged.
    pub fn new(lead_times: Vec<u32>, thresholds: Vec<f64>) -> Result<Self, GridError> {
        if lead_times.is_empty() {
            return Err(GridError::Configuration("no lead times configured".into()));
        }
        if thresholds.is_empty() {
            return Err(GridError::Configuration("no thresholds configured".into()));
        }
        let mut lead_keys = BTreeSet::new();
        for &lead_time in &lead_times {
            if lead_time > naming::MAX_LEAD_TIME_HOURS {
                return Err(GridError::Configuration(format!(
                    "lead time {lead_time}h exceeds {}h",
                    naming::MAX_LEAD_TIME_HOURS
                )));
            }
            if !lead_keys.insert(naming::lead_time_key(lead_time)) {
                return Err(GridError::Configuration(format!(
                    "lead time {lead_time}h is listed twice"
                )));
            }
        }
        let mut threshold_keys = BTreeSet::new();
        for &threshold in &thresholds {
            if !threshold.is_finite() {
                return Err(GridError::Configuration(format!(
                    "threshold {threshold} is not finite"
                )));
            }
            let key = naming::threshold_key(threshold);
            if !threshold_keys.insert(key.clone()) {
                return Err(GridError::Configuration(format!(
                    "threshold {threshold} collides with another threshold on key {key}"
                )));
            }
        }
        let cells = lead_times
            .iter()
            .flat_map(|&lead_time| {
                thresholds.iter().map(move |&threshold| GridCoord {
                    lead_time,
                    threshold,
                })
            })
            .collect();
        Ok(Self {
            lead_times,
            thresholds,
            cells,
        })
    }

    /// Configured lead times, in configuration order.
    pub fn lead_times(&self) -> &[u32] {
        &self.lead_times
    }

    /// Configured thresholds, in configuration order.
    pub fn thresholds(&self) -> &[f64] {
        &self.thresholds
    }

    /// Every cell, lead times outer and thresholds inner.
    pub fn cells(&self) -> &[GridCoord] {
        &self.cells
    }
}

/// What to do when compiling one cell fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompileFailurePolicy {
    /// Fail the whole run.
    #[default]
    Abort,
    /// Warn, leave the cell without a compiled path, and continue.
    Degrade,
}

/// Orchestrator bound to the capabilities found at construction.
#[derive(Debug)]
pub enum Orchestrator {
    /// Primary models only.
    TrainOnly(ModelTrainer),
    /// Primary models plus compiled predictors.
    TrainAndCompile(ModelCompiler),
}

impl Orchestrator {
    /// Validate `config`, probe `provider` once and bind a variant.
    ///
    /// Fails with [`GridError::Configuration`] when no trainer is available;
    /// a missing compiler silently yields [`Variant::TrainOnly`].
    pub fn new(config: &GridConfig, provider: &dyn BackendProvider) -> Result<Self, GridError> {
        let grid = GridSpec::new(config.lead_times.clone(), config.thresholds.clone())?;
        if config.feature_columns.is_empty() {
            return Err(GridError::Configuration(
                "at least one feature column is required".into(),
            ));
        }
        let columns = ColumnSpec {
            lead_time_column: config.lead_time_column.clone(),
            observation_column: config.observation_column.clone(),
            feature_columns: config.feature_columns.clone(),
        };
        let backends = Backends::select(provider, &config.compilation.options).ok_or_else(|| {
            GridError::Configuration("primary training capability is not available".into())
        })?;
        tracing::info!(
            "Grid of {} lead time(s) x {} threshold(s) bound to {:?}",
            grid.lead_times().len(),
            grid.thresholds().len(),
            backends.variant()
        );

        Ok(match backends {
            Backends::TrainOnly { trainer } => Orchestrator::TrainOnly(ModelTrainer::new(
                grid,
                config.output_dir.clone(),
                columns,
                config.training.clone(),
                trainer,
            )),
            Backends::TrainAndCompile { trainer, compiler } => {
                let base = ModelTrainer::new(
                    grid,
                    config.output_dir.clone(),
                    columns,
                    config.training.clone(),
                    trainer,
                );
                Orchestrator::TrainAndCompile(ModelCompiler::new(
                    base,
                    compiler,
                    config.compilation.on_failure,
                ))
            }
        })
    }

    /// Variant bound at construction.
    pub fn variant(&self) -> Variant {
        match self {
            Orchestrator::TrainOnly(_) => Variant::TrainOnly,
            Orchestrator::TrainAndCompile(_) => Variant::TrainAndCompile,
        }
    }

    /// Grid this orchestrator traverses.
    pub fn grid(&self) -> &GridSpec {
        self.trainer().grid()
    }

    /// Fully enumerated tree with every record empty, as it stands before training.
    pub fn initial_tree(&self) -> ConfigTree {
        self.trainer().initial_tree()
    }

    fn trainer(&self) -> &ModelTrainer {
        match self {
            Orchestrator::TrainOnly(trainer) => trainer,
            Orchestrator::TrainAndCompile(compiler) => compiler.trainer(),
        }
    }
}

impl GridProcess for Orchestrator {
    fn process(&self, data: &TrainingTable) -> Result<ConfigTree, GridError> {
        match self {
            Orchestrator::TrainOnly(trainer) => trainer.process(data),
            Orchestrator::TrainAndCompile(compiler) => compiler.process(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_are_lead_time_major() {
        let grid = GridSpec::new(vec![24, 12], vec![0.1, 0.05]).unwrap();
        let stems: Vec<String> = grid.cells().iter().map(GridCoord::file_stem).collect();
        assert_eq!(
            stems,
            vec!["024H_0.1000", "024H_0.0500", "012H_0.1000", "012H_0.0500"]
        );
    }

    #[test]
    fn colliding_threshold_keys_are_rejected() {
        let err = GridSpec::new(vec![12], vec![0.1, 0.10001]).unwrap_err();
        assert!(matches!(err, GridError::Configuration(msg) if msg.contains("0.1000")));
    }

    #[test]
    fn large_distinct_thresholds_are_accepted() {
        let grid = GridSpec::new(vec![1], vec![1e16, 2e16]).unwrap();
        assert_eq!(grid.cells().len(), 2);
        assert_ne!(grid.cells()[0].threshold_key(), grid.cells()[1].threshold_key());
    }

    #[test]
    fn duplicate_lead_times_are_rejected() {
        assert!(GridSpec::new(vec![12, 12], vec![0.1]).is_err());
    }

    #[test]
    fn oversized_lead_times_are_rejected() {
        assert!(GridSpec::new(vec![1000], vec![0.1]).is_err());
    }

    #[test]
    fn empty_or_non_finite_inputs_are_rejected() {
        assert!(GridSpec::new(vec![], vec![0.1]).is_err());
        assert!(GridSpec::new(vec![12], vec![]).is_err());
        assert!(GridSpec::new(vec![12], vec![f64::NAN]).is_err());
    }

    #[test]
    fn coord_paths_follow_naming() {
        let coord = GridCoord {
            lead_time: 6,
            threshold: 0.5,
        };
        let out = Path::new("out");
        assert_eq!(
            coord.primary_model_path(out),
            out.join("primary_models").join("006H_0.5000.txt")
        );
        assert_eq!(
            coord.compiled_model_path(out, "dll"),
            out.join("compiled_models").join("006H_0.5000.dll")
        );
    }
}
