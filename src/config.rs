//! Grid configuration loaded from TOML.
//!
//! ```toml
//! output_dir = "models"
//! lead_times = [12, 24]
//! thresholds = [0.01, 0.1]
//! observation_column = "obs"
//! feature_columns = ["f1", "f2"]
//!
//! [training]
//! num_leaves = 5
//!
//! [compilation]
//! toolchain = "clang"
//! on_failure = "degrade"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::DEFAULT_LEAD_TIME_COLUMN;
use crate::grid::CompileFailurePolicy;
use crate::ml::gbdt::TrainParams;
use crate::native::CompileOptions;

/// Errors that may occur while loading a grid configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to parse TOML config.
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        /// TOML file path.
        path: PathBuf,
        /// TOML parse error.
        source: toml::de::Error,
    },
}

/// Everything needed to build an orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    /// Root directory for `primary_models/` and `compiled_models/`.
    pub output_dir: PathBuf,
    /// Lead times in hours.
    pub lead_times: Vec<u32>,
    /// Thresholds on the observed quantity.
    pub thresholds: Vec<f64>,
    /// Column holding the lead time of each row.
    #[serde(default = "default_lead_time_column")]
    pub lead_time_column: String,
    /// Column holding the observation compared against each threshold.
    pub observation_column: String,
    /// Feature columns, in model input order.
    pub feature_columns: Vec<String>,
    /// Primary training hyperparameters.
    #[serde(default)]
    pub training: TrainParams,
    /// Native compilation settings.
    #[serde(default)]
    pub compilation: CompilationConfig,
}

/// Native compilation settings plus the per-cell failure policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationConfig {
    /// Toolchain options.
    #[serde(flatten)]
    pub options: CompileOptions,
    /// Whether a failed cell aborts the run.
    #[serde(default)]
    pub on_failure: CompileFailurePolicy,
}

impl GridConfig {
    /// Minimal configuration with default columns and hyperparameters.
    pub fn new(
        output_dir: impl Into<PathBuf>,
        lead_times: Vec<u32>,
        thresholds: Vec<f64>,
        observation_column: impl Into<String>,
        feature_columns: Vec<String>,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            lead_times,
            thresholds,
            lead_time_column: default_lead_time_column(),
            observation_column: observation_column.into(),
            feature_columns,
            training: TrainParams::default(),
            compilation: CompilationConfig::default(),
        }
    }
}

fn default_lead_time_column() -> String {
    DEFAULT_LEAD_TIME_COLUMN.to_string()
}

/// Load a grid configuration from a TOML file.
///
/// A relative `output_dir` is resolved against the config file's directory.
pub fn load_grid_config(path: &Path) -> Result<GridConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut config: GridConfig = toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source,
    })?;
    if config.output_dir.is_relative()
        && let Some(parent) = path.parent()
    {
        config.output_dir = parent.join(&config.output_dir);
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn minimal_config_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("grid.toml");
        std::fs::write(
            &path,
            r#"
output_dir = "models"
lead_times = [24, 12]
thresholds = [0.1, 0.05, 0.01]
observation_column = "obs"
feature_columns = ["f1"]
"#,
        )
        .unwrap();
        let config = load_grid_config(&path).unwrap();
        assert_eq!(config.output_dir, dir.path().join("models"));
        assert_eq!(config.lead_time_column, "lead_time_hours");
        assert_eq!(config.training, TrainParams::default());
        assert_eq!(config.training.num_leaves, 5);
        assert_eq!(config.training.boosting_rounds, 10);
        assert_eq!(config.training.random_seed, 0);
        assert_eq!(config.compilation.options, CompileOptions::default());
        assert_eq!(config.compilation.on_failure, CompileFailurePolicy::Abort);
    }

    #[test]
    fn sections_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("grid.toml");
        std::fs::write(
            &path,
            r#"
output_dir = "/tmp/models"
lead_times = [6]
thresholds = [0.5]
lead_time_column = "lt"
observation_column = "obs"
feature_columns = ["a", "b"]

[training]
num_leaves = 8
random_seed = 7

[compilation]
toolchain = "clang"
parallel_compile_units = 4
quantize = false
on_failure = "degrade"
"#,
        )
        .unwrap();
        let config = load_grid_config(&path).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/tmp/models"));
        assert_eq!(config.lead_time_column, "lt");
        assert_eq!(config.training.num_leaves, 8);
        assert_eq!(config.training.random_seed, 7);
        assert_eq!(config.training.boosting_rounds, 10);
        assert_eq!(config.compilation.options.toolchain, "clang");
        assert_eq!(config.compilation.options.parallel_compile_units, 4);
        assert!(!config.compilation.options.quantize);
        assert_eq!(config.compilation.on_failure, CompileFailurePolicy::Degrade);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempdir().unwrap();
        let err = load_grid_config(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn bad_policy_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("grid.toml");
        std::fs::write(
            &path,
            "output_dir = \"m\"\nlead_times = [1]\nthresholds = [1.0]\nobservation_column = \"o\"\nfeature_columns = [\"f\"]\n[compilation]\non_failure = \"retry\"\n",
        )
        .unwrap();
        assert!(matches!(
            load_grid_config(&path),
            Err(ConfigError::ParseToml { .. })
        ));
    }
}
