use std::path::PathBuf;

use thiserror::Error;

use super::tree::TreeError;
use crate::dataset::DataError;
use crate::ml::gbdt::{ModelIoError, TrainError};
use crate::native::CompileError;

/// Errors raised while building or running a grid orchestrator.
///
/// Every variant is fatal: a run either returns a complete config tree or
/// one of these.
#[derive(Debug, Error)]
pub enum GridError {
    /// A required capability is missing or the grid definition is unusable.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// User input was rejected before any work started.
    #[error("Validation error: {0}")]
    Validation(String),
    /// A cell's training rows are empty or malformed.
    #[error("Data error: {0}")]
    Data(#[from] DataError),
    /// Persisting an artifact or creating its directory failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Artifact or directory path.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// The primary trainer rejected a cell.
    #[error("Training failed for {cell}: {source}")]
    Training {
        /// Cell file stem, e.g. `024H_0.1000`.
        cell: String,
        /// Trainer error.
        source: TrainError,
    },
    /// The compiler failed for a cell.
    #[error("Compilation failed for {cell}: {source}")]
    Compilation {
        /// Cell file stem, e.g. `024H_0.1000`.
        cell: String,
        /// Compiler error.
        source: CompileError,
    },
    /// The config tree builder refused a write.
    #[error("Config tree error: {0}")]
    Tree(#[from] TreeError),
}

impl From<crate::fs_ops::FsError> for GridError {
    fn from(error: crate::fs_ops::FsError) -> Self {
        match error {
            crate::fs_ops::FsError::CreateDir { path, source }
            | crate::fs_ops::FsError::Write { path, source } => GridError::Io { path, source },
        }
    }
}

impl GridError {
    pub(crate) fn from_model_io(path: PathBuf, error: ModelIoError) -> Self {
        match error {
            ModelIoError::Write(fs) => fs.into(),
            ModelIoError::Read { path, source } => GridError::Io { path, source },
            other => GridError::Io {
                path,
                source: std::io::Error::other(other.to_string()),
            },
        }
    }
}
