//! Tabular training data: a numeric column store and its CSV loader.

mod csv_file;
mod table;

use std::path::PathBuf;

use thiserror::Error;

pub use csv_file::load_csv;
pub use table::{ColumnSpec, DEFAULT_LEAD_TIME_COLUMN, TrainingTable};

/// Errors raised while loading a table or extracting a cell's rows.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Missing column {0:?}")]
    MissingColumn(String),
    #[error("Duplicate column {0:?}")]
    DuplicateColumn(String),
    #[error("Column {column:?} has {len} rows but expected {expected}")]
    ColumnLength {
        column: String,
        len: usize,
        expected: usize,
    },
    #[error("At least one feature column is required")]
    NoFeatures,
    #[error("No training rows for lead time {lead_time}h")]
    EmptyLeadTime { lead_time: u32 },
    #[error("Observation at row {row} is not finite ({value})")]
    NonFiniteObservation { row: usize, value: f64 },
    #[error("Row {row}, column {column:?}: {value:?} is not a number")]
    Parse {
        row: usize,
        column: String,
        value: String,
    },
    #[error("Failed to read CSV {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
}
