use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::DataError;
use crate::ml::gbdt::FeatureMatrix;

/// Default name of the lead-time column.
pub const DEFAULT_LEAD_TIME_COLUMN: &str = "lead_time_hours";

/// Which columns of a [`TrainingTable`] play which role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Integer lead time in hours.
    pub lead_time_column: String,
    /// Observed quantity compared against each threshold.
    pub observation_column: String,
    /// Feature columns, in model input order.
    pub feature_columns: Vec<String>,
}

/// Numeric training table stored column by column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingTable {
    columns: Vec<(String, Vec<f64>)>,
    index: BTreeMap<String, usize>,
    rows: usize,
}

impl TrainingTable {
    /// Build a table from named columns of equal length.
    pub fn from_columns(
        columns: impl IntoIterator<Item = (String, Vec<f64>)>,
    ) -> Result<Self, DataError> {
        let mut table = Self::default();
        for (name, values) in columns {
            if table.index.contains_key(&name) {
                return Err(DataError::DuplicateColumn(name));
            }
            if table.columns.is_empty() {
                table.rows = values.len();
            } else if values.len() != table.rows {
                return Err(DataError::ColumnLength {
                    column: name,
                    len: values.len(),
                    expected: table.rows,
                });
            }
            table.index.insert(name.clone(), table.columns.len());
            table.columns.push((name, values));
        }
        Ok(table)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Column names in insertion order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// Borrow a column by name.
    pub fn column(&self, name: &str) -> Result<&[f64], DataError> {
        self.index
            .get(name)
            .map(|&idx| self.columns[idx].1.as_slice())
            .ok_or_else(|| DataError::MissingColumn(name.to_string()))
    }

    /// Check that every column named by `spec` exists.
    pub fn check_columns(&self, spec: &ColumnSpec) -> Result<(), DataError> {
        if spec.feature_columns.is_empty() {
            return Err(DataError::NoFeatures);
        }
        self.column(&spec.lead_time_column)?;
        self.column(&spec.observation_column)?;
        for name in &spec.feature_columns {
            self.column(name)?;
        }
        Ok(())
    }

    /// Rows whose lead-time value equals `lead_time` exactly.
    pub fn rows_for_lead_time(
        &self,
        spec: &ColumnSpec,
        lead_time: u32,
    ) -> Result<Vec<usize>, DataError> {
        let target = f64::from(lead_time);
        Ok(self
            .column(&spec.lead_time_column)?
            .iter()
            .enumerate()
            .filter(|(_, value)| **value == target)
            .map(|(row, _)| row)
            .collect())
    }

    /// Features and binary labels for one grid cell.
    ///
    /// A row is labelled 1 when its observation is at least `threshold`.
    pub fn cell_training_set(
        &self,
        spec: &ColumnSpec,
        lead_time: u32,
        threshold: f64,
    ) -> Result<(FeatureMatrix, Vec<u8>), DataError> {
        self.check_columns(spec)?;
        let rows = self.rows_for_lead_time(spec, lead_time)?;
        if rows.is_empty() {
            return Err(DataError::EmptyLeadTime { lead_time });
        }

        let observations = self.column(&spec.observation_column)?;
        let mut labels = Vec::with_capacity(rows.len());
        for &row in &rows {
            let value = observations[row];
            if !value.is_finite() {
                return Err(DataError::NonFiniteObservation { row, value });
            }
            labels.push(u8::from(value >= threshold));
        }

        let feature_columns = spec
            .feature_columns
            .iter()
            .map(|name| self.column(name))
            .collect::<Result<Vec<_>, _>>()?;
        let matrix_rows = rows
            .iter()
            .map(|&row| feature_columns.iter().map(|column| column[row]).collect())
            .collect();
        Ok((
            FeatureMatrix {
                feature_names: spec.feature_columns.clone(),
                rows: matrix_rows,
            },
            labels,
        ))
    }
}
