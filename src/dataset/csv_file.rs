use std::path::Path;

use super::{DataError, TrainingTable};

/// Load a headered CSV file where every cell is numeric; empty cells become NaN.
pub fn load_csv(path: &Path) -> Result<TrainingTable, DataError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| DataError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
    let headers: Vec<String> = reader
        .headers()
        .map_err(|source| DataError::Csv {
            path: path.to_path_buf(),
            source,
        })?
        .iter()
        .map(str::to_string)
        .collect();

    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); headers.len()];
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|source| DataError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        for (col, field) in record.iter().enumerate() {
            let value = if field.is_empty() {
                f64::NAN
            } else {
                field.parse::<f64>().map_err(|_| DataError::Parse {
                    row,
                    column: headers[col].clone(),
                    value: field.to_string(),
                })?
            };
            columns[col].push(value);
        }
    }
    tracing::debug!(
        "Loaded {} rows x {} columns from {}",
        columns.first().map(Vec::len).unwrap_or(0),
        headers.len(),
        path.display()
    );
    TrainingTable::from_columns(headers.into_iter().zip(columns))
}
