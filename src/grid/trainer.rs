use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{
    ConfigTree, ConfigTreeBuilder, GridCoord, GridError, GridProcess, GridSpec, Trainer, naming,
};
use crate::dataset::{ColumnSpec, TrainingTable};
use crate::fs_ops;
use crate::ml::gbdt::{BinaryForest, TrainParams};
use crate::ml::metrics::evaluate_binary;

/// A cell's trained model, kept in memory for the compilation pass.
#[derive(Debug, Clone)]
pub struct TrainedCell {
    /// Grid coordinate.
    pub coord: GridCoord,
    /// Trained forest.
    pub model: BinaryForest,
}

/// Trains and persists one primary model per grid cell.
pub struct ModelTrainer {
    grid: GridSpec,
    output_dir: PathBuf,
    columns: ColumnSpec,
    params: TrainParams,
    trainer: Arc<dyn Trainer>,
}

impl std::fmt::Debug for ModelTrainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelTrainer")
            .field("grid", &self.grid)
            .field("output_dir", &self.output_dir)
            .field("columns", &self.columns)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl ModelTrainer {
    pub fn new(
        grid: GridSpec,
        output_dir: PathBuf,
        columns: ColumnSpec,
        params: TrainParams,
        trainer: Arc<dyn Trainer>,
    ) -> Self {
        Self {
            grid,
            output_dir,
            columns,
            params,
            trainer,
        }
    }

    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn params(&self) -> &TrainParams {
        &self.params
    }

    /// Every cell enumerated with an empty record.
    pub fn initial_tree(&self) -> ConfigTree {
        ConfigTreeBuilder::new(self.grid.cells()).finish()
    }

    /// Train every cell, persist each primary model, and record its path.
    ///
    /// Returns the builder still open so a compilation pass can extend it.
    pub(crate) fn train_all(
        &self,
        data: &TrainingTable,
    ) -> Result<(ConfigTreeBuilder, Vec<TrainedCell>), GridError> {
        let mut builder = ConfigTreeBuilder::new(self.grid.cells());
        data.check_columns(&self.columns)?;
        fs_ops::ensure_dir(&self.output_dir.join(naming::PRIMARY_MODELS_DIR))?;

        let mut trained = Vec::with_capacity(self.grid.cells().len());
        for coord in self.grid.cells() {
            let model = self.train_cell(data, coord)?;
            let path = coord.primary_model_path(&self.output_dir);
            model
                .save_text(&path)
                .map_err(|err| GridError::from_model_io(path.clone(), err))?;
            builder.record_primary(coord, path)?;
            trained.push(TrainedCell {
                coord: *coord,
                model,
            });
        }
        tracing::info!(
            "Trained {} primary model(s) under {}",
            trained.len(),
            self.output_dir.display()
        );
        Ok((builder, trained))
    }

    fn train_cell(&self, data: &TrainingTable, coord: &GridCoord) -> Result<BinaryForest, GridError> {
        let (features, labels) =
            data.cell_training_set(&self.columns, coord.lead_time, coord.threshold)?;
        let model = self
            .trainer
            .train(&features, &labels, &self.params)
            .map_err(|source| GridError::Training {
                cell: coord.file_stem(),
                source,
            })?;
        let metrics = evaluate_binary(&model, &features, &labels);
        tracing::info!(
            "{}: {} rows, positive rate {:.3}, accuracy {:.3}, log loss {:.4}",
            coord.file_stem(),
            metrics.rows,
            metrics.positive_rate,
            metrics.accuracy,
            metrics.log_loss
        );
        Ok(model)
    }
}

impl GridProcess for ModelTrainer {
    fn process(&self, data: &TrainingTable) -> Result<ConfigTree, GridError> {
        let (builder, _) = self.train_all(data)?;
        Ok(builder.finish())
    }
}
