use std::path::Path;
use std::sync::Arc;

use super::{
    CompileFailurePolicy, Compiler, ConfigTree, GridError, GridProcess, ModelTrainer, naming,
};
use crate::dataset::TrainingTable;
use crate::fs_ops;

/// Trains every cell like [`ModelTrainer`], then compiles each primary model
/// into a native predictor.
pub struct ModelCompiler {
    trainer: ModelTrainer,
    compiler: Arc<dyn Compiler>,
    on_failure: CompileFailurePolicy,
}

impl std::fmt::Debug for ModelCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCompiler")
            .field("trainer", &self.trainer)
            .field("on_failure", &self.on_failure)
            .finish_non_exhaustive()
    }
}

impl ModelCompiler {
    pub fn new(
        trainer: ModelTrainer,
        compiler: Arc<dyn Compiler>,
        on_failure: CompileFailurePolicy,
    ) -> Self {
        Self {
            trainer,
            compiler,
            on_failure,
        }
    }

    /// Training stage this compiler extends.
    pub fn trainer(&self) -> &ModelTrainer {
        &self.trainer
    }

    pub fn on_failure(&self) -> CompileFailurePolicy {
        self.on_failure
    }
}

impl GridProcess for ModelCompiler {
    fn process(&self, data: &TrainingTable) -> Result<ConfigTree, GridError> {
        let (mut builder, cells) = self.trainer.train_all(data)?;
        let output_dir = self.trainer.output_dir();
        fs_ops::ensure_dir(&output_dir.join(naming::COMPILED_MODELS_DIR))?;

        let extension = self.compiler.artifact_extension();
        let mut compiled = 0usize;
        for cell in &cells {
            let path = cell.coord.compiled_model_path(output_dir, extension);
            match self.compiler.compile(&cell.model, &path) {
                Ok(()) => {
                    builder.record_compiled(&cell.coord, path)?;
                    compiled += 1;
                }
                Err(source) => match self.on_failure {
                    CompileFailurePolicy::Abort => {
                        return Err(GridError::Compilation {
                            cell: cell.coord.file_stem(),
                            source,
                        });
                    }
                    CompileFailurePolicy::Degrade => {
                        tracing::warn!(
                            "Compilation failed for {}; continuing without a compiled predictor: {source}",
                            cell.coord.file_stem()
                        );
                        remove_stale(&path)?;
                    }
                },
            }
        }
        tracing::info!("Compiled {compiled} of {} model(s)", cells.len());
        Ok(builder.finish())
    }
}

/// Drop a predictor left by an earlier run; it no longer matches the new primary model.
fn remove_stale(path: &Path) -> Result<(), GridError> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::info!("Removed stale predictor {}", path.display());
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(GridError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
