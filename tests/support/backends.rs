use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use calgrid::grid::{BackendProvider, Compiler, Trainer};
use calgrid::ml::gbdt::{
    BinaryForest, FeatureMatrix, MODEL_VERSION, TrainError, TrainParams, Tree,
};
use calgrid::native::{CompileError, CompileOptions};

/// Returns a one-tree forest whose leaf is the positive rate, and counts calls.
#[derive(Default)]
pub struct FakeTrainer {
    pub calls: AtomicUsize,
}

impl Trainer for FakeTrainer {
    fn train(
        &self,
        features: &FeatureMatrix,
        labels: &[u8],
        _params: &TrainParams,
    ) -> Result<BinaryForest, TrainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let positives = labels.iter().filter(|&&label| label == 1).count();
        Ok(BinaryForest {
            model_version: MODEL_VERSION,
            objective: "binary".into(),
            feature_names: features.feature_names.clone(),
            init_score: 0.0,
            trees: vec![Tree::constant(positives as f64 / labels.len() as f64)],
        })
    }
}

/// Writes a marker file per compile, or fails for stems listed in `fail_stems`.
#[derive(Default)]
pub struct FakeCompiler {
    pub fail_stems: Vec<String>,
    pub written: Mutex<Vec<PathBuf>>,
}

impl FakeCompiler {
    pub fn failing_on(stems: &[&str]) -> Self {
        Self {
            fail_stems: stems.iter().map(|stem| stem.to_string()).collect(),
            written: Mutex::new(Vec::new()),
        }
    }
}

impl Compiler for FakeCompiler {
    fn artifact_extension(&self) -> &str {
        "fake"
    }

    fn compile(&self, model: &BinaryForest, dest: &Path) -> Result<(), CompileError> {
        let stem = dest
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.fail_stems.contains(&stem) {
            return Err(CompileError::Toolchain {
                command: format!("fake-cc {stem}"),
                status: Some(1),
                stderr: "injected failure".into(),
            });
        }
        std::fs::write(dest, format!("{} trees", model.trees.len())).map_err(|source| {
            CompileError::WriteSource {
                path: dest.to_path_buf(),
                source,
            }
        })?;
        self.written
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .push(dest.to_path_buf());
        Ok(())
    }
}

/// Provider whose capabilities are fixed by the test.
pub struct FakeProvider {
    pub trainer: Option<Arc<dyn Trainer>>,
    pub compiler: Option<Arc<dyn Compiler>>,
}

impl FakeProvider {
    pub fn train_only() -> Self {
        Self {
            trainer: Some(Arc::new(FakeTrainer::default())),
            compiler: None,
        }
    }

    pub fn with_compiler(compiler: FakeCompiler) -> Self {
        Self {
            trainer: Some(Arc::new(FakeTrainer::default())),
            compiler: Some(Arc::new(compiler)),
        }
    }

    pub fn without_trainer() -> Self {
        Self {
            trainer: None,
            compiler: Some(Arc::new(FakeCompiler::default())),
        }
    }
}

impl BackendProvider for FakeProvider {
    fn trainer(&self) -> Option<Arc<dyn Trainer>> {
        self.trainer.clone()
    }

    fn compiler(&self, _options: &CompileOptions) -> Option<Arc<dyn Compiler>> {
        self.compiler.clone()
    }
}
