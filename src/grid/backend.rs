//! Training and compilation capabilities, and the one-time probe that picks
//! which orchestrator variant a run gets.

use std::path::Path;
use std::sync::Arc;

use crate::ml::gbdt::{BinaryForest, FeatureMatrix, TrainError, TrainParams, train_binary_forest};
use crate::native::{self, CompileError, CompileOptions, NativeCompiler};

/// Primary training capability: features and binary labels in, trained forest out.
pub trait Trainer: Send + Sync {
    /// Train one binary classifier.
    fn train(
        &self,
        features: &FeatureMatrix,
        labels: &[u8],
        params: &TrainParams,
    ) -> Result<BinaryForest, TrainError>;
}

/// Secondary compilation capability: trained forest in, native predictor on disk.
pub trait Compiler: Send + Sync {
    /// File extension of the artifacts this compiler writes.
    fn artifact_extension(&self) -> &str;

    /// Compile `model` and write the predictor to `dest`.
    fn compile(&self, model: &BinaryForest, dest: &Path) -> Result<(), CompileError>;
}

/// Source of capabilities, probed once when an orchestrator is built.
pub trait BackendProvider {
    /// Primary trainer, if one is available.
    fn trainer(&self) -> Option<Arc<dyn Trainer>>;

    /// Compiler, if one is available. Absence is not an error.
    fn compiler(&self, options: &CompileOptions) -> Option<Arc<dyn Compiler>>;
}

/// Which orchestrator variant a probe produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Primary models only.
    TrainOnly,
    /// Primary models plus compiled predictors.
    TrainAndCompile,
}

/// Capabilities bound by a successful probe.
#[derive(Clone)]
pub enum Backends {
    /// Only the trainer is available.
    TrainOnly {
        /// Primary trainer.
        trainer: Arc<dyn Trainer>,
    },
    /// Both the trainer and the compiler are available.
    TrainAndCompile {
        /// Primary trainer.
        trainer: Arc<dyn Trainer>,
        /// Native compiler.
        compiler: Arc<dyn Compiler>,
    },
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Backends").field(&self.variant()).finish()
    }
}

impl Backends {
    /// Probe `provider` once. A missing trainer is an error; a missing compiler is not.
    pub fn select(provider: &dyn BackendProvider, options: &CompileOptions) -> Option<Self> {
        let trainer = provider.trainer()?;
        Some(match provider.compiler(options) {
            Some(compiler) => Backends::TrainAndCompile { trainer, compiler },
            None => Backends::TrainOnly { trainer },
        })
    }

    /// Variant these backends support.
    pub fn variant(&self) -> Variant {
        match self {
            Backends::TrainOnly { .. } => Variant::TrainOnly,
            Backends::TrainAndCompile { .. } => Variant::TrainAndCompile,
        }
    }
}

/// Built-in boosted-tree trainer.
#[derive(Debug, Clone, Copy, Default)]
pub struct GbdtTrainer;

impl Trainer for GbdtTrainer {
    fn train(
        &self,
        features: &FeatureMatrix,
        labels: &[u8],
        params: &TrainParams,
    ) -> Result<BinaryForest, TrainError> {
        train_binary_forest(features, labels, params)
    }
}

impl Compiler for NativeCompiler {
    fn artifact_extension(&self) -> &str {
        native::native_library_extension()
    }

    fn compile(&self, model: &BinaryForest, dest: &Path) -> Result<(), CompileError> {
        self.compile_to(model, dest)
    }
}

/// Capabilities of this machine: the built-in trainer, plus the native
/// compiler when its toolchain can be launched.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBackends;

impl BackendProvider for SystemBackends {
    fn trainer(&self) -> Option<Arc<dyn Trainer>> {
        Some(Arc::new(GbdtTrainer))
    }

    fn compiler(&self, options: &CompileOptions) -> Option<Arc<dyn Compiler>> {
        NativeCompiler::probe(options.clone()).map(|compiler| Arc::new(compiler) as Arc<dyn Compiler>)
    }
}
