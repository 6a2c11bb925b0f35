//! Native predictor compilation.
//!
//! A trained [`BinaryForest`] is rendered to C, built with a system toolchain
//! inside a scratch directory, and the finished shared library is moved into
//! place atomically.

mod codegen;
mod toolchain;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fs_ops::{self, FsError};
use crate::ml::gbdt::BinaryForest;

pub use codegen::{CodegenOptions, HEADER_NAME, SourceUnit, generate_sources};
pub use toolchain::{Toolchain, ToolchainKind};

/// Errors raised while compiling a forest into a native library.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The forest failed structural validation.
    #[error("Cannot compile invalid model: {0}")]
    InvalidModel(String),
    /// The scratch build directory could not be prepared.
    #[error("Failed to prepare build directory: {0}")]
    Scratch(std::io::Error),
    /// A generated source file could not be written.
    #[error("Failed to write generated source {path}: {source}")]
    WriteSource {
        /// Source file path.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// The toolchain driver could not be launched.
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        /// Driver program.
        program: String,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// The toolchain ran and reported failure.
    #[error("Toolchain command failed ({status:?}): {command}\n{stderr}")]
    Toolchain {
        /// Rendered command line.
        command: String,
        /// Exit code, when the process exited normally.
        status: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },
    /// The finished library could not be moved into place.
    #[error(transparent)]
    Install(#[from] FsError),
}

/// Options for native compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Toolchain name: `gcc`, `clang`, `msvc`, or a versioned variant.
    pub toolchain: String,
    /// Translation units to spread trees over; `0` disables parallel compilation.
    pub parallel_compile_units: usize,
    /// Compare quantized bin indices instead of raw doubles.
    pub quantize: bool,
    /// Log every toolchain command and its output at info level.
    pub verbose: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            toolchain: "gcc".to_string(),
            parallel_compile_units: 0,
            quantize: true,
            verbose: false,
        }
    }
}

/// Platform file extension for shared libraries (`so`, `dylib`, `dll`).
pub fn native_library_extension() -> &'static str {
    std::env::consts::DLL_EXTENSION
}

/// Compiles forests into native shared libraries with a C toolchain.
#[derive(Debug, Clone)]
pub struct NativeCompiler {
    options: CompileOptions,
    toolchain: Toolchain,
}

impl NativeCompiler {
    /// Build a compiler without checking that the toolchain exists.
    pub fn new(options: CompileOptions) -> Self {
        let toolchain = Toolchain::new(&options.toolchain);
        Self { options, toolchain }
    }

    /// Build a compiler only when its toolchain can be launched.
    pub fn probe(options: CompileOptions) -> Option<Self> {
        let compiler = Self::new(options);
        if compiler.toolchain.is_available() {
            Some(compiler)
        } else {
            tracing::debug!(
                "Toolchain {} unavailable; native compilation disabled",
                compiler.toolchain.program()
            );
            None
        }
    }

    /// Options this compiler was built with.
    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Compile `model` into a shared library written to `dest`.
    pub fn compile_to(&self, model: &BinaryForest, dest: &Path) -> Result<(), CompileError> {
        model.validate().map_err(CompileError::InvalidModel)?;
        let scratch = tempfile::Builder::new()
            .prefix("calgrid-build-")
            .tempdir()
            .map_err(CompileError::Scratch)?;
        let build_dir = scratch.path();

        let units = generate_sources(
            model,
            CodegenOptions {
                quantize: self.options.quantize,
                parallel_units: self.options.parallel_compile_units,
            },
        );
        let mut objects = Vec::new();
        for unit in &units {
            let path = build_dir.join(&unit.file_name);
            std::fs::write(&path, &unit.contents)
                .map_err(|source| CompileError::WriteSource {
                    path: path.clone(),
                    source,
                })?;
            if unit.compile {
                objects.push((path.clone(), path.with_extension(self.toolchain.object_extension())));
            }
        }
        if self.options.verbose {
            tracing::info!(
                "Generated {} translation unit(s) for {} tree(s)",
                objects.len(),
                model.trees.len()
            );
        }

        for (source, object) in &objects {
            self.toolchain
                .compile_object(source, object, self.options.verbose)?;
        }
        let library = build_dir.join(format!("predictor.{}", native_library_extension()));
        let object_paths: Vec<PathBuf> = objects.into_iter().map(|(_, object)| object).collect();
        self.toolchain
            .link_shared(&object_paths, &library, self.options.verbose)?;

        fs_ops::atomic_copy(&library, dest)?;
        Ok(())
    }
}
