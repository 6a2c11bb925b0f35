//! Compile one saved primary model outside of a grid run.

use std::path::{Path, PathBuf};

use crate::grid::{GridError, naming};
use crate::ml::gbdt::{BinaryForest, ModelIoError};
use crate::native::{CompileOptions, NativeCompiler, native_library_extension};

/// Inputs of a single compile-only invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileRequest {
    /// Existing primary model file (`.txt`).
    pub model_path: PathBuf,
    /// Existing directory that receives the native library.
    pub output_dir: PathBuf,
    /// Toolchain and code generation settings.
    pub options: CompileOptions,
}

impl CompileRequest {
    /// Reject bad paths before any work starts.
    pub fn validate(&self) -> Result<(), GridError> {
        if !self.model_path.is_file() {
            return Err(GridError::Validation(format!(
                "model file does not exist: {}",
                self.model_path.display()
            )));
        }
        let has_model_extension = self
            .model_path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(naming::PRIMARY_MODEL_EXTENSION));
        if !has_model_extension {
            return Err(GridError::Validation(format!(
                "model file must have a .{} extension: {}",
                naming::PRIMARY_MODEL_EXTENSION,
                self.model_path.display()
            )));
        }
        if !self.output_dir.is_dir() {
            return Err(GridError::Validation(format!(
                "output path is not a directory: {}",
                self.output_dir.display()
            )));
        }
        Ok(())
    }

    /// `<output_dir>/<model stem>.<native extension>`.
    pub fn destination(&self) -> PathBuf {
        let stem = self
            .model_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.output_dir
            .join(format!("{stem}.{}", native_library_extension()))
    }
}

/// Validate, probe the toolchain, load the model and compile it.
///
/// Returns the path of the written library.
pub fn compile_model_file(request: &CompileRequest) -> Result<PathBuf, GridError> {
    request.validate()?;
    let compiler = NativeCompiler::probe(request.options.clone()).ok_or_else(|| {
        GridError::Configuration(format!(
            "toolchain {:?} is not available",
            request.options.toolchain
        ))
    })?;
    let model = load_model(&request.model_path)?;
    let dest = request.destination();
    tracing::info!(
        "Compiling {} ({} tree(s)) to {}",
        request.model_path.display(),
        model.trees.len(),
        dest.display()
    );
    compiler
        .compile_to(&model, &dest)
        .map_err(|source| GridError::Compilation {
            cell: stem_of(&request.model_path),
            source,
        })?;
    Ok(dest)
}

fn load_model(path: &Path) -> Result<BinaryForest, GridError> {
    BinaryForest::load_text(path).map_err(|err| match err {
        ModelIoError::Read { path, source } => GridError::Io { path, source },
        other => GridError::Validation(format!("{}: {other}", path.display())),
    })
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn request(model_path: PathBuf, output_dir: PathBuf) -> CompileRequest {
        CompileRequest {
            model_path,
            output_dir,
            options: CompileOptions::default(),
        }
    }

    #[test]
    fn missing_model_is_rejected() {
        let dir = tempdir().unwrap();
        let req = request(dir.path().join("absent.txt"), dir.path().to_path_buf());
        assert!(matches!(req.validate(), Err(GridError::Validation(_))));
    }

    #[test]
    fn wrong_extension_is_rejected() {
        let dir = tempdir().unwrap();
        let model = dir.path().join("model.json");
        std::fs::write(&model, "{}").unwrap();
        let req = request(model, dir.path().to_path_buf());
        let err = req.validate().unwrap_err();
        assert!(matches!(err, GridError::Validation(msg) if msg.contains(".txt")));
    }

    #[test]
    fn extension_check_ignores_case() {
        let dir = tempdir().unwrap();
        let model = dir.path().join("024H_0.1000.TXT");
        std::fs::write(&model, "{}").unwrap();
        let req = request(model, dir.path().to_path_buf());
        assert!(req.validate().is_ok());
        assert_eq!(
            req.destination(),
            dir.path()
                .join(format!("024H_0.1000.{}", native_library_extension()))
        );
    }

    #[test]
    fn output_must_be_a_directory() {
        let dir = tempdir().unwrap();
        let model = dir.path().join("024H_0.1000.txt");
        std::fs::write(&model, "{}").unwrap();
        let req = request(model.clone(), model);
        assert!(matches!(req.validate(), Err(GridError::Validation(_))));
    }

    #[test]
    fn destination_keeps_model_stem() {
        let req = request(
            PathBuf::from("models/024H_0.1000.txt"),
            PathBuf::from("out"),
        );
        assert_eq!(
            req.destination(),
            Path::new("out").join(format!("024H_0.1000.{}", native_library_extension()))
        );
    }

    #[test]
    fn missing_toolchain_is_a_configuration_error() {
        let dir = tempdir().unwrap();
        let model = dir.path().join("012H_0.5000.txt");
        std::fs::write(&model, "not a model").unwrap();
        let mut req = request(model, dir.path().to_path_buf());
        req.options.toolchain = "calgrid-no-such-cc".into();
        assert!(matches!(
            compile_model_file(&req),
            Err(GridError::Configuration(_))
        ));
    }
}
