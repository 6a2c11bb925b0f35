use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use super::CompileError;

/// Command-line dialect of a C toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolchainKind {
    /// gcc, clang and their versioned variants (`gcc-12`, `clang-17`).
    GccLike,
    /// Microsoft `cl.exe`.
    Msvc,
}

/// A C compiler driver resolved from a toolchain name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    program: String,
    kind: ToolchainKind,
}

impl Toolchain {
    /// Resolve a toolchain name such as `gcc`, `clang-17` or `msvc`.
    pub fn new(name: &str) -> Self {
        if name.eq_ignore_ascii_case("msvc") || name.eq_ignore_ascii_case("cl") {
            Self {
                program: "cl".to_string(),
                kind: ToolchainKind::Msvc,
            }
        } else {
            Self {
                program: name.to_string(),
                kind: ToolchainKind::GccLike,
            }
        }
    }

    /// Driver program name.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Command-line dialect.
    pub fn kind(&self) -> ToolchainKind {
        self.kind
    }

    /// Object file extension produced by this toolchain.
    pub fn object_extension(&self) -> &'static str {
        match self.kind {
            ToolchainKind::GccLike => "o",
            ToolchainKind::Msvc => "obj",
        }
    }

    /// Whether the driver can be launched on this machine.
    pub fn is_available(&self) -> bool {
        let mut cmd = Command::new(&self.program);
        if self.kind == ToolchainKind::GccLike {
            cmd.arg("--version");
        }
        let status = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match (self.kind, status) {
            (ToolchainKind::GccLike, Ok(status)) => status.success(),
            // `cl` with no inputs exits non-zero but proves the driver exists.
            (ToolchainKind::Msvc, Ok(_)) => true,
            (_, Err(_)) => false,
        }
    }

    /// Compile one C source file into an object file.
    pub fn compile_object(
        &self,
        source: &Path,
        object: &Path,
        verbose: bool,
    ) -> Result<(), CompileError> {
        let mut cmd = Command::new(&self.program);
        match self.kind {
            ToolchainKind::GccLike => {
                cmd.args(["-c", "-O2", "-fPIC", "-std=c99", "-o"])
                    .arg(object)
                    .arg(source);
            }
            ToolchainKind::Msvc => {
                cmd.args(["/nologo", "/c", "/O2"])
                    .arg(prefixed_arg("/Fo", object))
                    .arg(source);
            }
        }
        run(cmd, verbose)
    }

    /// Link object files into a shared library at `output`.
    pub fn link_shared(
        &self,
        objects: &[PathBuf],
        output: &Path,
        verbose: bool,
    ) -> Result<(), CompileError> {
        let mut cmd = Command::new(&self.program);
        match self.kind {
            ToolchainKind::GccLike => {
                let shared_flag = if cfg!(target_os = "macos") {
                    "-dynamiclib"
                } else {
                    "-shared"
                };
                cmd.arg(shared_flag).arg("-o").arg(output).args(objects).arg("-lm");
            }
            ToolchainKind::Msvc => {
                cmd.args(["/nologo", "/LD"])
                    .arg(prefixed_arg("/Fe", output))
                    .args(objects);
            }
        }
        run(cmd, verbose)
    }
}

fn prefixed_arg(flag: &str, path: &Path) -> std::ffi::OsString {
    let mut arg = std::ffi::OsString::from(flag);
    arg.push(path.as_os_str());
    arg
}

fn run(mut cmd: Command, verbose: bool) -> Result<(), CompileError> {
    let command_line = format!("{cmd:?}");
    if verbose {
        tracing::info!("Running {command_line}");
    } else {
        tracing::debug!("Running {command_line}");
    }
    let output = cmd
        .stdin(Stdio::null())
        .output()
        .map_err(|source| CompileError::Spawn {
            program: cmd.get_program().to_string_lossy().into_owned(),
            source,
        })?;
    if verbose {
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            tracing::info!("{line}");
        }
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            tracing::info!("{line}");
        }
    }
    if !output.status.success() {
        return Err(CompileError::Toolchain {
            command: command_line,
            status: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msvc_name_maps_to_cl() {
        let tc = Toolchain::new("MSVC");
        assert_eq!(tc.program(), "cl");
        assert_eq!(tc.kind(), ToolchainKind::Msvc);
        assert_eq!(tc.object_extension(), "obj");
    }

    #[test]
    fn versioned_gcc_is_gcc_like() {
        let tc = Toolchain::new("gcc-12");
        assert_eq!(tc.program(), "gcc-12");
        assert_eq!(tc.kind(), ToolchainKind::GccLike);
    }

    #[test]
    fn missing_driver_is_unavailable() {
        let tc = Toolchain::new("calgrid-no-such-compiler");
        assert!(!tc.is_available());
    }

    #[test]
    fn spawn_failure_is_reported() {
        let tc = Toolchain::new("calgrid-no-such-compiler");
        let err = tc
            .compile_object(Path::new("a.c"), Path::new("a.o"), false)
            .unwrap_err();
        assert!(matches!(err, CompileError::Spawn { .. }));
    }
}
