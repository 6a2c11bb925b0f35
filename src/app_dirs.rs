//! Per-user directories for calgrid state.
//!
//! Everything lives under one `.calgrid` folder in the OS data directory.
//! `CALGRID_HOME` replaces that base, which is how tests and CI keep their
//! logs out of the real home directory.

use std::{
    path::PathBuf,
    sync::{LazyLock, Mutex},
};

use directories::BaseDirs;
use thiserror::Error;

use crate::fs_ops::{self, FsError};

/// Folder created under the base directory.
pub const APP_DIR_NAME: &str = ".calgrid";
/// Environment variable replacing the base directory.
pub const HOME_ENV_VAR: &str = "CALGRID_HOME";
/// Default grid configuration file name inside the app folder.
pub const DEFAULT_CONFIG_FILE: &str = "grid.toml";

static BASE_OVERRIDE: LazyLock<Mutex<Option<PathBuf>>> = LazyLock::new(|| Mutex::new(None));

#[derive(Debug, Error)]
pub enum AppDirError {
    #[error("No home or data directory could be resolved for calgrid files")]
    NoBaseDir,
    #[error(transparent)]
    Fs(#[from] FsError),
}

/// The `.calgrid` folder, created on first use.
pub fn app_root_dir() -> Result<PathBuf, AppDirError> {
    let root = base_dir().ok_or(AppDirError::NoBaseDir)?.join(APP_DIR_NAME);
    fs_ops::ensure_dir(&root)?;
    Ok(root)
}

/// Folder receiving one log file per run.
pub fn logs_dir() -> Result<PathBuf, AppDirError> {
    let dir = app_root_dir()?.join("logs");
    fs_ops::ensure_dir(&dir)?;
    Ok(dir)
}

/// Where `calgrid-train` looks for its configuration when none is given.
pub fn default_config_path() -> Result<PathBuf, AppDirError> {
    Ok(app_root_dir()?.join(DEFAULT_CONFIG_FILE))
}

fn base_dir() -> Option<PathBuf> {
    if let Some(path) = BASE_OVERRIDE.lock().ok().and_then(|guard| guard.clone()) {
        return Some(path);
    }
    if let Some(path) = std::env::var_os(HOME_ENV_VAR).filter(|value| !value.is_empty()) {
        return Some(PathBuf::from(path));
    }
    BaseDirs::new().map(|dirs| dirs.data_local_dir().to_path_buf())
}

#[cfg(test)]
fn set_base_override(path: Option<PathBuf>) {
    if let Ok(mut guard) = BASE_OVERRIDE.lock() {
        *guard = path;
    }
}
