//! Filesystem helpers shared by every artifact writer.
//!
//! Artifacts are written to a sibling temporary file and renamed into place so
//! a crash never leaves a truncated model where a downstream reader expects a
//! complete one. Reruns replace the previous file at the same path.

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use rand::TryRngCore;
use thiserror::Error;

/// Errors raised while creating directories or persisting files.
#[derive(Debug, Error)]
pub enum FsError {
    /// Failed to create a directory.
    #[error("Unable to create directory {path}: {source}")]
    CreateDir {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to write or replace a file.
    #[error("Failed to write {path}: {source}")]
    Write {
        /// Path being written.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
}

impl FsError {
    /// Path the failed operation was targeting.
    pub fn path(&self) -> &Path {
        match self {
            FsError::CreateDir { path, .. } | FsError::Write { path, .. } => path,
        }
    }
}

/// Create `path` and its parents; succeeds if it already exists.
pub fn ensure_dir(path: &Path) -> Result<(), FsError> {
    std::fs::create_dir_all(path).map_err(|source| FsError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

/// Write `data` to `path` through a temporary sibling file and an atomic rename.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), FsError> {
    let (dir, tmp_path, mut file) = create_temp_sibling(path)?;
    if let Err(err) = file.write_all(data).and_then(|_| file.sync_all()) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(FsError::Write {
            path: tmp_path,
            source: err,
        });
    }
    drop(file);
    finish_replace(&tmp_path, path, dir)
}

/// Copy `src` over `dest` atomically, even across filesystems.
pub fn atomic_copy(src: &Path, dest: &Path) -> Result<(), FsError> {
    let (dir, tmp_path, file) = create_temp_sibling(dest)?;
    drop(file);
    if let Err(err) = std::fs::copy(src, &tmp_path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(FsError::Write {
            path: dest.to_path_buf(),
            source: err,
        });
    }
    finish_replace(&tmp_path, dest, dir)
}

fn create_temp_sibling(path: &Path) -> Result<(&Path, PathBuf, std::fs::File), FsError> {
    let dir = path.parent().ok_or_else(|| FsError::Write {
        path: path.to_path_buf(),
        source: std::io::Error::other("path has no parent directory"),
    })?;
    let file_name = path.file_name().ok_or_else(|| FsError::Write {
        path: path.to_path_buf(),
        source: std::io::Error::other("path has no file name"),
    })?;

    let mut last_err = None;
    for _ in 0..5 {
        let mut bytes = [0u8; 6];
        rand::rngs::OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|source| FsError::Write {
                path: path.to_path_buf(),
                source: std::io::Error::other(format!(
                    "failed to generate temporary file suffix: {source}"
                )),
            })?;
        let suffix: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        let tmp_path = dir.join(format!("{}.tmp-{}", file_name.to_string_lossy(), suffix));
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
        {
            Ok(file) => return Ok((dir, tmp_path, file)),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                last_err = Some(err);
            }
            Err(err) => {
                return Err(FsError::Write {
                    path: tmp_path,
                    source: err,
                });
            }
        }
    }

    Err(FsError::Write {
        path: path.to_path_buf(),
        source: std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!(
                "failed to create temporary file: {}",
                last_err
                    .map(|err| err.to_string())
                    .unwrap_or_else(|| "unknown error".into())
            ),
        ),
    })
}

fn finish_replace(tmp_path: &Path, path: &Path, dir: &Path) -> Result<(), FsError> {
    if let Err(err) = replace_file(tmp_path, path) {
        let _ = std::fs::remove_file(tmp_path);
        return Err(FsError::Write {
            path: path.to_path_buf(),
            source: err,
        });
    }
    sync_parent_dir(dir)
}

fn replace_file(temp_path: &Path, path: &Path) -> Result<(), std::io::Error> {
    match std::fs::rename(temp_path, path) {
        Ok(()) => Ok(()),
        Err(err) => {
            #[cfg(target_os = "windows")]
            if err.kind() == std::io::ErrorKind::AlreadyExists
                || err.kind() == std::io::ErrorKind::PermissionDenied
            {
                if let Err(inner) = std::fs::remove_file(path) {
                    if inner.kind() != std::io::ErrorKind::NotFound {
                        return Err(inner);
                    }
                }
                std::fs::rename(temp_path, path)?;
                return Ok(());
            }
            Err(err)
        }
    }
}

fn sync_parent_dir(dir: &Path) -> Result<(), FsError> {
    #[cfg(unix)]
    {
        let dir_handle = std::fs::File::open(dir).map_err(|source| FsError::Write {
            path: dir.to_path_buf(),
            source,
        })?;
        dir_handle.sync_all().map_err(|source| FsError::Write {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn atomic_write_replaces_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.txt");
        atomic_write(&path, b"first").unwrap();
        atomic_write(&path, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn atomic_copy_copies_contents() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.bin");
        let dest = dir.path().join("dest.bin");
        std::fs::write(&src, [1u8, 2, 3]).unwrap();
        atomic_copy(&src, &dest).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), vec![1u8, 2, 3]);
    }

    #[test]
    fn ensure_dir_is_idempotent() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_dir(&nested).unwrap();
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn write_into_missing_directory_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("model.txt");
        let err = atomic_write(&path, b"x").unwrap_err();
        assert!(matches!(err, FsError::Write { .. }));
    }
}
