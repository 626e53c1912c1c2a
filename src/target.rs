/// Target file acquisition: open with synchronous writes and optionally take an
/// exclusive advisory lock for the lifetime of the handle.
use crate::report::os_error_detail;
use nix::fcntl::OFlag;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

/// Errors that can occur while acquiring the target file.
#[derive(Debug)]
pub enum TargetError {
    /// Failed to create, open or truncate the file.
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to place the exclusive lock.
    Lock {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for TargetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetError::Open { path, source } => {
                write!(
                    f,
                    "Unable to open {} : open() returned {}",
                    path.display(),
                    os_error_detail(source)
                )
            }
            TargetError::Lock { path, source } => {
                write!(
                    f,
                    "Unable to place lock on {} : flock() returned {}",
                    path.display(),
                    os_error_detail(source)
                )
            }
        }
    }
}

impl std::error::Error for TargetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TargetError::Open { source, .. } => Some(source),
            TargetError::Lock { source, .. } => Some(source),
        }
    }
}

/// Open `path` write-only, creating or truncating it, with `O_SYNC` so each
/// write reaches storage before returning.
pub fn open_target(path: &Path) -> Result<File, TargetError> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o666)
        .custom_flags(OFlag::O_SYNC.bits())
        .open(path)
        .map_err(|e| TargetError::Open {
            path: path.to_path_buf(),
            source: e,
        })?;

    tracing::debug!(path = %path.display(), "opened target file");
    Ok(file)
}

/// Block until an exclusive `flock` is held on `file`.
///
/// The lock is released when the file is closed.
pub fn lock_exclusive(file: &File, path: &Path) -> Result<(), TargetError> {
    tracing::debug!(path = %path.display(), "waiting for exclusive lock");
    fs2::FileExt::lock_exclusive(file).map_err(|e| TargetError::Lock {
        path: path.to_path_buf(),
        source: e,
    })?;
    tracing::info!(path = %path.display(), "exclusive lock acquired");
    Ok(())
}

/// Open the target and, if requested, lock it.
pub fn acquire(path: &Path, exclusive_lock: bool) -> Result<File, TargetError> {
    let file = open_target(path)?;
    if exclusive_lock {
        lock_exclusive(&file, path)?;
    }
    Ok(file)
}
