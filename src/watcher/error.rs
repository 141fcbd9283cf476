//! Watcher error types.

use std::path::{Path, PathBuf};

/// Errors that can occur while watching and reading tracked files.
#[derive(thiserror::Error, Debug)]
pub enum WatcherError {
    /// Tracked file does not exist.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Permission denied accessing file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The parent directory of a tracked file cannot be resolved.
    #[error("Cannot resolve directory of {path}: {source}")]
    UnresolvableDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Notify watcher error.
    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WatcherError {
    /// Classify an I/O error raised while opening or inspecting `path`.
    pub(crate) fn from_io(path: &Path, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::FileNotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io(err),
        }
    }

    /// Whether the error only means the file is currently absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::FileNotFound(_))
    }
}
