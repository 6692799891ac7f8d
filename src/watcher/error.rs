//! Error types for the watcher subsystem.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from watcher operations.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("Cannot watch path {path}: {reason}")]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("Subscription manager is closed")]
    Closed,
}

impl WatchError {
    pub(crate) fn path(path: &std::path::Path, e: notify::Error) -> Self {
        WatchError::PathWatchFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    }
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}
