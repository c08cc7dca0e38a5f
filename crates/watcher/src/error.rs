//! Error taxonomy for the watcher
//!
//! Listing failures (`NotFound`, `Io`, `WatchedFileDeleted`) found while a
//! cycle runs are posted to the error channel. Everything else is returned
//! synchronously from the call that caused it.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Watcher errors
#[derive(Debug, Error)]
pub enum WatchError {
    /// Path does not exist
    #[error("path not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Enumeration failed for a reason other than a missing path
    #[error("failed to list {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A watched root vanished; it has been dropped from the watch set
    #[error("watched file or folder deleted: {}", .0.display())]
    WatchedFileDeleted(PathBuf),

    /// `start` called with no roots registered
    #[error("no files or folders added to the watcher")]
    NothingAdded,

    /// `start` called while the polling loop is running
    #[error("watcher is already running")]
    AlreadyRunning,

    /// Poll interval below the minimum
    #[error("poll interval {interval:?} is shorter than the minimum {minimum:?}")]
    IntervalTooShort { interval: Duration, minimum: Duration },

    /// Operation requires a running watcher
    #[error("watcher is not running")]
    NotRunning,

    /// The watcher has been closed and cannot be restarted
    #[error("watcher is closed")]
    Closed,

    /// A filter pattern failed to compile
    #[error("invalid filter pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

impl WatchError {
    /// Classify an I/O error for `path`
    pub(crate) fn from_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            WatchError::NotFound(path)
        } else {
            WatchError::Io { path, source }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, WatchError::NotFound(_))
    }
}

/// Result alias for watcher operations
pub type Result<T> = std::result::Result<T, WatchError>;
