//! Error types for the watch manager.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from watcher operations.
///
/// A root that fails to watch is logged and skipped; only failing to
/// create the OS watcher at all is fatal to `start`.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("Cannot watch path {path}: {reason}")]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("File system event error: {details}")]
    EventError { details: String },

    #[error("Watcher is already running")]
    AlreadyStarted,

    #[error("Channel closed unexpectedly")]
    ChannelClosed,
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}
