//! Transformation errors.

use std::path::PathBuf;
use thiserror::Error;

/// Error returned by a hook.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for hook methods.
pub type HookResult<T> = Result<T, HookError>;

/// A failed transformation of one file. Never affects other files.
#[derive(Error, Debug)]
#[error("{}: hook '{hook}' failed: {cause}", .file.display())]
pub struct TransformError {
    /// Workspace-relative source path.
    pub file: PathBuf,
    pub hook: String,
    #[source]
    pub cause: HookError,
}

impl TransformError {
    pub fn new(file: impl Into<PathBuf>, hook: impl Into<String>, cause: impl Into<HookError>) -> Self {
        Self {
            file: file.into(),
            hook: hook.into(),
            cause: cause.into(),
        }
    }
}
