//! Compiler errors.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::pipeline::TransformError;

#[derive(Error, Debug)]
pub enum CompileError {
    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize {what}: {reason}")]
    Serialization { what: String, reason: String },

    #[error("Unknown module '{id}'")]
    UnknownModule { id: String },

    #[error("Failed to start compile workers: {reason}")]
    WorkerPool { reason: String },
}

impl CompileError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Source or output file the error is about, if any.
    pub fn file(&self) -> Option<&Path> {
        match self {
            Self::Transform(e) => Some(&e.file),
            Self::Io { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Hook that failed, for transform errors.
    pub fn hook(&self) -> Option<&str> {
        match self {
            Self::Transform(e) => Some(&e.hook),
            _ => None,
        }
    }
}
