//! Errors raised while loading the workspace description and manifest.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal configuration problems. Raised before any build starts.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Cannot read workspace description {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid workspace description {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },

    #[error("Module id '{id}' is declared more than once")]
    DuplicateModule { id: String },

    #[error("Main module '{id}' is not declared")]
    UnknownMain { id: String },

    #[error("Module '{module}' depends on unknown module '{dependency}'")]
    UnresolvedDependency { module: String, dependency: String },

    #[error("Dependency cycle between modules: {}", .modules.join(", "))]
    DependencyCycle { modules: Vec<String> },

    #[error("Source root of module '{module}' does not exist: {path}")]
    MissingSourceRoot { module: String, path: PathBuf },

    #[error("Cannot scan source root of module '{module}' at {path}: {reason}")]
    UnreadableSourceRoot {
        module: String,
        path: PathBuf,
        reason: String,
    },
}
