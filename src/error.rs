//! Top-level error type.
//!
//! Each subsystem owns its own error enum; this type only aggregates them
//! for callers that drive several subsystems at once.

use thiserror::Error;

use crate::compiler::CompileError;
use crate::manifest::ConfigurationError;
use crate::pipeline::TransformError;
use crate::registry::RegistryError;
use crate::watcher::WatchError;

#[derive(Error, Debug)]
pub enum HotwireError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Invalid settings: {0}")]
    Settings(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HotwireError {
    /// Suggested recovery for the user, if there is one.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Configuration(_) => Some("Check hotwire.toml for typos and missing modules"),
            Self::Settings(_) => Some("Run 'hotwire init --force' to regenerate settings"),
            Self::Compile(CompileError::UnknownModule { .. }) => {
                Some("Run 'hotwire manifest' to list known modules")
            }
            _ => None,
        }
    }
}

pub type HotwireResult<T> = Result<T, HotwireError>;
