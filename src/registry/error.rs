//! Registry errors.

use std::path::PathBuf;
use thiserror::Error;

use crate::metadata::DeclarationId;

/// Error returned by a listener callback.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Cannot read declaration metadata at {path}: {reason}")]
    Metadata { path: PathBuf, reason: String },

    #[error("Unknown declaration '{id}'")]
    UnknownDeclaration { id: DeclarationId },

    #[error("Registry event channel closed")]
    ChannelClosed,
}

/// A listener failed while being notified about one declaration.
/// Other listeners and dependents are still notified.
#[derive(Error, Debug)]
#[error("Listener '{listener}' failed for {declaration}: {cause}")]
pub struct PropagationError {
    pub listener: String,
    pub declaration: DeclarationId,
    #[source]
    pub cause: ListenerError,
}
