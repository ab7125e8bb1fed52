use std::path::Path;

use super::RegistryError;
use crate::metadata::DeclarationMetadata;

/// Where the registry reads materialized declaration metadata from.
pub trait MetadataSource: Send + Sync {
    /// Declarations of a workspace-relative source path. Empty when the
    /// file has none or was never compiled.
    fn declarations(&self, source: &Path) -> Result<Vec<DeclarationMetadata>, RegistryError>;
}
