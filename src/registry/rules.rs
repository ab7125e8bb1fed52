use crate::metadata::DeclarationMetadata;

/// One outgoing dependency of a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DependencyTarget {
    /// Declaration name, or a full declaration id.
    pub declaration: String,
    /// Restrict the edge to one member of the target.
    pub member: Option<String>,
}

impl DependencyTarget {
    pub fn whole(declaration: impl Into<String>) -> Self {
        Self {
            declaration: declaration.into(),
            member: None,
        }
    }

    pub fn member(declaration: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            declaration: declaration.into(),
            member: Some(member.into()),
        }
    }
}

/// Derives dependency edges from a declaration's metadata.
pub trait DependencyRule: Send + Sync {
    fn name(&self) -> &str;

    fn dependencies(&self, metadata: &DeclarationMetadata) -> Vec<DependencyTarget>;
}

/// A declaration depends on every type its fields embed.
#[derive(Debug, Default)]
pub struct EmbeddedTypes;

impl DependencyRule for EmbeddedTypes {
    fn name(&self) -> &str {
        "embedded-types"
    }

    fn dependencies(&self, metadata: &DeclarationMetadata) -> Vec<DependencyTarget> {
        metadata
            .embeds
            .iter()
            .map(|name| DependencyTarget::whole(name.clone()))
            .collect()
    }
}
