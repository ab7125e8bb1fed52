//! Declaration identity and metadata.
//!
//! [`DeclarationMetadata`] is computed inside the transformation pipeline,
//! injected into the compiled output and written to a sidecar next to it.
//! The registry reads it back from the sidecar rather than re-parsing.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::hash::ContentHash;

/// Declarations whose name ends with this marker are flagged synthetic.
pub const SYNTHETIC_SUFFIX: &str = "$Synthetic";

/// Stable identifier: `<module id>:<workspace-relative path>#<local name>`.
///
/// The local name is the class name, prefixed with the enclosing function
/// or method scopes for nested classes (`make.Row`) and suffixed with an
/// ordinal when the same name repeats in one scope (`Row~2`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeclarationId(String);

impl DeclarationId {
    pub fn new(module_id: &str, path: &Path, name: &str) -> Self {
        let path = path.to_string_lossy().replace('\\', "/");
        Self(format!("{module_id}:{path}#{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Local name (the part after `#`).
    pub fn name(&self) -> &str {
        self.0.rsplit_once('#').map(|(_, n)| n).unwrap_or(&self.0)
    }

    /// Module id (the part before the first `:`).
    pub fn module_id(&self) -> &str {
        self.0.split_once(':').map(|(m, _)| m).unwrap_or("")
    }
}

impl fmt::Display for DeclarationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeclarationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identity data for one class-like declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclarationMetadata {
    pub declaration_id: DeclarationId,
    pub name: String,
    /// Workspace-relative source path.
    pub origin_file: PathBuf,
    pub class_hash: ContentHash,
    pub method_hashes: BTreeMap<String, ContentHash>,
    /// Field hashes, keyed by field name.
    #[serde(default)]
    pub member_hashes: BTreeMap<String, ContentHash>,
    /// Type names referenced by field type annotations.
    #[serde(default)]
    pub embeds: Vec<String>,
    pub is_abstract: bool,
    pub is_synthetic: bool,
}

impl DeclarationMetadata {
    /// Hash of a method or field, whichever exists.
    pub fn member_hash(&self, member: &str) -> Option<ContentHash> {
        self.method_hashes
            .get(member)
            .or_else(|| self.member_hashes.get(member))
            .copied()
    }

    /// Members whose hash differs from `previous`, including members that
    /// were added or disappeared.
    pub fn changed_members(&self, previous: &DeclarationMetadata) -> BTreeSet<String> {
        let names: BTreeSet<&String> = self
            .method_hashes
            .keys()
            .chain(self.member_hashes.keys())
            .chain(previous.method_hashes.keys())
            .chain(previous.member_hashes.keys())
            .collect();

        names
            .into_iter()
            .filter(|name| self.member_hash(name) != previous.member_hash(name))
            .cloned()
            .collect()
    }
}

/// Sidecar written next to each compiled output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataSidecar {
    pub module: String,
    /// Workspace-relative source path.
    pub origin: PathBuf,
    pub declarations: Vec<DeclarationMetadata>,
}

/// `true` if `name` carries the synthetic marker.
pub fn is_synthetic_name(name: &str) -> bool {
    name.ends_with(SYNTHETIC_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_text;

    fn meta(methods: &[(&str, &str)]) -> DeclarationMetadata {
        DeclarationMetadata {
            declaration_id: DeclarationId::new("core", Path::new("src/a.ts"), "A"),
            name: "A".to_string(),
            origin_file: PathBuf::from("src/a.ts"),
            class_hash: hash_text("class A"),
            method_hashes: methods
                .iter()
                .map(|(n, body)| (n.to_string(), hash_text(body)))
                .collect(),
            member_hashes: BTreeMap::new(),
            embeds: Vec::new(),
            is_abstract: false,
            is_synthetic: false,
        }
    }

    #[test]
    fn declaration_id_parts() {
        let id = DeclarationId::new("core", Path::new("models/user.ts"), "User");
        assert_eq!(id.as_str(), "core:models/user.ts#User");
        assert_eq!(id.name(), "User");
        assert_eq!(id.module_id(), "core");
    }

    #[test]
    fn changed_members_reports_edits_and_removals() {
        let before = meta(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let after = meta(&[("a", "1"), ("b", "22"), ("d", "4")]);
        let changed = after.changed_members(&before);
        let expected: BTreeSet<String> =
            ["b", "c", "d"].iter().map(|s| s.to_string()).collect();
        assert_eq!(changed, expected);
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_string(&meta(&[])).unwrap();
        assert!(json.contains("\"declarationId\""));
        assert!(json.contains("\"classHash\""));
        assert!(json.contains("\"isSynthetic\""));
    }

    #[test]
    fn synthetic_marker() {
        assert!(is_synthetic_name("User$Synthetic"));
        assert!(!is_synthetic_name("Synthetic"));
    }
}
