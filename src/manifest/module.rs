//! Modules, their tracked files and file kinds.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use crate::hash::{ContentHash, Fingerprint};

/// Classification of a tracked file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// Ambient type declarations (`*.d.ts`).
    Declaration,
    /// TypeScript sources.
    Source,
    /// JavaScript sources.
    Script,
    /// Structured data files.
    Data,
    /// Test fixtures, copied as-is.
    Fixture,
    Unknown,
}

impl FileKind {
    /// Classify a path by name. Fixture placement wins over extension.
    pub fn classify(path: &Path) -> Self {
        let in_fixtures = path
            .components()
            .any(|c| matches!(c, Component::Normal(s) if s == OsStr::new("fixtures")));
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();

        if in_fixtures || file_name.contains(".fixture.") {
            return Self::Fixture;
        }
        if file_name.ends_with(".d.ts")
            || file_name.ends_with(".d.mts")
            || file_name.ends_with(".d.cts")
        {
            return Self::Declaration;
        }

        match path.extension().and_then(|e| e.to_str()) {
            Some("ts" | "tsx" | "mts" | "cts") => Self::Source,
            Some("js" | "jsx" | "mjs" | "cjs") => Self::Script,
            Some("json" | "yaml" | "yml" | "toml") => Self::Data,
            _ => Self::Unknown,
        }
    }

    /// Runs through the transformation pipeline.
    pub fn is_transformable(self) -> bool {
        matches!(self, Self::Source | Self::Script)
    }

    /// Produces an output file (transformed or copied).
    pub fn is_emitted(self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// One tracked file. `path` is relative to the module's source root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleFile {
    pub path: PathBuf,
    pub kind: FileKind,
    pub content_hash: ContentHash,
    pub fingerprint: Fingerprint,
}

/// A unit of the workspace with its own source and output roots.
///
/// Roots are workspace-relative unless configured as absolute paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub id: String,
    pub name: String,
    pub source_root: PathBuf,
    pub output_root: PathBuf,
    pub profiles: BTreeSet<String>,
    /// Ids of modules this one depends on, sorted.
    pub dependencies: Vec<String>,
    /// Tracked files, sorted by path.
    pub files: Vec<ModuleFile>,
    pub is_main: bool,
}

impl Module {
    /// Look up a file by its source-root-relative path.
    pub fn file(&self, path: &Path) -> Option<&ModuleFile> {
        self.files
            .binary_search_by(|f| f.path.as_path().cmp(path))
            .ok()
            .map(|idx| &self.files[idx])
    }

    /// Workspace-relative path of a file in this module.
    pub fn workspace_path(&self, file: &Path) -> PathBuf {
        self.source_root.join(file)
    }

    /// Source-root-relative path for a workspace-relative path, if it lies
    /// under this module's source root.
    pub fn relative_path(&self, workspace_path: &Path) -> Option<PathBuf> {
        workspace_path
            .strip_prefix(&self.source_root)
            .ok()
            .map(Path::to_path_buf)
    }

    /// Output location of a file, relative to the workspace root.
    pub fn output_path(&self, file: &Path) -> PathBuf {
        self.output_root.join(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_by_extension() {
        assert_eq!(FileKind::classify(Path::new("a/user.ts")), FileKind::Source);
        assert_eq!(FileKind::classify(Path::new("a/view.tsx")), FileKind::Source);
        assert_eq!(FileKind::classify(Path::new("a/types.d.ts")), FileKind::Declaration);
        assert_eq!(FileKind::classify(Path::new("a/legacy.cjs")), FileKind::Script);
        assert_eq!(FileKind::classify(Path::new("a/config.yaml")), FileKind::Data);
        assert_eq!(FileKind::classify(Path::new("a/README.md")), FileKind::Unknown);
    }

    #[test]
    fn fixtures_take_precedence() {
        assert_eq!(
            FileKind::classify(Path::new("test/fixtures/user.ts")),
            FileKind::Fixture
        );
        assert_eq!(
            FileKind::classify(Path::new("test/user.fixture.json")),
            FileKind::Fixture
        );
    }

    #[test]
    fn only_sources_and_scripts_are_transformed() {
        assert!(FileKind::Source.is_transformable());
        assert!(FileKind::Script.is_transformable());
        assert!(!FileKind::Declaration.is_transformable());
        assert!(FileKind::Declaration.is_emitted());
        assert!(!FileKind::Unknown.is_emitted());
    }
}
