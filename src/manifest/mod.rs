//! Module graph and file manifest.
//!
//! The [`Manifest`] is the single source of truth for what should exist:
//! every module, its roots, its tracked files with their hashes, and the
//! dependency edges between modules. It is loaded from `hotwire.toml` plus a
//! scan of each source root, persisted after every successful build, and
//! compared snapshot-to-snapshot with [`Manifest::diff`].

mod error;
mod graph;
mod module;
mod scan;
mod workspace;

pub use error::ConfigurationError;
pub use graph::ModuleGraph;
pub use module::{FileKind, Module, ModuleFile};
pub use scan::{SourceWalker, scan_file};
pub use workspace::{ModuleDescription, WorkspaceDescription};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::Settings;
use crate::delta::{DeltaEvent, DeltaKind, write_atomic};

/// Name of the persisted manifest inside the build location.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Scan options taken from [`Settings`].
#[derive(Debug, Clone, Default)]
pub struct ManifestOptions {
    pub ignore_patterns: Vec<String>,
    /// Replaces every module's output root with `<output_dir>/<module id>`.
    pub output_dir: Option<PathBuf>,
}

impl From<&Settings> for ManifestOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            ignore_patterns: settings.build.ignore_patterns.clone(),
            output_dir: settings.build.output_dir.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Unix seconds when this snapshot was taken.
    pub generated: u64,
    pub build_location: PathBuf,
    pub main_module: String,
    pub modules: BTreeMap<String, Module>,
    #[serde(skip)]
    root: PathBuf,
    #[serde(skip)]
    graph: ModuleGraph,
}

impl Manifest {
    /// Load the workspace at `root` with default scan options.
    pub fn load(root: &Path) -> Result<Self, ConfigurationError> {
        Self::load_with(root, &ManifestOptions::from(&Settings::default()))
    }

    pub fn load_with(root: &Path, options: &ManifestOptions) -> Result<Self, ConfigurationError> {
        Self::scan(root, options, None)
    }

    /// Reload, reusing `previous` hashes for files whose fingerprint is unchanged.
    pub fn refresh(
        root: &Path,
        previous: &Manifest,
        options: &ManifestOptions,
    ) -> Result<Self, ConfigurationError> {
        Self::scan(root, options, Some(previous))
    }

    fn scan(
        root: &Path,
        options: &ManifestOptions,
        previous: Option<&Manifest>,
    ) -> Result<Self, ConfigurationError> {
        let description = WorkspaceDescription::read(root)?;

        let mut seen = BTreeSet::new();
        for module in &description.modules {
            if !seen.insert(module.id.as_str()) {
                return Err(ConfigurationError::DuplicateModule {
                    id: module.id.clone(),
                });
            }
        }
        if !seen.contains(description.main.as_str()) {
            return Err(ConfigurationError::UnknownMain {
                id: description.main.clone(),
            });
        }

        let graph = ModuleGraph::build(
            description
                .modules
                .iter()
                .map(|m| (m.id.as_str(), m.dependencies.as_slice())),
        )?;

        let walker = SourceWalker::new(&options.ignore_patterns);
        let mut modules = BTreeMap::new();

        for desc in &description.modules {
            let source_abs = root.join(&desc.source_root);
            if !source_abs.is_dir() {
                return Err(ConfigurationError::MissingSourceRoot {
                    module: desc.id.clone(),
                    path: desc.source_root.clone(),
                });
            }

            let previous_module = previous.and_then(|p| p.modules.get(&desc.id));
            let mut files = Vec::new();
            for relative in walker.walk(&source_abs) {
                let prev = previous_module.and_then(|m| m.file(&relative));
                match scan_file(&source_abs.join(&relative), &relative, prev) {
                    Ok(file) => files.push(file),
                    // Vanished between walk and stat; the next refresh settles it.
                    Err(e) => tracing::debug!(
                        "[manifest] skipping {}: {e}",
                        source_abs.join(&relative).display()
                    ),
                }
            }

            let output_root = match (&options.output_dir, &desc.output_root) {
                (Some(dir), _) => dir.join(&desc.id),
                (None, Some(out)) => out.clone(),
                (None, None) => description.build_location.join(&desc.id),
            };
            let mut dependencies = desc.dependencies.clone();
            dependencies.sort();
            dependencies.dedup();

            modules.insert(
                desc.id.clone(),
                Module {
                    id: desc.id.clone(),
                    name: desc.name.clone().unwrap_or_else(|| desc.id.clone()),
                    source_root: desc.source_root.clone(),
                    output_root,
                    profiles: desc.profiles.iter().cloned().collect(),
                    dependencies,
                    files,
                    is_main: desc.id == description.main,
                },
            );
        }

        let generated = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Ok(Self {
            generated,
            build_location: description.build_location,
            main_module: description.main,
            modules,
            root: root.to_path_buf(),
            graph,
        })
    }

    /// Workspace root this manifest was loaded from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn module(&self, id: &str) -> Option<&Module> {
        self.modules.get(id)
    }

    /// The module whose source root contains `path`. Accepts workspace-relative
    /// or absolute paths; the most specific root wins.
    pub fn resolve_module(&self, path: &Path) -> Option<&Module> {
        let path = path.strip_prefix(&self.root).unwrap_or(path);
        self.modules
            .values()
            .filter(|m| path.starts_with(&m.source_root))
            .max_by_key(|m| m.source_root.components().count())
    }

    /// Module ids, dependencies first.
    pub fn build_order(&self) -> Vec<String> {
        self.graph.order()
    }

    /// Module ids grouped into independent levels, dependencies first.
    pub fn build_levels(&self) -> Vec<Vec<String>> {
        self.graph.levels()
    }

    /// The module plus its transitive dependencies.
    pub fn dependency_closure(&self, id: &str) -> Option<BTreeSet<String>> {
        self.graph.closure(id)
    }

    /// Workspace-relative paths of every tracked file, per module.
    pub fn file_paths(&self) -> BTreeMap<String, BTreeSet<PathBuf>> {
        self.modules
            .values()
            .map(|m| {
                let paths = m.files.iter().map(|f| m.workspace_path(&f.path)).collect();
                (m.id.clone(), paths)
            })
            .collect()
    }

    /// Compare two snapshots file by file.
    ///
    /// Events are ordered by workspace-relative path.
    pub fn diff(previous: &Manifest, current: &Manifest) -> Vec<DeltaEvent> {
        let index = |manifest: &Manifest| -> BTreeMap<PathBuf, ModuleFile> {
            manifest
                .modules
                .values()
                .flat_map(|m| m.files.iter().map(move |f| (m.workspace_path(&f.path), f.clone())))
                .collect()
        };
        let before = index(previous);
        let after = index(current);

        let paths: BTreeSet<&PathBuf> = before.keys().chain(after.keys()).collect();
        paths
            .into_iter()
            .filter_map(|path| {
                let kind = match (before.get(path), after.get(path)) {
                    (None, Some(_)) => DeltaKind::Added,
                    (Some(_), None) => DeltaKind::Removed,
                    (Some(old), Some(new)) if old.content_hash != new.content_hash => {
                        DeltaKind::Changed
                    }
                    _ => return None,
                };
                Some(DeltaEvent::new(path.clone(), kind))
            })
            .collect()
    }

    /// Files this manifest tracks that are no longer on disk.
    pub fn missing_files(&self) -> Vec<DeltaEvent> {
        self.modules
            .values()
            .flat_map(|m| m.files.iter().map(move |f| m.workspace_path(&f.path)))
            .filter(|path| !self.root.join(path).exists())
            .map(|path| DeltaEvent::new(path, DeltaKind::Missing))
            .collect()
    }

    /// Location of the persisted manifest.
    pub fn persisted_path(root: &Path, build_location: &Path) -> PathBuf {
        root.join(build_location).join(MANIFEST_FILE)
    }

    /// Write the manifest atomically into the build location.
    pub fn save(&self) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(
            &Self::persisted_path(&self.root, &self.build_location),
            json.as_bytes(),
        )
    }

    /// Load a persisted manifest. Absent, corrupt or inconsistent snapshots
    /// yield `None`.
    pub fn load_persisted(root: &Path, build_location: &Path) -> Option<Self> {
        let path = Self::persisted_path(root, build_location);
        let content = std::fs::read_to_string(&path).ok()?;
        let mut manifest: Manifest = match serde_json::from_str(&content) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("[manifest] ignoring corrupt {}: {e}", path.display());
                return None;
            }
        };
        manifest.graph = ModuleGraph::build(
            manifest
                .modules
                .values()
                .map(|m| (m.id.as_str(), m.dependencies.as_slice())),
        )
        .ok()?;
        manifest.root = root.to_path_buf();
        Some(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn workspace() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(
            root.join("hotwire.toml"),
            r#"
main = "app"

[[module]]
id = "core"
source_root = "core"

[[module]]
id = "app"
source_root = "app"
dependencies = ["core"]
"#,
        )
        .unwrap();
        fs::create_dir_all(root.join("core/models")).unwrap();
        fs::create_dir_all(root.join("app")).unwrap();
        fs::write(root.join("core/models/user.ts"), "export class User {}").unwrap();
        fs::write(root.join("app/main.ts"), "export class Main {}").unwrap();
        temp
    }

    #[test]
    fn load_builds_modules_and_files() {
        let temp = workspace();
        let manifest = Manifest::load(temp.path()).unwrap();

        assert_eq!(manifest.main_module, "app");
        assert_eq!(manifest.build_order(), vec!["core", "app"]);
        let core = manifest.module("core").unwrap();
        assert_eq!(core.files.len(), 1);
        assert_eq!(core.files[0].path, PathBuf::from("models/user.ts"));
        assert_eq!(core.output_root, PathBuf::from(".hotwire/build/core"));
        assert!(manifest.module("app").unwrap().is_main);
    }

    #[test]
    fn output_dir_override() {
        let temp = workspace();
        let options = ManifestOptions {
            ignore_patterns: Vec::new(),
            output_dir: Some(PathBuf::from("dist")),
        };
        let manifest = Manifest::load_with(temp.path(), &options).unwrap();
        assert_eq!(
            manifest.module("app").unwrap().output_root,
            PathBuf::from("dist/app")
        );
    }

    #[test]
    fn resolve_module_by_path() {
        let temp = workspace();
        let manifest = Manifest::load(temp.path()).unwrap();

        let module = manifest.resolve_module(Path::new("core/models/user.ts")).unwrap();
        assert_eq!(module.id, "core");
        let absolute = temp.path().join("app/main.ts");
        assert_eq!(manifest.resolve_module(&absolute).unwrap().id, "app");
        assert!(manifest.resolve_module(Path::new("docs/readme.md")).is_none());
    }

    #[test]
    fn diff_reports_added_changed_removed() {
        let temp = workspace();
        let root = temp.path();
        let before = Manifest::load(root).unwrap();

        fs::write(root.join("core/models/user.ts"), "export class User { id = 1; }").unwrap();
        fs::write(root.join("core/models/role.ts"), "export class Role {}").unwrap();
        fs::remove_file(root.join("app/main.ts")).unwrap();

        let after = Manifest::refresh(root, &before, &ManifestOptions::default()).unwrap();
        let events = Manifest::diff(&before, &after);

        assert_eq!(
            events,
            vec![
                DeltaEvent::removed("app/main.ts"),
                DeltaEvent::added("core/models/role.ts"),
                DeltaEvent::changed("core/models/user.ts"),
            ]
        );
        assert!(Manifest::diff(&after, &after).is_empty());
    }

    #[test]
    fn missing_files_against_disk() {
        let temp = workspace();
        let manifest = Manifest::load(temp.path()).unwrap();
        fs::remove_file(temp.path().join("app/main.ts")).unwrap();

        assert_eq!(
            manifest.missing_files(),
            vec![DeltaEvent::new("app/main.ts", DeltaKind::Missing)]
        );
    }

    #[test]
    fn persisted_roundtrip_and_corruption() {
        let temp = workspace();
        let manifest = Manifest::load(temp.path()).unwrap();
        manifest.save().unwrap();

        let loaded = Manifest::load_persisted(temp.path(), &manifest.build_location).unwrap();
        assert_eq!(loaded.modules, manifest.modules);
        assert_eq!(loaded.build_order(), manifest.build_order());

        fs::write(
            Manifest::persisted_path(temp.path(), &manifest.build_location),
            "garbage",
        )
        .unwrap();
        assert!(Manifest::load_persisted(temp.path(), &manifest.build_location).is_none());
    }

    #[test]
    fn configuration_errors() {
        let temp = workspace();
        let root = temp.path();

        fs::write(
            root.join("hotwire.toml"),
            "main = \"app\"\n[[module]]\nid = \"app\"\nsource_root = \"nowhere\"\n",
        )
        .unwrap();
        assert!(matches!(
            Manifest::load(root),
            Err(ConfigurationError::MissingSourceRoot { .. })
        ));

        fs::write(
            root.join("hotwire.toml"),
            "main = \"x\"\n[[module]]\nid = \"app\"\nsource_root = \"app\"\n",
        )
        .unwrap();
        assert!(matches!(
            Manifest::load(root),
            Err(ConfigurationError::UnknownMain { .. })
        ));

        fs::write(
            root.join("hotwire.toml"),
            "main = \"app\"\n[[module]]\nid = \"app\"\nsource_root = \"app\"\n[[module]]\nid = \"app\"\nsource_root = \"core\"\n",
        )
        .unwrap();
        assert!(matches!(
            Manifest::load(root),
            Err(ConfigurationError::DuplicateModule { .. })
        ));

        fs::remove_file(root.join("hotwire.toml")).unwrap();
        assert!(matches!(
            Manifest::load(root),
            Err(ConfigurationError::Unreadable { .. })
        ));
    }
}
