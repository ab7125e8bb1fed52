//! Compiled output layout and the sidecar metadata store.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::CompileError;
use crate::delta::write_atomic;
use crate::manifest::Manifest;
use crate::metadata::{DeclarationMetadata, MetadataSidecar};
use crate::registry::{MetadataSource, RegistryError};

/// Suffix appended to an output path to name its sidecar.
pub const SIDECAR_SUFFIX: &str = ".meta.json";

/// Sidecar location for an output file.
pub fn sidecar_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_os_string();
    name.push(SIDECAR_SUFFIX);
    PathBuf::from(name)
}

/// Atomically write a file, creating parent directories.
pub(crate) fn write_output(path: &Path, data: &[u8]) -> Result<(), CompileError> {
    write_atomic(path, data).map_err(|e| CompileError::io(path, e))
}

/// Delete an output and its sidecar. Already-absent files are fine.
pub(crate) fn remove_output(path: &Path) -> Result<(), CompileError> {
    for target in [path.to_path_buf(), sidecar_path(path)] {
        match std::fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(CompileError::io(target, e)),
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct ModuleLayout {
    source_root: PathBuf,
    output_root: PathBuf,
}

/// Reads declaration metadata back from compiled sidecars.
///
/// Cheap to clone; clones share the same layout, which is refreshed with
/// [`OutputStore::update_layout`] whenever the manifest is reloaded.
#[derive(Debug, Clone)]
pub struct OutputStore {
    root: PathBuf,
    layout: Arc<RwLock<BTreeMap<String, ModuleLayout>>>,
}

impl OutputStore {
    pub fn new(manifest: &Manifest) -> Self {
        let store = Self {
            root: manifest.root().to_path_buf(),
            layout: Arc::new(RwLock::new(BTreeMap::new())),
        };
        store.update_layout(manifest);
        store
    }

    pub fn update_layout(&self, manifest: &Manifest) {
        let layout = manifest
            .modules
            .values()
            .map(|m| {
                (
                    m.id.clone(),
                    ModuleLayout {
                        source_root: m.source_root.clone(),
                        output_root: m.output_root.clone(),
                    },
                )
            })
            .collect();
        *self.layout.write() = layout;
    }

    /// Absolute sidecar path for a workspace-relative source path.
    pub fn sidecar_for(&self, source: &Path) -> Option<PathBuf> {
        let layout = self.layout.read();
        let module = layout
            .values()
            .filter(|m| source.starts_with(&m.source_root))
            .max_by_key(|m| m.source_root.components().count())?;
        let relative = source.strip_prefix(&module.source_root).ok()?;
        Some(sidecar_path(
            &self.root.join(&module.output_root).join(relative),
        ))
    }

    /// Parse the sidecar for a source path. `None` when there is none.
    pub fn read_sidecar(&self, source: &Path) -> Result<Option<MetadataSidecar>, RegistryError> {
        let Some(path) = self.sidecar_for(source) else {
            return Ok(None);
        };
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(RegistryError::Metadata {
                    path,
                    reason: e.to_string(),
                });
            }
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| RegistryError::Metadata {
                path,
                reason: e.to_string(),
            })
    }
}

impl MetadataSource for OutputStore {
    fn declarations(&self, source: &Path) -> Result<Vec<DeclarationMetadata>, RegistryError> {
        Ok(self
            .read_sidecar(source)?
            .map(|s| s.declarations)
            .unwrap_or_default())
    }
}
