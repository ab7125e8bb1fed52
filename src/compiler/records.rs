//! Persisted per-file build records.
//!
//! Stored as `records.json` in the build location. Loading is fail-safe:
//! a missing or corrupt file means every file is rebuilt.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::delta::write_atomic;
use crate::hash::{ContentHash, Fingerprint};

/// Name of the records file within the build location.
pub const RECORDS_FILE: &str = "records.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordState {
    Compiled,
    Failed,
}

/// Why a file failed, kept so the failure can be reported again without
/// retrying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub hook: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub module: String,
    /// Workspace-relative source path.
    pub source: PathBuf,
    /// Workspace-relative output path.
    pub output: PathBuf,
    pub source_hash: ContentHash,
    pub fingerprint: Fingerprint,
    /// Hash of output plus sidecar; `None` until a compile succeeds.
    pub output_hash: Option<ContentHash>,
    pub state: RecordState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureRecord>,
}

/// Record key: `<module>/<source-root-relative path>`.
pub fn record_key(module_id: &str, path: &Path) -> String {
    format!("{module_id}/{}", path.to_string_lossy().replace('\\', "/"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecords {
    files: BTreeMap<String, FileRecord>,
}

impl BuildRecords {
    pub fn path(root: &Path, build_location: &Path) -> PathBuf {
        root.join(build_location).join(RECORDS_FILE)
    }

    /// Load records, returning `None` if absent or unparsable.
    pub fn load(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&content) {
            Ok(records) => Some(records),
            Err(e) => {
                tracing::warn!("[compiler] discarding corrupt records {}: {e}", path.display());
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, json.as_bytes())
    }

    pub fn get(&self, key: &str) -> Option<&FileRecord> {
        self.files.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut FileRecord> {
        self.files.get_mut(key)
    }

    pub fn insert(&mut self, key: String, record: FileRecord) -> Option<FileRecord> {
        self.files.insert(key, record)
    }

    pub fn remove(&mut self, key: &str) -> Option<FileRecord> {
        self.files.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FileRecord)> {
        self.files.iter()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
