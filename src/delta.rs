//! Per-file change events and the per-module delta log.
//!
//! The watcher, the manifest refresh and the compiler all speak in
//! [`DeltaEvent`]s. The [`DeltaLog`] is the persisted, per-module record of
//! the last known status of each file; it lets a restarted process work out
//! what happened while nothing was watching.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::manifest::Manifest;

/// Name of the persisted delta log inside the build location.
pub const DELTA_LOG_FILE: &str = "delta-log.json";

/// What happened to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaKind {
    Added,
    Changed,
    Removed,
    /// Expected to exist (listed in the manifest) but absent at startup.
    Missing,
    /// Present but status unknown; forces a recheck.
    Dirty,
}

impl fmt::Display for DeltaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Added => "added",
            Self::Changed => "changed",
            Self::Removed => "removed",
            Self::Missing => "missing",
            Self::Dirty => "dirty",
        };
        f.write_str(s)
    }
}

/// One change to one file. `path` is relative to the workspace root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeltaEvent {
    pub path: PathBuf,
    pub kind: DeltaKind,
}

impl DeltaEvent {
    pub fn new(path: impl Into<PathBuf>, kind: DeltaKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn added(path: impl Into<PathBuf>) -> Self {
        Self::new(path, DeltaKind::Added)
    }

    pub fn changed(path: impl Into<PathBuf>) -> Self {
        Self::new(path, DeltaKind::Changed)
    }

    pub fn removed(path: impl Into<PathBuf>) -> Self {
        Self::new(path, DeltaKind::Removed)
    }
}

impl fmt::Display for DeltaEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.path.display())
    }
}

/// Module id to the events recorded for that module, in path order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaLog {
    modules: BTreeMap<String, Vec<DeltaEvent>>,
}

impl DeltaLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event for a module. A later event for the same path
    /// replaces the earlier one.
    pub fn record(&mut self, module_id: &str, event: DeltaEvent) {
        let events = self.modules.entry(module_id.to_string()).or_default();
        match events.binary_search_by(|e| e.path.cmp(&event.path)) {
            Ok(idx) => events[idx] = event,
            Err(idx) => events.insert(idx, event),
        }
    }

    /// Events recorded for one module.
    pub fn events(&self, module_id: &str) -> &[DeltaEvent] {
        self.modules
            .get(module_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Iterate modules and their events in module id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[DeltaEvent])> {
        self.modules
            .iter()
            .map(|(id, events)| (id.as_str(), events.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.modules.values().all(Vec::is_empty)
    }

    pub fn len(&self) -> usize {
        self.modules.values().map(Vec::len).sum()
    }

    /// Build the "what changed since last run" log from a persisted
    /// manifest snapshot and the live one.
    ///
    /// Events come from [`Manifest::diff`] plus the live manifest's missing
    /// files. Each event is filed under the module that owns the path in the
    /// live manifest, falling back to the persisted one for removed modules.
    /// Paths outside every module are dropped.
    pub fn reconcile(persisted: &Manifest, live: &Manifest) -> DeltaLog {
        let mut out = DeltaLog::new();

        let events = Manifest::diff(persisted, live)
            .into_iter()
            .chain(live.missing_files());
        for event in events {
            let module = live
                .resolve_module(&event.path)
                .or_else(|| persisted.resolve_module(&event.path));
            match module {
                Some(module) => out.record(&module.id, event),
                None => tracing::debug!("[delta] dropping event outside every module: {event}"),
            }
        }

        out
    }

    /// Location of the persisted log.
    pub fn path(root: &Path, build_location: &Path) -> PathBuf {
        root.join(build_location).join(DELTA_LOG_FILE)
    }

    /// Load a persisted log. Missing or corrupt files yield `None`.
    pub fn load(path: &Path) -> Option<Self> {
        let data = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&data) {
            Ok(log) => Some(log),
            Err(e) => {
                tracing::warn!("[delta] ignoring unreadable delta log {}: {e}", path.display());
                None
            }
        }
    }

    /// Persist atomically (write to a temp file in the same directory, then rename).
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, json.as_bytes())
    }
}

/// Write `data` to `path` via a sibling temp file and rename.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
