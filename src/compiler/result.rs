//! Build outcome.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use super::CompileError;
use crate::delta::DeltaEvent;

/// Per-file compile state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileState {
    /// Never compiled, or no record survives.
    Unknown,
    /// Output known to be out of date.
    Stale,
    Compiling,
    Compiled,
    Failed,
}

/// What one `build` call did. Paths are workspace-relative source paths.
#[derive(Debug, Default)]
pub struct BuildResult {
    pub compiled_files: Vec<PathBuf>,
    pub skipped_files: Vec<PathBuf>,
    /// Sources whose outputs were deleted because they left the manifest.
    pub removed_files: Vec<PathBuf>,
    pub errors: Vec<CompileError>,
    /// One event per file whose output bytes changed.
    pub deltas: Vec<DeltaEvent>,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl BuildResult {
    /// No errors and not cancelled.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && !self.cancelled
    }

    /// Files with a recorded failure.
    pub fn failed_files(&self) -> BTreeSet<PathBuf> {
        self.errors
            .iter()
            .filter_map(|e| e.file())
            .map(|p| p.to_path_buf())
            .collect()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} compiled, {} up to date, {} removed, {} failed in {:.2}s{}",
            self.compiled_files.len(),
            self.skipped_files.len(),
            self.removed_files.len(),
            self.errors.len(),
            self.elapsed.as_secs_f64(),
            if self.cancelled { " (cancelled)" } else { "" }
        )
    }
}
