//! Per-file presence tracking and delta classification.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::delta::DeltaKind;
use crate::hash::{ContentHash, Fingerprint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceState {
    /// Expected (listed in the manifest) but not yet observed on disk.
    Unseen,
    Seen,
    Removed,
}

#[derive(Debug, Clone)]
struct Presence {
    state: PresenceState,
    fingerprint: Option<Fingerprint>,
    hash: Option<ContentHash>,
}

/// Tracks what the watcher last knew about each file.
///
/// Paths are workspace-relative; `root` resolves them on disk.
#[derive(Debug)]
pub struct PresenceTracker {
    root: PathBuf,
    files: HashMap<PathBuf, Presence>,
}

impl PresenceTracker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: HashMap::new(),
        }
    }

    pub fn state(&self, path: &Path) -> Option<PresenceState> {
        self.files.get(path).map(|p| p.state)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Mark a file already on disk as seen. Emits nothing.
    pub fn seed(&mut self, path: &Path) {
        let absolute = self.root.join(path);
        let fingerprint = Fingerprint::of_path(&absolute);
        let hash = std::fs::read(&absolute)
            .ok()
            .map(|data| ContentHash::from_bytes(&data));
        let state = if fingerprint.is_some() {
            PresenceState::Seen
        } else {
            PresenceState::Unseen
        };
        self.files.insert(
            path.to_path_buf(),
            Presence {
                state,
                fingerprint,
                hash,
            },
        );
    }

    /// Register a file the manifest lists with the fingerprint it recorded.
    ///
    /// Returns `Missing` if it is absent, `Dirty` if it exists but its
    /// fingerprint moved since the manifest was written.
    pub fn expect(&mut self, path: &Path, recorded: Fingerprint) -> Option<DeltaKind> {
        let absolute = self.root.join(path);
        match Fingerprint::of_path(&absolute) {
            None => {
                self.files.insert(
                    path.to_path_buf(),
                    Presence {
                        state: PresenceState::Unseen,
                        fingerprint: None,
                        hash: None,
                    },
                );
                Some(DeltaKind::Missing)
            }
            Some(current) => {
                if !self.files.contains_key(path) {
                    self.seed(path);
                }
                (current != recorded).then_some(DeltaKind::Dirty)
            }
        }
    }

    /// Classify a path whose debounce window expired by comparing disk
    /// with the tracked record. `None` when nothing observable changed.
    pub fn classify(&mut self, path: &Path) -> Option<DeltaKind> {
        let absolute = self.root.join(path);
        let Some(fingerprint) = Fingerprint::of_path(&absolute) else {
            // Gone by the time the window closed.
            return self.removed(path);
        };

        let known = self
            .files
            .get(path)
            .filter(|p| p.state == PresenceState::Seen)
            .cloned();

        let Some(known) = known else {
            let hash = std::fs::read(&absolute)
                .ok()
                .map(|data| ContentHash::from_bytes(&data));
            self.files.insert(
                path.to_path_buf(),
                Presence {
                    state: PresenceState::Seen,
                    fingerprint: Some(fingerprint),
                    hash,
                },
            );
            return Some(DeltaKind::Added);
        };

        if known.fingerprint == Some(fingerprint) {
            return None;
        }

        let hash = std::fs::read(&absolute)
            .ok()
            .map(|data| ContentHash::from_bytes(&data));
        let entry = self.files.entry(path.to_path_buf()).or_insert(known.clone());
        entry.fingerprint = Some(fingerprint);
        if hash == known.hash {
            // Touched, not edited.
            return None;
        }
        entry.hash = hash;
        Some(DeltaKind::Changed)
    }

    /// A deletion was observed. `Removed` only for files seen before.
    pub fn removed(&mut self, path: &Path) -> Option<DeltaKind> {
        let presence = self.files.get_mut(path)?;
        if presence.state != PresenceState::Seen {
            return None;
        }
        presence.state = PresenceState::Removed;
        presence.fingerprint = None;
        presence.hash = None;
        Some(DeltaKind::Removed)
    }
}
