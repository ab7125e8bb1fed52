use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::metadata::{DeclarationId, DeclarationMetadata};

/// Lifecycle of one registry entry. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    Pending,
    Installed,
    Uninstalled,
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Installed => "installed",
            Self::Uninstalled => "uninstalled",
        };
        f.write_str(s)
    }
}

/// The registry's record of one declaration.
///
/// A reinstall after a change replaces the entry with a new one whose
/// `generation` is one higher; an entry never moves back to `Pending`.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub declaration_id: DeclarationId,
    state: EntryState,
    pub generation: u64,
    pub origin_file: PathBuf,
    pub metadata: Arc<DeclarationMetadata>,
    /// Declarations that depend on this one.
    pub dependents: BTreeSet<DeclarationId>,
}

impl RegistryEntry {
    pub(crate) fn pending(metadata: Arc<DeclarationMetadata>, generation: u64) -> Self {
        Self {
            declaration_id: metadata.declaration_id.clone(),
            state: EntryState::Pending,
            generation,
            origin_file: metadata.origin_file.clone(),
            metadata,
            dependents: BTreeSet::new(),
        }
    }

    pub fn state(&self) -> EntryState {
        self.state
    }

    pub fn is_installed(&self) -> bool {
        self.state == EntryState::Installed
    }

    /// Move to `next` if that is a forward transition.
    pub(crate) fn advance(&mut self, next: EntryState) -> bool {
        if next > self.state {
            self.state = next;
            true
        } else {
            false
        }
    }

    /// A fresh pending entry for new metadata, one generation later.
    pub(crate) fn successor(&self, metadata: Arc<DeclarationMetadata>) -> Self {
        let mut next = Self::pending(metadata, self.generation + 1);
        next.dependents = self.dependents.clone();
        next
    }
}
