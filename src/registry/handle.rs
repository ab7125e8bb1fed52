use parking_lot::RwLock;
use std::sync::Arc;

use crate::metadata::{DeclarationId, DeclarationMetadata};

/// Stable indirection to a declaration's current metadata.
///
/// Consumers keep the handle; the registry swaps what it points at on
/// install and change, and clears it on uninstall.
#[derive(Debug, Clone)]
pub struct DeclarationHandle {
    id: DeclarationId,
    current: Arc<RwLock<Option<Arc<DeclarationMetadata>>>>,
}

impl DeclarationHandle {
    pub(crate) fn new(id: DeclarationId) -> Self {
        Self {
            id,
            current: Arc::new(RwLock::new(None)),
        }
    }

    pub fn id(&self) -> &DeclarationId {
        &self.id
    }

    /// Metadata at this moment, if the declaration is installed.
    pub fn get(&self) -> Option<Arc<DeclarationMetadata>> {
        self.current.read().clone()
    }

    pub fn is_live(&self) -> bool {
        self.current.read().is_some()
    }

    pub(crate) fn swap(&self, metadata: Option<Arc<DeclarationMetadata>>) {
        *self.current.write() = metadata;
    }
}
