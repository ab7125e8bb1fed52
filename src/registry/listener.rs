//! Downstream registry contract.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::error::ListenerError;
use crate::metadata::{DeclarationId, DeclarationMetadata};

pub type ListenerResult = Result<(), ListenerError>;

/// Why a declaration is being notified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeCause {
    /// The declaration's own metadata changed.
    Direct,
    /// Something it depends on changed or was removed.
    Dependency {
        /// From the declaration that changed to the notified one, inclusive.
        path: Vec<DeclarationId>,
        /// Members of the changed declaration whose hashes moved. Empty when
        /// it was removed.
        members: BTreeSet<String>,
    },
}

#[derive(Debug, Clone)]
pub struct ChangeNotice {
    pub declaration_id: DeclarationId,
    pub metadata: Arc<DeclarationMetadata>,
    pub previous: Option<Arc<DeclarationMetadata>>,
    pub cause: ChangeCause,
}

impl ChangeNotice {
    pub fn is_direct(&self) -> bool {
        self.cause == ChangeCause::Direct
    }

    /// Declaration that originally changed.
    pub fn origin(&self) -> &DeclarationId {
        match &self.cause {
            ChangeCause::Direct => &self.declaration_id,
            ChangeCause::Dependency { path, .. } => path.first().unwrap_or(&self.declaration_id),
        }
    }
}

/// Implemented by consumers (DI, schema, model registries).
pub trait RegistryListener: Send + Sync {
    fn name(&self) -> &str;

    fn on_install(&self, _id: &DeclarationId, _metadata: &DeclarationMetadata) -> ListenerResult {
        Ok(())
    }

    fn on_change(&self, _notice: &ChangeNotice) -> ListenerResult {
        Ok(())
    }

    fn on_uninstall(&self, _id: &DeclarationId) -> ListenerResult {
        Ok(())
    }
}

/// Wraps a closure as a change-only listener.
pub struct CallbackListener<F> {
    name: String,
    callback: F,
}

impl<F> CallbackListener<F>
where
    F: Fn(&ChangeNotice) + Send + Sync,
{
    pub fn new(name: impl Into<String>, callback: F) -> Self {
        Self {
            name: name.into(),
            callback,
        }
    }
}

impl<F> RegistryListener for CallbackListener<F>
where
    F: Fn(&ChangeNotice) + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn on_change(&self, notice: &ChangeNotice) -> ListenerResult {
        (self.callback)(notice);
        Ok(())
    }
}
