//! Per-file pipeline state.
//!
//! A fresh [`PipelineState`] is created for every file and dropped when the
//! file is done, so nothing a hook stores here can leak into another file.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::syntax::{NodeCategory, SourceUnit};
use crate::metadata::DeclarationMetadata;

/// One lexical scope opened by a class, method or function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeFrame {
    pub category: NodeCategory,
    pub name: Option<String>,
}

pub struct PipelineState {
    module_id: String,
    path: PathBuf,
    source: Arc<str>,
    typescript: bool,
    scopes: Vec<ScopeFrame>,
    declarations: Vec<DeclarationMetadata>,
    cache: HashMap<TypeId, Box<dyn Any + Send>>,
}

impl PipelineState {
    pub fn new(unit: &SourceUnit) -> Self {
        Self {
            module_id: unit.module_id.clone(),
            path: unit.path.clone(),
            source: Arc::from(unit.text.as_str()),
            typescript: unit.is_typescript(),
            scopes: Vec::new(),
            declarations: Vec::new(),
            cache: HashMap::new(),
        }
    }

    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    /// Workspace-relative path of the file being transformed.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Original (untransformed) source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_typescript(&self) -> bool {
        self.typescript
    }

    pub(crate) fn push_scope(&mut self, frame: ScopeFrame) {
        self.scopes.push(frame);
    }

    pub(crate) fn pop_scope(&mut self) -> Option<ScopeFrame> {
        self.scopes.pop()
    }

    /// Open scopes, outermost first.
    pub fn scopes(&self) -> &[ScopeFrame] {
        &self.scopes
    }

    /// Dotted names of the open scopes, e.g. `UserService.find`.
    /// Anonymous scopes are skipped.
    pub fn lexical_path(&self) -> Option<String> {
        let names: Vec<&str> = self
            .scopes
            .iter()
            .filter_map(|f| f.name.as_deref())
            .collect();
        if names.is_empty() {
            None
        } else {
            Some(names.join("."))
        }
    }

    pub fn add_declaration(&mut self, metadata: DeclarationMetadata) {
        self.declarations.push(metadata);
    }

    pub fn declarations(&self) -> &[DeclarationMetadata] {
        &self.declarations
    }

    /// File-scoped cache slot for a hook, created on first use.
    pub fn cache_mut<T: Default + Send + 'static>(&mut self) -> &mut T {
        self.cache
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(T::default()))
            .downcast_mut::<T>()
            .unwrap_or_else(|| unreachable!("cache slot keyed by its own TypeId"))
    }

    /// Read a cache slot without creating it.
    pub fn cache<T: 'static>(&self) -> Option<&T> {
        self.cache
            .get(&TypeId::of::<T>())
            .and_then(|b| b.downcast_ref::<T>())
    }

    /// Declarations sorted by id.
    pub(crate) fn into_declarations(mut self) -> Vec<DeclarationMetadata> {
        self.declarations
            .sort_by(|a, b| a.declaration_id.cmp(&b.declaration_id));
        self.declarations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexical_path_skips_anonymous_scopes() {
        let mut state = PipelineState::new(&SourceUnit::new("m", "m/a.ts", ""));
        assert_eq!(state.lexical_path(), None);

        state.push_scope(ScopeFrame {
            category: NodeCategory::Class,
            name: Some("Svc".into()),
        });
        state.push_scope(ScopeFrame {
            category: NodeCategory::Function,
            name: None,
        });
        state.push_scope(ScopeFrame {
            category: NodeCategory::Method,
            name: Some("run".into()),
        });
        assert_eq!(state.lexical_path().as_deref(), Some("Svc.run"));

        state.pop_scope();
        state.pop_scope();
        assert_eq!(state.lexical_path().as_deref(), Some("Svc"));
    }

    #[test]
    fn typed_cache_is_per_type() {
        let mut state = PipelineState::new(&SourceUnit::new("m", "m/a.ts", ""));
        *state.cache_mut::<u32>() += 2;
        *state.cache_mut::<u32>() += 3;
        state.cache_mut::<Vec<String>>().push("x".into());

        assert_eq!(state.cache::<u32>(), Some(&5));
        assert_eq!(state.cache::<Vec<String>>().map(Vec::len), Some(1));
        assert!(state.cache::<i64>().is_none());
    }
}
