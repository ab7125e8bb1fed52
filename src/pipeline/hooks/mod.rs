//! Transformation hooks and the ordered hook set.

mod identity;
mod log_context;
mod origin;

pub use identity::{IDENTITY_FIELD, IdentityHook};
pub use log_context::{LogContextHook, LogContextStats};
pub use origin::{ORIGIN_MARKER, OriginHook};

use super::error::{HookResult, TransformError};
use super::state::PipelineState;
use super::syntax::{NodeCategory, SyntaxNode};

/// A visitor bound to node categories and phases.
///
/// Every method defaults to returning the node untouched. Hooks must derive
/// their output only from the current file's tree and their own file-scoped
/// state in [`PipelineState`].
pub trait TransformHook: Send + Sync {
    /// Name used in error reports.
    fn name(&self) -> &str;

    fn before_file(&self, _state: &mut PipelineState, node: SyntaxNode) -> HookResult<SyntaxNode> {
        Ok(node)
    }
    fn after_file(&self, _state: &mut PipelineState, node: SyntaxNode) -> HookResult<SyntaxNode> {
        Ok(node)
    }
    fn before_class(&self, _state: &mut PipelineState, node: SyntaxNode) -> HookResult<SyntaxNode> {
        Ok(node)
    }
    fn after_class(&self, _state: &mut PipelineState, node: SyntaxNode) -> HookResult<SyntaxNode> {
        Ok(node)
    }
    fn before_method(&self, _state: &mut PipelineState, node: SyntaxNode) -> HookResult<SyntaxNode> {
        Ok(node)
    }
    fn after_method(&self, _state: &mut PipelineState, node: SyntaxNode) -> HookResult<SyntaxNode> {
        Ok(node)
    }
    fn before_static_method(
        &self,
        _state: &mut PipelineState,
        node: SyntaxNode,
    ) -> HookResult<SyntaxNode> {
        Ok(node)
    }
    fn after_static_method(
        &self,
        _state: &mut PipelineState,
        node: SyntaxNode,
    ) -> HookResult<SyntaxNode> {
        Ok(node)
    }
    fn before_function(
        &self,
        _state: &mut PipelineState,
        node: SyntaxNode,
    ) -> HookResult<SyntaxNode> {
        Ok(node)
    }
    fn after_function(&self, _state: &mut PipelineState, node: SyntaxNode) -> HookResult<SyntaxNode> {
        Ok(node)
    }
    fn before_call(&self, _state: &mut PipelineState, node: SyntaxNode) -> HookResult<SyntaxNode> {
        Ok(node)
    }
    fn after_call(&self, _state: &mut PipelineState, node: SyntaxNode) -> HookResult<SyntaxNode> {
        Ok(node)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Before,
    After,
}

fn dispatch(
    hook: &dyn TransformHook,
    phase: Phase,
    category: NodeCategory,
    state: &mut PipelineState,
    node: SyntaxNode,
) -> HookResult<SyntaxNode> {
    use NodeCategory::*;
    match (phase, category) {
        (Phase::Before, File) => hook.before_file(state, node),
        (Phase::After, File) => hook.after_file(state, node),
        (Phase::Before, Class) => hook.before_class(state, node),
        (Phase::After, Class) => hook.after_class(state, node),
        (Phase::Before, Method) => hook.before_method(state, node),
        (Phase::After, Method) => hook.after_method(state, node),
        (Phase::Before, StaticMethod) => hook.before_static_method(state, node),
        (Phase::After, StaticMethod) => hook.after_static_method(state, node),
        (Phase::Before, Function) => hook.before_function(state, node),
        (Phase::After, Function) => hook.after_function(state, node),
        (Phase::Before, Call) => hook.before_call(state, node),
        (Phase::After, Call) => hook.after_call(state, node),
    }
}

/// Ordered hooks. `before_*` run in registration order, `after_*` in
/// reverse, so the first hook registered wraps all the others.
#[derive(Default)]
pub struct HookSet {
    hooks: Vec<Box<dyn TransformHook>>,
}

impl std::fmt::Debug for HookSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl HookSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, hook: impl TransformHook + 'static) {
        self.hooks.push(Box::new(hook));
    }

    pub fn with(mut self, hook: impl TransformHook + 'static) -> Self {
        self.push(hook);
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.hooks.iter().map(|h| h.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub(crate) fn run_before(
        &self,
        state: &mut PipelineState,
        mut node: SyntaxNode,
    ) -> Result<SyntaxNode, TransformError> {
        let category = node.category();
        for hook in &self.hooks {
            node = dispatch(hook.as_ref(), Phase::Before, category, state, node)
                .map_err(|cause| TransformError::new(state.path(), hook.name(), cause))?;
        }
        Ok(node)
    }

    pub(crate) fn run_after(
        &self,
        state: &mut PipelineState,
        mut node: SyntaxNode,
    ) -> Result<SyntaxNode, TransformError> {
        let category = node.category();
        for hook in self.hooks.iter().rev() {
            node = dispatch(hook.as_ref(), Phase::After, category, state, node)
                .map_err(|cause| TransformError::new(state.path(), hook.name(), cause))?;
        }
        Ok(node)
    }
}
