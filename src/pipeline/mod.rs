//! Single-file transformation pipeline.
//!
//! A [`Pipeline`] parses one [`SourceUnit`], walks the lifted syntax tree
//! running the [`HookSet`] around every node, and splices the edits hooks
//! queued into the output text. All state lives in a per-file
//! [`PipelineState`]; the same input always yields the same output no
//! matter why the file is being compiled.

pub mod emit;
mod error;
pub mod hooks;
mod parser;
mod state;
mod syntax;

pub use error::{HookError, HookResult, TransformError};
pub use hooks::{
    HookSet, IDENTITY_FIELD, IdentityHook, LogContextHook, LogContextStats, ORIGIN_MARKER,
    OriginHook, TransformHook,
};
pub use parser::{PARSER_HOOK, SourceParser};
pub use state::{PipelineState, ScopeFrame};
pub use syntax::{FieldInfo, NodeCategory, NodeKind, SourceUnit, SyntaxNode, TextEdit};

use crate::config::BuildConfig;
use crate::metadata::DeclarationMetadata;

/// Result of transforming one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledUnit {
    pub text: String,
    /// Declarations found in the file, sorted by id.
    pub declarations: Vec<DeclarationMetadata>,
}

#[derive(Debug, Default)]
pub struct Pipeline {
    hooks: HookSet,
}

impl Pipeline {
    pub fn new(hooks: HookSet) -> Self {
        Self { hooks }
    }

    /// The built-in hooks: `origin`, `log-context`, `identity`.
    pub fn with_defaults(config: &BuildConfig) -> Result<Self, regex::Error> {
        let hooks = HookSet::new()
            .with(OriginHook)
            .with(LogContextHook::new(&config.logger_patterns)?)
            .with(IdentityHook);
        Ok(Self::new(hooks))
    }

    pub fn hooks(&self) -> &HookSet {
        &self.hooks
    }

    /// Transform one unit.
    pub fn transform(
        &self,
        parser: &mut SourceParser,
        unit: &SourceUnit,
    ) -> Result<CompiledUnit, TransformError> {
        let root = parser.parse(unit)?;
        let mut state = PipelineState::new(unit);
        let root = self.visit(&mut state, root)?;

        let text = emit::apply(&unit.text, &root)
            .map_err(|cause| TransformError::new(&unit.path, emit::EMIT_HOOK, cause))?;

        Ok(CompiledUnit {
            text,
            declarations: state.into_declarations(),
        })
    }

    /// Before-hooks, children, after-hooks. Scope frames bracket the whole
    /// visit so every hook of a node sees that node's own scope.
    fn visit(
        &self,
        state: &mut PipelineState,
        node: SyntaxNode,
    ) -> Result<SyntaxNode, TransformError> {
        let category = node.category();
        let scoped = category.opens_scope();
        if scoped {
            state.push_scope(ScopeFrame {
                category,
                name: node.name.clone(),
            });
        }

        let mut node = self.hooks.run_before(state, node)?;

        let children = std::mem::take(&mut node.children);
        node.children = children
            .into_iter()
            .map(|child| self.visit(state, child))
            .collect::<Result<_, _>>()?;

        let node = self.hooks.run_after(state, node)?;

        if scoped {
            state.pop_scope();
        }
        Ok(node)
    }
}
