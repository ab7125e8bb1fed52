use regex::Regex;

use super::TransformHook;
use crate::pipeline::error::HookResult;
use crate::pipeline::state::PipelineState;
use crate::pipeline::syntax::{NodeKind, SyntaxNode};

/// Per-file count of annotated log calls.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LogContextStats {
    pub annotated: usize,
}

/// Inserts the enclosing `"[Class.method]"` as the first argument of
/// logger calls.
#[derive(Debug)]
pub struct LogContextHook {
    patterns: Vec<Regex>,
}

impl LogContextHook {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    fn is_logger_call(&self, callee: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(callee))
    }
}

impl TransformHook for LogContextHook {
    fn name(&self) -> &str {
        "log-context"
    }

    fn before_call(&self, state: &mut PipelineState, mut node: SyntaxNode) -> HookResult<SyntaxNode> {
        let NodeKind::Call {
            callee,
            arguments,
            tagged,
        } = &node.kind
        else {
            return Ok(node);
        };
        // A tagged template has no argument list to extend.
        if *tagged || !self.is_logger_call(callee) {
            return Ok(node);
        }
        let Some(context) = state.lexical_path() else {
            return Ok(node);
        };

        let arguments = arguments.clone();
        let inner = &state.source()[arguments.start + 1..arguments.end - 1];
        let literal = serde_json::to_string(&format!("[{context}]"))?;
        let text = if inner.trim().is_empty() {
            literal
        } else {
            format!("{literal}, ")
        };

        node.insert(arguments.start + 1, text);
        state.cache_mut::<LogContextStats>().annotated += 1;
        Ok(node)
    }

    fn after_file(&self, state: &mut PipelineState, node: SyntaxNode) -> HookResult<SyntaxNode> {
        if let Some(stats) = state.cache::<LogContextStats>() {
            tracing::trace!(
                "[pipeline] {} log calls annotated in {}",
                stats.annotated,
                state.path().display()
            );
        }
        Ok(node)
    }
}
