use super::TransformHook;
use crate::pipeline::error::HookResult;
use crate::pipeline::state::PipelineState;
use crate::pipeline::syntax::SyntaxNode;

/// Prefix of the originating-file comment.
pub const ORIGIN_MARKER: &str = "// @hotwire-origin";

/// Prepends `// @hotwire-origin <module>:<path>` to every file.
///
/// A leading `#!` line stays first.
#[derive(Debug, Default)]
pub struct OriginHook;

impl TransformHook for OriginHook {
    fn name(&self) -> &str {
        "origin"
    }

    fn before_file(&self, state: &mut PipelineState, mut node: SyntaxNode) -> HookResult<SyntaxNode> {
        let source = state.source();
        let at = if source.starts_with("#!") {
            source.find('\n').map(|i| i + 1).unwrap_or(source.len())
        } else {
            0
        };
        let path = state.path().to_string_lossy().replace('\\', "/");
        let marker = format!("{ORIGIN_MARKER} {}:{path}\n", state.module_id());
        node.insert(at, marker);
        Ok(node)
    }
}
