//! Splices queued text edits into the source.

use super::syntax::{SyntaxNode, TextEdit};

/// Hook name attributed to conflicting edits.
pub const EMIT_HOOK: &str = "emit";

/// Apply every edit in the tree to `source`.
///
/// Edits are ordered by start offset; edits at the same offset keep tree
/// pre-order, then queue order. Overlapping replacements are rejected.
pub fn apply(source: &str, root: &SyntaxNode) -> Result<String, String> {
    let mut edits: Vec<&TextEdit> = root.walk().flat_map(|n| n.edits.iter()).collect();
    // Stable sort keeps collection order for equal offsets.
    edits.sort_by_key(|e| e.range.start);

    let extra: usize = edits.iter().map(|e| e.text.len()).sum();
    let mut out = String::with_capacity(source.len() + extra);
    let mut cursor = 0;

    for edit in edits {
        if edit.range.start < cursor {
            return Err(format!(
                "edit at {}..{} overlaps a previous replacement ending at {cursor}",
                edit.range.start, edit.range.end
            ));
        }
        if edit.range.end > source.len() || !source.is_char_boundary(edit.range.start)
            || !source.is_char_boundary(edit.range.end)
        {
            return Err(format!(
                "edit at {}..{} is outside the source",
                edit.range.start, edit.range.end
            ));
        }
        out.push_str(&source[cursor..edit.range.start]);
        out.push_str(&edit.text);
        cursor = edit.range.end.max(cursor);
    }

    out.push_str(&source[cursor..]);
    Ok(out)
}
