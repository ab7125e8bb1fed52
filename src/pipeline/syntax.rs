//! Owned syntax tree handed to transformation hooks.
//!
//! Only the node categories hooks care about are kept; everything else in
//! the concrete tree is flattened away. Spans are byte offsets into the
//! original source text, and rewrites are recorded as [`TextEdit`]s on the
//! node that requested them.

use std::ops::Range;
use std::path::PathBuf;

/// One source file entering the pipeline.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    pub module_id: String,
    /// Workspace-relative path.
    pub path: PathBuf,
    pub text: String,
}

impl SourceUnit {
    pub fn new(module_id: impl Into<String>, path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            module_id: module_id.into(),
            path: path.into(),
            text: text.into(),
        }
    }

    /// TSX grammar is used for JSX-capable extensions.
    pub fn is_tsx(&self) -> bool {
        matches!(
            self.path.extension().and_then(|e| e.to_str()),
            Some("tsx" | "jsx" | "js" | "mjs" | "cjs")
        )
    }

    /// TypeScript-only syntax may be emitted.
    pub fn is_typescript(&self) -> bool {
        matches!(
            self.path.extension().and_then(|e| e.to_str()),
            Some("ts" | "tsx" | "mts" | "cts")
        )
    }
}

/// Hook dispatch category of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeCategory {
    File,
    Class,
    Method,
    StaticMethod,
    Function,
    Call,
}

impl NodeCategory {
    /// Categories that open a lexical scope frame.
    pub fn opens_scope(self) -> bool {
        matches!(
            self,
            Self::Class | Self::Method | Self::StaticMethod | Self::Function
        )
    }
}

/// A class field with the type names its annotation references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: String,
    pub type_names: Vec<String>,
    pub span: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Class {
        is_abstract: bool,
        /// Span of the class body including both braces.
        body: Range<usize>,
        fields: Vec<FieldInfo>,
    },
    Method {
        is_static: bool,
    },
    Function,
    Call {
        /// Callee text with whitespace removed, e.g. `this.logger.info`.
        callee: String,
        /// Span of the argument list including both parentheses, or of
        /// the template string for a tagged template.
        arguments: Range<usize>,
        /// `` tag`...` `` call whose argument is a template string.
        tagged: bool,
    },
}

/// A text rewrite. `range.start == range.end` is a pure insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub range: Range<usize>,
    pub text: String,
}

impl TextEdit {
    pub fn is_insert(&self) -> bool {
        self.range.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxNode {
    pub kind: NodeKind,
    pub name: Option<String>,
    pub span: Range<usize>,
    /// Start of the declaration including leading decorators and an
    /// enclosing `export`. Equals `span.start` for other nodes.
    pub leading: usize,
    pub children: Vec<SyntaxNode>,
    pub edits: Vec<TextEdit>,
}

impl SyntaxNode {
    pub fn new(kind: NodeKind, name: Option<String>, span: Range<usize>) -> Self {
        Self {
            kind,
            name,
            leading: span.start,
            span,
            children: Vec::new(),
            edits: Vec::new(),
        }
    }

    pub fn category(&self) -> NodeCategory {
        match &self.kind {
            NodeKind::File => NodeCategory::File,
            NodeKind::Class { .. } => NodeCategory::Class,
            NodeKind::Method { is_static: true } => NodeCategory::StaticMethod,
            NodeKind::Method { is_static: false } => NodeCategory::Method,
            NodeKind::Function => NodeCategory::Function,
            NodeKind::Call { .. } => NodeCategory::Call,
        }
    }

    /// Source text covered by this node.
    pub fn text<'s>(&self, source: &'s str) -> &'s str {
        &source[self.span.clone()]
    }

    /// Declaration text with its decorators, as hashed for identity.
    pub fn declaration_text<'s>(&self, source: &'s str) -> &'s str {
        &source[self.leading..self.span.end]
    }

    /// Queue an insertion at a byte offset.
    pub fn insert(&mut self, at: usize, text: impl Into<String>) {
        self.edits.push(TextEdit {
            range: at..at,
            text: text.into(),
        });
    }

    /// Queue a replacement of a byte range.
    pub fn replace(&mut self, range: Range<usize>, text: impl Into<String>) {
        self.edits.push(TextEdit {
            range,
            text: text.into(),
        });
    }

    /// Pre-order walk over this node and its descendants.
    pub fn walk(&self) -> impl Iterator<Item = &SyntaxNode> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }
}
