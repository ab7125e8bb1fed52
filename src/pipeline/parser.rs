//! Tree-sitter front end.
//!
//! Parses TypeScript/JavaScript and lifts the nodes hooks dispatch on into
//! an owned [`SyntaxNode`] tree.

use tree_sitter::{Node, Parser};

use super::error::TransformError;
use super::syntax::{FieldInfo, NodeKind, SourceUnit, SyntaxNode};

/// Hook name attributed to parse failures.
pub const PARSER_HOOK: &str = "parser";

/// Holds one tree-sitter parser per grammar. Not shared across threads;
/// each compile worker owns its own.
pub struct SourceParser {
    typescript: Parser,
    tsx: Parser,
}

impl std::fmt::Debug for SourceParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceParser")
            .field("language", &"TypeScript")
            .finish()
    }
}

impl SourceParser {
    pub fn new() -> Result<Self, String> {
        let mut typescript = Parser::new();
        typescript
            .set_language(&tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())
            .map_err(|e| format!("Failed to set TypeScript language: {e}"))?;

        let mut tsx = Parser::new();
        tsx.set_language(&tree_sitter_typescript::LANGUAGE_TSX.into())
            .map_err(|e| format!("Failed to set TSX language: {e}"))?;

        Ok(Self { typescript, tsx })
    }

    /// Parse one unit into its file node.
    pub fn parse(&mut self, unit: &SourceUnit) -> Result<SyntaxNode, TransformError> {
        let parser = if unit.is_tsx() {
            &mut self.tsx
        } else {
            &mut self.typescript
        };

        let tree = parser
            .parse(&unit.text, None)
            .ok_or_else(|| TransformError::new(&unit.path, PARSER_HOOK, "parser returned no tree"))?;
        let root = tree.root_node();

        if root.has_error() {
            let position = first_error(root)
                .map(|n| {
                    let p = n.start_position();
                    format!("{}:{}", p.row + 1, p.column + 1)
                })
                .unwrap_or_else(|| "unknown position".to_string());
            return Err(TransformError::new(
                &unit.path,
                PARSER_HOOK,
                format!("syntax error at {position}"),
            ));
        }

        let mut file = SyntaxNode::new(NodeKind::File, None, 0..unit.text.len());
        collect_children(root, &unit.text, &mut file.children);
        Ok(file)
    }
}

/// First ERROR or MISSING node in document order.
fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error() || child.is_missing() {
            if let Some(found) = first_error(child) {
                return Some(found);
            }
        }
    }
    None
}

fn text_of(node: Node, code: &str) -> String {
    code[node.byte_range()].to_string()
}

fn name_of(node: Node, code: &str) -> Option<String> {
    node.child_by_field_name("name").map(|n| text_of(n, code))
}

/// Start of `node` including the decorators in front of it. Decorators of
/// an exported class belong to the `export_statement`, so that statement's
/// start is used instead.
fn decorated_start(node: Node) -> usize {
    let mut start = node.start_byte();
    let mut previous = node.prev_named_sibling();
    while let Some(sibling) = previous {
        if sibling.kind() != "decorator" {
            break;
        }
        start = sibling.start_byte();
        previous = sibling.prev_named_sibling();
    }
    if let Some(parent) = node.parent() {
        if parent.kind() == "export_statement" {
            start = start.min(parent.start_byte());
        }
    }
    start
}

fn collect_children(node: Node, code: &str, out: &mut Vec<SyntaxNode>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect(child, code, out);
    }
}

/// Lift `node` (or its relevant descendants) into `out`.
fn collect(node: Node, code: &str, out: &mut Vec<SyntaxNode>) {
    match node.kind() {
        "class_declaration" | "abstract_class_declaration" | "class" => {
            let Some(body) = node.child_by_field_name("body") else {
                collect_children(node, code, out);
                return;
            };
            let kind = NodeKind::Class {
                is_abstract: node.kind() == "abstract_class_declaration",
                body: body.byte_range(),
                fields: fields_of(body, code),
            };
            let mut syntax = SyntaxNode::new(kind, name_of(node, code), node.byte_range());
            syntax.leading = decorated_start(node);
            collect_children(body, code, &mut syntax.children);
            out.push(syntax);
        }
        "method_definition" => {
            let mut cursor = node.walk();
            let is_static = node.children(&mut cursor).any(|c| c.kind() == "static");
            let mut syntax = SyntaxNode::new(
                NodeKind::Method { is_static },
                name_of(node, code),
                node.byte_range(),
            );
            syntax.leading = decorated_start(node);
            collect_children(node, code, &mut syntax.children);
            out.push(syntax);
        }
        "function_declaration" | "generator_function_declaration" => {
            let mut syntax =
                SyntaxNode::new(NodeKind::Function, name_of(node, code), node.byte_range());
            collect_children(node, code, &mut syntax.children);
            out.push(syntax);
        }
        "call_expression" => {
            let (Some(function), Some(arguments)) = (
                node.child_by_field_name("function"),
                node.child_by_field_name("arguments"),
            ) else {
                collect_children(node, code, out);
                return;
            };
            let callee: String = text_of(function, code)
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();
            let mut syntax = SyntaxNode::new(
                NodeKind::Call {
                    callee,
                    arguments: arguments.byte_range(),
                    tagged: arguments.kind() != "arguments",
                },
                None,
                node.byte_range(),
            );
            collect_children(node, code, &mut syntax.children);
            out.push(syntax);
        }
        _ => collect_children(node, code, out),
    }
}

/// Fields declared directly in a class body.
fn fields_of(body: Node, code: &str) -> Vec<FieldInfo> {
    let mut fields = Vec::new();
    let mut cursor = body.walk();
    for member in body.named_children(&mut cursor) {
        if member.kind() != "public_field_definition" {
            continue;
        }
        let Some(name) = name_of(member, code) else {
            continue;
        };
        let mut type_names = Vec::new();
        if let Some(annotation) = member.child_by_field_name("type") {
            type_identifiers(annotation, code, &mut type_names);
        }
        fields.push(FieldInfo {
            name,
            type_names,
            span: decorated_start(member)..member.end_byte(),
        });
    }
    fields
}

fn type_identifiers(node: Node, code: &str, out: &mut Vec<String>) {
    if node.kind() == "type_identifier" {
        out.push(text_of(node, code));
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        type_identifiers(child, code, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::syntax::NodeCategory;

    fn parse(text: &str) -> SyntaxNode {
        let mut parser = SourceParser::new().unwrap();
        parser
            .parse(&SourceUnit::new("core", "core/a.ts", text))
            .unwrap()
    }

    #[test]
    fn lifts_classes_methods_and_calls() {
        let code = r#"
export class UserService {
    repo: Repository<User>;
    static create() { return new UserService(); }
    find(id: string) {
        this.logger.info("find", id);
        return this.repo.get(id);
    }
}
function helper() { console.log("x"); }
"#;
        let file = parse(code);
        assert_eq!(file.children.len(), 2);

        let class = &file.children[0];
        assert_eq!(class.name.as_deref(), Some("UserService"));
        match &class.kind {
            NodeKind::Class { fields, is_abstract, .. } => {
                assert!(!is_abstract);
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].name, "repo");
                assert_eq!(fields[0].type_names, vec!["Repository", "User"]);
            }
            other => panic!("expected class, got {other:?}"),
        }

        let categories: Vec<_> = class.children.iter().map(|c| c.category()).collect();
        assert_eq!(
            categories,
            vec![NodeCategory::StaticMethod, NodeCategory::Method]
        );

        let calls: Vec<_> = class.children[1]
            .walk()
            .filter_map(|n| match &n.kind {
                NodeKind::Call { callee, .. } => Some(callee.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(calls, vec!["this.logger.info", "this.repo.get"]);

        assert_eq!(file.children[1].category(), NodeCategory::Function);
    }

    #[test]
    fn exported_class_span_covers_its_decorators() {
        let code = "@Schema({ strict: true })\nexport class X {\n  @Column() name: string;\n  @Get() run() {}\n}\n";
        let file = parse(code);
        let class = &file.children[0];
        assert!(class.declaration_text(code).starts_with("@Schema({ strict: true })"));
        assert!(class.text(code).starts_with("class X"));

        let NodeKind::Class { fields, .. } = &class.kind else {
            panic!("expected class");
        };
        assert!(code[fields[0].span.clone()].starts_with("@Column()"));
        assert!(class.children[0].declaration_text(code).starts_with("@Get()"));
    }

    #[test]
    fn tagged_template_call_is_marked() {
        let file = parse("log.info`started ${1}`;\nlog.info(\"plain\");\n");
        let tagged: Vec<bool> = file
            .walk()
            .filter_map(|n| match &n.kind {
                NodeKind::Call { tagged, .. } => Some(*tagged),
                _ => None,
            })
            .collect();
        assert_eq!(tagged, vec![true, false]);
    }

    #[test]
    fn abstract_class_is_flagged() {
        let file = parse("abstract class Base { abstract run(): void; }");
        assert!(matches!(
            file.children[0].kind,
            NodeKind::Class { is_abstract: true, .. }
        ));
    }

    #[test]
    fn syntax_error_is_attributed_to_parser() {
        let mut parser = SourceParser::new().unwrap();
        let err = parser
            .parse(&SourceUnit::new("core", "core/bad.ts", "class { {"))
            .unwrap_err();
        assert_eq!(err.hook, PARSER_HOOK);
        assert!(err.cause.to_string().starts_with("syntax error at"));
    }
}
