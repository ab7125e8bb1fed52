use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::TransformHook;
use crate::hash::{ContentHash, hash_declaration};
use crate::metadata::{DeclarationId, DeclarationMetadata, is_synthetic_name};
use crate::pipeline::error::HookResult;
use crate::pipeline::state::PipelineState;
use crate::pipeline::syntax::{NodeKind, SyntaxNode};

/// Name of the static member injected into every named class.
pub const IDENTITY_FIELD: &str = "__hotwire";

/// Static identity data as it appears in the compiled class.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InjectedIdentity<'a> {
    id: &'a str,
    origin: String,
    class_hash: ContentHash,
    method_hashes: &'a BTreeMap<String, ContentHash>,
    is_abstract: bool,
    is_synthetic: bool,
}

/// Computes [`DeclarationMetadata`] for each named class and injects it as
/// a static member before the class body's closing brace.
#[derive(Debug, Default)]
pub struct IdentityHook;

fn insert_hash(map: &mut BTreeMap<String, ContentHash>, name: String, hash: ContentHash) {
    // Accessor pairs share a name; fold them in source order.
    map.entry(name)
        .and_modify(|existing| *existing = existing.combine(hash))
        .or_insert(hash);
}

/// Id for the class being closed. Classes nested in a function or method
/// are qualified with the enclosing scopes; a name still taken in this file
/// gets an ordinal suffix (`Row~2`) in source order.
fn unique_id(state: &PipelineState, name: &str) -> DeclarationId {
    let scopes = state.scopes();
    let enclosing = &scopes[..scopes.len().saturating_sub(1)];
    let mut qualified: Vec<&str> = enclosing.iter().filter_map(|f| f.name.as_deref()).collect();
    qualified.push(name);
    let qualified = qualified.join(".");

    let taken = |id: &DeclarationId| state.declarations().iter().any(|d| &d.declaration_id == id);
    let mut id = DeclarationId::new(state.module_id(), state.path(), &qualified);
    let mut ordinal = 1;
    while taken(&id) {
        ordinal += 1;
        id = DeclarationId::new(state.module_id(), state.path(), &format!("{qualified}~{ordinal}"));
    }
    id
}

impl TransformHook for IdentityHook {
    fn name(&self) -> &str {
        "identity"
    }

    fn after_class(&self, state: &mut PipelineState, mut node: SyntaxNode) -> HookResult<SyntaxNode> {
        let Some(name) = node.name.clone() else {
            return Ok(node);
        };
        let NodeKind::Class {
            is_abstract,
            body,
            fields,
        } = &node.kind
        else {
            return Ok(node);
        };

        let source = state.source();
        let class_hash = hash_declaration(node.declaration_text(source));

        let mut method_hashes = BTreeMap::new();
        for child in &node.children {
            if let (NodeKind::Method { .. }, Some(method)) = (&child.kind, &child.name) {
                insert_hash(
                    &mut method_hashes,
                    method.clone(),
                    hash_declaration(child.declaration_text(source)),
                );
            }
        }

        let mut member_hashes = BTreeMap::new();
        let mut embeds = BTreeSet::new();
        for field in fields {
            insert_hash(
                &mut member_hashes,
                field.name.clone(),
                hash_declaration(&source[field.span.clone()]),
            );
            embeds.extend(field.type_names.iter().cloned());
        }

        let origin_file = state.path().to_path_buf();
        let declaration_id = unique_id(state, &name);
        let metadata = DeclarationMetadata {
            declaration_id,
            is_synthetic: is_synthetic_name(&name),
            name,
            origin_file,
            class_hash,
            method_hashes,
            member_hashes,
            embeds: embeds.into_iter().collect(),
            is_abstract: *is_abstract,
        };

        let injected = InjectedIdentity {
            id: metadata.declaration_id.as_str(),
            origin: metadata.origin_file.to_string_lossy().replace('\\', "/"),
            class_hash: metadata.class_hash,
            method_hashes: &metadata.method_hashes,
            is_abstract: metadata.is_abstract,
            is_synthetic: metadata.is_synthetic,
        };
        let modifiers = if state.is_typescript() {
            "static readonly"
        } else {
            "static"
        };
        let member = format!(
            "\n  {modifiers} {IDENTITY_FIELD} = {};\n",
            serde_json::to_string(&injected)?
        );

        // Just before the closing brace.
        let at = body.end - 1;
        node.insert(at, member);
        state.add_declaration(metadata);
        Ok(node)
    }
}
