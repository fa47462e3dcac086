//! Tree Builder
//!
//! Turns a parsed JSON value into an unresolved [`SchemaGraph`]. Objects get
//! one edge per key, arrays one edge per element, scalars become leaves.
//! `$ref` leaves are deduplicated by reference identity while the tree is
//! built, so every identity owns exactly one leaf from the start.

use petgraph::stable_graph::StableDiGraph;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use url::Url;

use super::identity::{base_from_id, escape_component, identity_key};
use super::node::{Node, Scalar, REF_KEYWORD, ROOT_NAME};
use super::{NodeHandle, SchemaArena, SchemaGraph};

/// Deepest container nesting accepted before the document is rejected
pub const MAX_NESTING: usize = 256;

/// Document shapes the builder refuses to turn into a graph
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("Nesting deeper than {limit} levels at {path}")]
    TooDeep { path: String, limit: usize },
}

impl BuildError {
    /// JSON pointer of the offending value
    pub fn path(&self) -> &str {
        match self {
            Self::TooDeep { path, .. } => path,
        }
    }
}

/// Build the unresolved graph of a document.
///
/// The base URL for relative references is taken from the root `$id`
/// (falling back to the legacy `id` keyword).
pub fn build(value: &Value) -> Result<SchemaGraph, BuildError> {
    build_with_base(value, None)
}

/// Build with an explicit base URL, as used for fetched documents whose
/// location is known regardless of their `$id`.
pub fn build_with_base(value: &Value, base: Option<Url>) -> Result<SchemaGraph, BuildError> {
    let id_tag = value
        .get("$id")
        .or_else(|| value.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let base = base.or_else(|| id_tag.as_deref().and_then(base_from_id));

    let mut builder = Builder {
        graph: StableDiGraph::default(),
        references: BTreeMap::new(),
        base,
    };
    let root = builder.add(value, ROOT_NAME, false, "#", 0)?;

    Ok(SchemaGraph {
        graph: builder.graph,
        root,
        references: builder.references,
        id_tag,
        base: builder.base,
    })
}

struct Builder {
    graph: SchemaArena,
    references: BTreeMap<String, NodeHandle>,
    base: Option<Url>,
}

impl Builder {
    /// `keyed` is true for object members; only those can be references.
    fn add(
        &mut self,
        value: &Value,
        name: &str,
        keyed: bool,
        path: &str,
        depth: usize,
    ) -> Result<NodeHandle, BuildError> {
        if depth > MAX_NESTING {
            return Err(BuildError::TooDeep { path: path.to_string(), limit: MAX_NESTING });
        }

        match value {
            Value::Object(map) => {
                let handle = self.graph.add_node(Node::object(name));
                for (ordinal, (key, member)) in map.iter().enumerate() {
                    let member_path = format!("{}/{}", path, escape_component(key));
                    let child = self.add(member, key, true, &member_path, depth + 1)?;
                    self.graph.update_edge(handle, child, ordinal);
                }
                Ok(handle)
            }
            Value::Array(items) => {
                let handle = self.graph.add_node(Node::array(name));
                for (ordinal, item) in items.iter().enumerate() {
                    let item_path = format!("{}/{}", path, ordinal);
                    let child = self.add(item, &element_name(item), false, &item_path, depth + 1)?;
                    self.graph.add_edge(handle, child, ordinal);
                }
                Ok(handle)
            }
            scalar if keyed && name == REF_KEYWORD => Ok(self.reference(scalar)),
            scalar => Ok(self.graph.add_node(Node::leaf(name, scalar_of(scalar)))),
        }
    }

    /// Existing leaf for this identity, or a new one
    fn reference(&mut self, value: &Value) -> NodeHandle {
        let identity = match value {
            Value::String(raw) => identity_key(raw, self.base.as_ref()),
            other => format!("{}{}", REF_KEYWORD, other),
        };
        if let Some(&existing) = self.references.get(&identity) {
            return existing;
        }
        let handle = self.graph.add_node(Node::leaf(REF_KEYWORD, scalar_of(value)));
        self.references.insert(identity, handle);
        handle
    }
}

/// Array members are named by their textual form
fn element_name(item: &Value) -> String {
    match item {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn scalar_of(value: &Value) -> Scalar {
    match value {
        Value::String(s) => Scalar::String(s.clone()),
        Value::Number(n) => Scalar::Number(n.clone()),
        Value::Bool(b) => Scalar::Bool(*b),
        _ => Scalar::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_shapes() {
        let graph = build(&json!({
            "type": "object",
            "required": ["a", "b"],
            "properties": { "a": { "type": "string" }, "b": { "default": null } }
        }))
        .unwrap();

        assert_eq!(graph.node(graph.root()).unwrap().name, ROOT_NAME);
        // root, type, required, a, b, properties, a, type, b, default
        assert_eq!(graph.node_count(), 10);
        assert_eq!(graph.edge_count(), 9);
        assert_eq!(graph.leaf_count(), 5);

        let required = graph.node_at_fragment("#/required").unwrap();
        assert!(graph.node(required).unwrap().is_array());
        assert_eq!(graph.children(required).len(), 2);

        let default = graph.node_at_fragment("#/properties/b/default").unwrap();
        assert_eq!(graph.node(default).unwrap().value(), Some(&Scalar::Null));
    }

    #[test]
    fn test_shared_reference_leaf() {
        let graph = build(&json!({
            "properties": {
                "a": { "$ref": "#/definitions/x" },
                "b": { "$ref": "#/definitions/x" },
                "c": { "$ref": "#/definitions/y" }
            },
            "definitions": { "x": {}, "y": {} }
        }))
        .unwrap();

        assert_eq!(graph.references().len(), 2);
        let shared = graph.references()["$ref#/definitions/x"];
        assert_eq!(graph.in_degree(shared), 2);
    }

    #[test]
    fn test_reference_identity_uses_id_base() {
        let graph = build(&json!({
            "$id": "http://example.com/schemas/root.json",
            "properties": {
                "a": { "$ref": "item.json" },
                "b": { "$ref": "http://example.com/schemas/item.json" }
            }
        }))
        .unwrap();

        assert_eq!(graph.base().map(Url::as_str), Some("http://example.com/schemas/root.json"));
        assert_eq!(graph.references().len(), 1);
        assert!(graph.references().contains_key("$refhttp://example.com/schemas/item.json"));
    }

    #[test]
    fn test_ref_named_members_are_not_references() {
        let graph = build(&json!({
            "properties": { "$ref": { "type": "string" } },
            "required": ["$ref"]
        }))
        .unwrap();
        assert!(graph.references().is_empty());
    }

    #[test]
    fn test_nesting_limit() {
        let mut value = json!({ "type": "string" });
        for _ in 0..(MAX_NESTING + 1) {
            value = json!({ "items": value });
        }
        let err = build(&value).unwrap_err();
        assert!(err.path().starts_with("#/items/items"));
    }
}
