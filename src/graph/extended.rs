//! Extended Graph Builder
//!
//! Unfolds sharing in a resolved graph: every extra incoming edge of a shared
//! node gets its own deep copy of the node's subtree. Predecessors inside the
//! shared subtree are left alone, so cyclic sharing stays intact and the
//! unfolding terminates. Only used to measure unfolded size.

use petgraph::algo::toposort;

use super::{NodeHandle, SchemaGraph};

/// Resolved graph with shared subtrees duplicated
#[derive(Debug, Clone)]
pub struct ExtendedGraph {
    graph: SchemaGraph,
    copies: usize,
}

impl ExtendedGraph {
    pub fn graph(&self) -> &SchemaGraph {
        &self.graph
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of subtree copies made
    pub fn copies(&self) -> usize {
        self.copies
    }
}

/// Build the extended graph of a resolved graph.
///
/// Shared nodes are processed descendants first, so a copied subtree is
/// already unfolded when it is duplicated. Cyclic graphs have no such order
/// and fall back to handle order.
pub fn extend(resolved: &SchemaGraph) -> ExtendedGraph {
    let mut graph = resolved.clone();
    let order: Vec<NodeHandle> = match toposort(&graph.graph, None) {
        Ok(mut order) => {
            order.reverse();
            order
        }
        Err(_) => graph.graph.node_indices().collect(),
    };

    let mut copies = 0;
    for node in order {
        let mut parents = graph.parents(node);
        if parents.len() < 2 {
            continue;
        }

        let members = graph.subtree(node);
        parents.retain(|p| !members.contains(p));

        // The first predecessor keeps the original
        for &parent in parents.iter().skip(1) {
            let Some(edge) = graph.graph.find_edge(parent, node) else {
                continue;
            };
            let ordinal = graph.graph[edge];
            let copy = graph.duplicate(&members, node);
            graph.graph.remove_edge(edge);
            graph.graph.add_edge(parent, copy, ordinal);
            copies += 1;
        }
    }

    ExtendedGraph { graph, copies }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::NoFetch;
    use crate::graph::{build, resolver::resolve};
    use serde_json::json;

    fn extended_of(value: serde_json::Value) -> (usize, ExtendedGraph) {
        let resolved = resolve(&build(&value).unwrap(), &NoFetch);
        let count = resolved.graph().node_count();
        (count, extend(resolved.graph()))
    }

    #[test]
    fn test_tree_is_unchanged() {
        let (count, extended) = extended_of(json!({ "properties": { "a": { "type": "string" } } }));
        assert_eq!(extended.node_count(), count);
        assert_eq!(extended.copies(), 0);
    }

    #[test]
    fn test_shared_subtree_duplicated() {
        // definitions, a and b all point at x = { type }
        let (count, extended) = extended_of(json!({
            "properties": {
                "a": { "$ref": "#/definitions/x" },
                "b": { "$ref": "#/definitions/x" }
            },
            "definitions": { "x": { "type": "string" } }
        }));
        assert_eq!(extended.copies(), 2);
        assert_eq!(extended.node_count(), count + 2 * 2);

        let graph = extended.graph();
        assert!(graph.nodes().all(|(h, _)| graph.parents(h).len() <= 1));
    }

    #[test]
    fn test_nested_sharing_fully_unfolded() {
        // y is shared inside x, and x is shared twice
        let (count, extended) = extended_of(json!({
            "properties": {
                "a": { "$ref": "#/definitions/x" },
                "b": { "$ref": "#/definitions/x" }
            },
            "definitions": {
                "x": { "items": { "$ref": "#/definitions/y" } },
                "y": { "type": "null" }
            }
        }));
        let graph = extended.graph();
        assert!(graph.nodes().all(|(h, _)| graph.parents(h).len() <= 1));
        assert!(extended.node_count() > count);
    }

    #[test]
    fn test_cyclic_sharing_kept() {
        let (_, extended) = extended_of(json!({
            "$ref": "#/definitions/node",
            "definitions": {
                "node": { "properties": { "next": { "$ref": "#/definitions/node" } } }
            }
        }));
        assert!(petgraph::algo::is_cyclic_directed(extended.graph().arena()));
    }
}
