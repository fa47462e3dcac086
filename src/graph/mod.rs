//! Schema Containment Graph
//!
//! Primary data structure: a petgraph arena (`StableDiGraph`) of [`Node`]s
//! whose edges mean "contains". Stable indices are the node handles, so one
//! node can have many predecessors once references are shared or resolved,
//! and nodes can be deleted without invalidating other handles.
//!
//! Edge weights carry the ordinal of the child inside its parent (key order
//! for objects, element index for arrays). Redirected edges keep the ordinal
//! of the edge they replace.
//!
//! Pipeline: [`builder`] (JSON value → unresolved graph) → [`resolver`]
//! (references replaced, may become cyclic) → [`extended`] (shared subtrees
//! unfolded) → [`metrics`] / [`traversal`].

pub mod builder;
pub mod cycles;
pub mod extended;
pub mod identity;
pub mod metrics;
pub mod node;
pub mod resolver;
pub mod traversal;

pub use builder::{build, build_with_base, BuildError, MAX_NESTING};
pub use cycles::{summarize_cycles, CycleSummary};
pub use extended::{extend, ExtendedGraph};
pub use identity::{classify, identity_key, RefIdentity, RefTarget};
pub use metrics::{DegreeProfile, GraphMetrics};
pub use node::{Node, NodeKind, Scalar, REF_KEYWORD, ROOT_NAME};
pub use resolver::{
    resolve, FailureCause, ReferenceFailure, ResolutionState, ResolvedGraph, Resolver, MAX_ROUNDS,
};
pub use traversal::{traverse, traverse_counters, KeywordCounter, Visitor};

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use url::Url;

/// Arena storage: nodes addressed by stable index, edges weighted by ordinal
pub type SchemaArena = StableDiGraph<Node, usize>;

/// Handle of a node in a [`SchemaArena`]
pub type NodeHandle = NodeIndex;

/// Graph representation of one JSON Schema document
#[derive(Debug, Clone)]
pub struct SchemaGraph {
    pub(crate) graph: SchemaArena,

    pub(crate) root: NodeHandle,

    /// Reference leaves by identity, one leaf per identity
    pub(crate) references: BTreeMap<RefIdentity, NodeHandle>,

    /// Raw `$id` of the document, if any
    pub(crate) id_tag: Option<String>,

    /// Absolute base URL derived from `$id` (or the fetch URL)
    pub(crate) base: Option<Url>,
}

impl SchemaGraph {
    // ========== Accessors ==========

    pub fn root(&self) -> NodeHandle {
        self.root
    }

    pub fn arena(&self) -> &SchemaArena {
        &self.graph
    }

    pub fn node(&self, handle: NodeHandle) -> Option<&Node> {
        self.graph.node_weight(handle)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Number of leaf nodes
    pub fn leaf_count(&self) -> usize {
        self.nodes().filter(|(_, n)| n.is_leaf()).count()
    }

    /// All nodes in handle order
    pub fn nodes(&self) -> impl Iterator<Item = (NodeHandle, &Node)> {
        self.graph
            .node_indices()
            .filter_map(move |idx| self.graph.node_weight(idx).map(|n| (idx, n)))
    }

    /// Reference leaves registered at construction, by identity
    pub fn references(&self) -> &BTreeMap<RefIdentity, NodeHandle> {
        &self.references
    }

    pub fn id_tag(&self) -> Option<&str> {
        self.id_tag.as_deref()
    }

    pub fn base(&self) -> Option<&Url> {
        self.base.as_ref()
    }

    /// URLs under which this document knows itself
    pub(crate) fn own_urls(&self) -> Vec<Url> {
        self.base.iter().cloned().collect()
    }

    // ========== Navigation ==========

    /// Children in ordinal order
    pub fn children(&self, handle: NodeHandle) -> Vec<NodeHandle> {
        let mut edges: Vec<(usize, NodeHandle)> = self
            .graph
            .edges_directed(handle, Direction::Outgoing)
            .map(|e| (*e.weight(), e.target()))
            .collect();
        edges.sort();
        edges.into_iter().map(|(_, target)| target).collect()
    }

    /// Distinct predecessors in handle order
    pub fn parents(&self, handle: NodeHandle) -> Vec<NodeHandle> {
        let mut parents: Vec<NodeHandle> = self
            .graph
            .neighbors_directed(handle, Direction::Incoming)
            .collect();
        parents.sort();
        parents.dedup();
        parents
    }

    pub fn in_degree(&self, handle: NodeHandle) -> usize {
        self.graph.neighbors_directed(handle, Direction::Incoming).count()
    }

    pub fn out_degree(&self, handle: NodeHandle) -> usize {
        self.graph.neighbors_directed(handle, Direction::Outgoing).count()
    }

    /// Child reached over the edge named `name`.
    ///
    /// Array elements are named by their textual form; when no element has
    /// that name, a numeric component selects the element by position.
    pub fn child_named(&self, handle: NodeHandle, name: &str) -> Option<NodeHandle> {
        let children = self.children(handle);
        if let Some(found) = children
            .iter()
            .copied()
            .find(|c| self.graph.node_weight(*c).map(|n| n.name == name).unwrap_or(false))
        {
            return Some(found);
        }

        if !self.node(handle)?.is_array() {
            return None;
        }
        let position: usize = name.parse().ok()?;
        self.graph
            .edges_directed(handle, Direction::Outgoing)
            .find(|e| *e.weight() == position)
            .map(|e| e.target())
    }

    /// Node at the end of a `#/a/b` fragment, walking edge names from the root
    pub fn node_at_fragment(&self, fragment: &str) -> Option<NodeHandle> {
        let components = identity::pointer_components(fragment)?;
        let mut current = self.root;
        for component in &components {
            current = self.child_named(current, component)?;
        }
        Some(current)
    }

    /// Induced subtree: the node plus all transitive successors
    pub fn subtree(&self, handle: NodeHandle) -> BTreeSet<NodeHandle> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![handle];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            stack.extend(self.graph.neighbors_directed(current, Direction::Outgoing));
        }
        seen
    }

    // ========== Mutation ==========

    /// Point every predecessor of `from` at `to`, then delete `from`
    pub(crate) fn redirect(&mut self, from: NodeHandle, to: NodeHandle) {
        let incoming: Vec<(NodeHandle, usize)> = self
            .graph
            .edges_directed(from, Direction::Incoming)
            .map(|e| (e.source(), *e.weight()))
            .collect();
        for (parent, ordinal) in incoming {
            self.graph.update_edge(parent, to, ordinal);
        }
        self.graph.remove_node(from);
    }

    /// Deep-copy the nodes of `members` (closed under successors) and
    /// return the copy of `root`
    pub(crate) fn duplicate(&mut self, members: &BTreeSet<NodeHandle>, root: NodeHandle) -> NodeHandle {
        let mut remap: HashMap<NodeHandle, NodeHandle> = HashMap::with_capacity(members.len());
        for &member in members {
            if let Some(node) = self.graph.node_weight(member).cloned() {
                remap.insert(member, self.graph.add_node(node));
            }
        }

        let edges: Vec<(NodeHandle, NodeHandle, usize)> = members
            .iter()
            .flat_map(|&m| {
                self.graph
                    .edges_directed(m, Direction::Outgoing)
                    .map(|e| (e.source(), e.target(), *e.weight()))
                    .collect::<Vec<_>>()
            })
            .collect();
        for (source, target, ordinal) in edges {
            if let (Some(&s), Some(&t)) = (remap.get(&source), remap.get(&target)) {
                self.graph.add_edge(s, t, ordinal);
            }
        }

        remap.get(&root).copied().unwrap_or(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_at_fragment() {
        let graph = build(&json!({
            "definitions": { "a": { "type": "string" } },
            "allOf": [ { "type": "object" }, { "type": "null" } ]
        }))
        .unwrap();

        let a = graph.node_at_fragment("#/definitions/a").unwrap();
        assert_eq!(graph.node(a).unwrap().name, "a");
        assert_eq!(graph.node_at_fragment("#"), Some(graph.root()));
        assert!(graph.node_at_fragment("#/definitions/missing").is_none());

        let second = graph.node_at_fragment("#/allOf/1/type").unwrap();
        assert_eq!(graph.node(second).unwrap().value_text().as_deref(), Some("null"));
    }

    #[test]
    fn test_children_keep_key_order() {
        let graph = build(&json!({ "b": 1, "a": 2, "c": 3 })).unwrap();
        let names: Vec<&str> = graph
            .children(graph.root())
            .into_iter()
            .map(|c| graph.node(c).unwrap().name.as_str())
            .collect();
        assert_eq!(names.len(), 3);
        assert!(names.contains(&"a") && names.contains(&"b") && names.contains(&"c"));
    }

    #[test]
    fn test_subtree_and_duplicate() {
        let mut graph = build(&json!({ "p": { "q": { "r": true } } })).unwrap();
        let p = graph.node_at_fragment("#/p").unwrap();
        let members = graph.subtree(p);
        assert_eq!(members.len(), 3);

        let before = graph.node_count();
        let copy = graph.duplicate(&members, p);
        assert_eq!(graph.node_count(), before + 3);
        assert_ne!(copy, p);
        assert_eq!(graph.subtree(copy).len(), 3);
    }
}
