//! Graph Metrics
//!
//! Structural measures over the three forms of a document graph:
//!
//! | Metric | Measured on |
//! |---|---|
//! | schema depth, width, fan-in/out, node count | unresolved graph |
//! | resolved depth, recursion, cycles, path count | resolved graph |
//! | blow-up factor | extended / resolved |
//! | reference count | raw JSON value |
//!
//! Simple-path enumeration is meaningless on cyclic graphs, so recursion is
//! checked first and the resolved depth falls back to the longest cycle.

use petgraph::algo::toposort;
use serde_json::Value;
use std::collections::HashMap;

use super::cycles::{summarize_cycles, CycleSummary};
use super::extended::ExtendedGraph;
use super::identity::{escape_component, local_identity};
use super::node::REF_KEYWORD;
use super::resolver::ResolvedGraph;
use super::{NodeHandle, SchemaGraph};

/// Per-node in/out degrees
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DegreeProfile {
    /// In-degree of every node, in handle order
    pub fan_in: Vec<usize>,
    /// Out-degree of every node except the root, in handle order
    pub fan_out: Vec<usize>,
}

impl DegreeProfile {
    pub fn of(graph: &SchemaGraph) -> Self {
        let root = graph.root();
        let mut profile = Self::default();
        for (handle, _) in graph.nodes() {
            profile.fan_in.push(graph.in_degree(handle));
            if handle != root {
                profile.fan_out.push(graph.out_degree(handle));
            }
        }
        profile
    }

    pub fn max_fan_in(&self) -> usize {
        self.fan_in.iter().copied().max().unwrap_or(0)
    }

    pub fn max_fan_out(&self) -> usize {
        self.fan_out.iter().copied().max().unwrap_or(0)
    }
}

/// Node count of the longest root-to-leaf path.
///
/// `None` for cyclic graphs. Containers with no leaf below them end no path;
/// a graph without any reachable leaf has depth 0.
pub fn depth(graph: &SchemaGraph) -> Option<usize> {
    let order = toposort(&graph.graph, None).ok()?;
    let mut longest: HashMap<NodeHandle, Option<usize>> = HashMap::with_capacity(order.len());

    for &node in order.iter().rev() {
        let below = if graph.node(node).map(|n| n.is_leaf()).unwrap_or(false) {
            Some(1)
        } else {
            graph
                .graph
                .neighbors(node)
                .filter_map(|child| longest.get(&child).copied().flatten())
                .max()
                .map(|d| d + 1)
        };
        longest.insert(node, below);
    }

    Some(longest.get(&graph.root()).copied().flatten().unwrap_or(0))
}

/// Leaf count
pub fn width(graph: &SchemaGraph) -> usize {
    graph.leaf_count()
}

/// String-valued `$ref` members in the raw document, duplicates included
pub fn reference_count(value: &Value) -> usize {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(key, member)| match member {
                Value::String(_) if key == REF_KEYWORD => 1,
                other => reference_count(other),
            })
            .sum(),
        Value::Array(items) => items.iter().map(reference_count).sum(),
        _ => 0,
    }
}

/// Every item under a harvested definition section is the target of a
/// resolved reference, and no reference failed.
///
/// Sections are looked up at the top level of the unresolved document.
pub fn reachability(unresolved: &SchemaGraph, resolved: &ResolvedGraph) -> bool {
    if resolved.invalid_reference_detected() {
        return false;
    }

    resolved.definition_sections().iter().all(|section| {
        let section_path = format!("#/{}", escape_component(section));
        let Some(container) = unresolved.node_at_fragment(&section_path) else {
            return false;
        };
        unresolved.children(container).into_iter().all(|item| {
            unresolved
                .node(item)
                .map(|n| {
                    let target = format!("{}/{}", section_path, escape_component(&n.name));
                    resolved.state().is_resolved(&local_identity(&target))
                })
                .unwrap_or(false)
        })
    })
}

/// Extended over resolved node count; 0 for recursive graphs
pub fn blow_up_factor(resolved_nodes: usize, extended_nodes: Option<usize>, recursive: bool) -> f64 {
    match extended_nodes {
        Some(extended) if !recursive && resolved_nodes > 0 => extended as f64 / resolved_nodes as f64,
        _ => 0.0,
    }
}

/// All graph metrics of one document
#[derive(Debug, Clone, PartialEq)]
pub struct GraphMetrics {
    pub ref_count: usize,
    pub schema_depth: usize,
    /// Longest root-to-leaf path, or the longest cycle when recursive
    pub resolved_depth: usize,
    pub cycles: CycleSummary,
    pub degrees: DegreeProfile,
    pub width: usize,
    pub path_count: usize,
    pub has_recursion: bool,
    pub reachability: bool,
    pub blow_up_factor: f64,
    pub node_count: usize,
    pub resolved_node_count: usize,
    /// 0 when recursive
    pub extended_node_count: usize,
}

impl GraphMetrics {
    /// `extended` is consulted only for non-recursive graphs
    pub fn compute<'e>(
        value: &Value,
        unresolved: &SchemaGraph,
        resolved: &ResolvedGraph,
        extended: impl FnOnce() -> &'e ExtendedGraph,
    ) -> Self {
        let resolved_graph = resolved.graph();
        let cycles = summarize_cycles(resolved_graph.arena());
        let has_recursion = cycles.has_cycles();

        let resolved_depth = if has_recursion {
            cycles.longest
        } else {
            depth(resolved_graph).unwrap_or(0)
        };

        let extended_nodes = (!has_recursion).then(|| extended().node_count());

        Self {
            ref_count: reference_count(value),
            schema_depth: depth(unresolved).unwrap_or(0),
            resolved_depth,
            cycles,
            degrees: DegreeProfile::of(unresolved),
            width: width(unresolved),
            path_count: resolved_graph.leaf_count(),
            has_recursion,
            reachability: reachability(unresolved, resolved),
            blow_up_factor: blow_up_factor(resolved_graph.node_count(), extended_nodes, has_recursion),
            node_count: unresolved.node_count(),
            resolved_node_count: resolved_graph.node_count(),
            extended_node_count: extended_nodes.unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::NoFetch;
    use crate::graph::{build, extend, resolver::resolve};
    use serde_json::json;

    fn metrics(value: Value) -> GraphMetrics {
        let unresolved = build(&value).unwrap();
        let resolved = resolve(&unresolved, &NoFetch);
        let extended = extend(resolved.graph());
        GraphMetrics::compute(&value, &unresolved, &resolved, || &extended)
    }

    #[test]
    fn test_depth_of_tree() {
        let graph = build(&json!({ "properties": { "a": { "type": "string" } }, "title": "x" })).unwrap();
        // root -> properties -> a -> type
        assert_eq!(depth(&graph), Some(4));
    }

    #[test]
    fn test_depth_ignores_leafless_containers() {
        let graph = build(&json!({ "a": { "b": { "c": {} } }, "d": 1 })).unwrap();
        assert_eq!(depth(&graph), Some(2));
        assert_eq!(depth(&build(&json!({})).unwrap()), Some(0));
        assert_eq!(depth(&build(&json!(true)).unwrap()), Some(1));
    }

    #[test]
    fn test_reference_count_counts_duplicates() {
        let value = json!({
            "a": { "$ref": "#/x" },
            "b": { "$ref": "#/x" },
            "c": [ { "$ref": "#/y" } ],
            "d": { "$ref": 5 },
            "x": {}, "y": {}
        });
        assert_eq!(reference_count(&value), 3);
    }

    #[test]
    fn test_degree_profile_excludes_root_from_fan_out() {
        let graph = build(&json!({ "a": 1, "b": { "c": 2 } })).unwrap();
        let profile = DegreeProfile::of(&graph);
        assert_eq!(profile.fan_in.len(), graph.node_count());
        assert_eq!(profile.fan_out.len(), graph.node_count() - 1);
        assert_eq!(profile.max_fan_in(), 1);
        assert_eq!(profile.max_fan_out(), 1);
    }

    #[test]
    fn test_reachability() {
        let all_used = metrics(json!({
            "properties": { "a": { "$ref": "#/definitions/x" }, "b": { "$ref": "#/definitions/y" } },
            "definitions": { "x": {}, "y": {} }
        }));
        assert!(all_used.reachability);

        let unused = metrics(json!({
            "properties": { "a": { "$ref": "#/definitions/x" } },
            "definitions": { "x": {}, "y": {} }
        }));
        assert!(!unused.reachability);

        let broken = metrics(json!({ "properties": { "a": { "$ref": "#/definitions/z" } } }));
        assert!(!broken.reachability);
    }

    #[test]
    fn test_no_references() {
        let m = metrics(json!({ "type": "object", "properties": { "a": { "type": "string" } } }));
        assert_eq!(m.ref_count, 0);
        assert_eq!(m.width, 2);
        assert_eq!(m.schema_depth, 4);
        assert_eq!(m.resolved_depth, 4);
        assert!(!m.has_recursion);
        assert!(m.reachability);
        assert_eq!(m.blow_up_factor, 1.0);
        assert_eq!(m.node_count, m.resolved_node_count);
    }

    #[test]
    fn test_recursive_document() {
        let m = metrics(json!({
            "$ref": "#/definitions/node",
            "definitions": {
                "node": { "type": "object", "properties": { "next": { "$ref": "#/definitions/node" } } }
            }
        }));
        assert!(m.has_recursion);
        assert_eq!(m.cycles.count, 1);
        // node -> properties -> next -> node
        assert_eq!(m.cycles.shortest, 3);
        assert_eq!(m.cycles.longest, 3);
        assert_eq!(m.resolved_depth, 3);
        assert_eq!(m.blow_up_factor, 0.0);
        assert_eq!(m.extended_node_count, 0);
    }

    #[test]
    fn test_blow_up_factor() {
        assert_eq!(blow_up_factor(10, Some(15), false), 1.5);
        assert_eq!(blow_up_factor(10, Some(15), true), 0.0);
        assert_eq!(blow_up_factor(0, Some(0), false), 0.0);
    }
}
