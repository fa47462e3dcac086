//! Traversal Protocol
//!
//! Visits every node of a graph exactly once. Counting policy lives in the
//! visitors; see [`crate::counters`] for the keyword counters.

use super::node::Node;
use super::SchemaGraph;

/// Receives each node of a traversal
pub trait Visitor {
    fn visit(&mut self, node: &Node);
}

impl<F: FnMut(&Node)> Visitor for F {
    fn visit(&mut self, node: &Node) {
        self(node)
    }
}

/// A visitor that tallies matching nodes under a report key.
///
/// Counters carry per-document state; build a fresh set (or call
/// [`reset`](KeywordCounter::reset)) for every document.
pub trait KeywordCounter: Visitor + Send {
    /// Key under which the count is reported
    fn key(&self) -> &str;

    fn count(&self) -> usize;

    fn reset(&mut self);
}

/// Visit every node once, in handle order
pub fn traverse<V: Visitor + ?Sized>(graph: &SchemaGraph, visitor: &mut V) {
    for (_, node) in graph.nodes() {
        visitor.visit(node);
    }
}

/// One pass feeding every counter
pub fn traverse_counters(graph: &SchemaGraph, counters: &mut [Box<dyn KeywordCounter>]) {
    for (_, node) in graph.nodes() {
        for counter in counters.iter_mut() {
            counter.visit(node);
        }
    }
}
