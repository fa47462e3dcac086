//! Elementary Cycle Enumeration
//!
//! Johnson's algorithm over the containment arena. Cycles are reported to a
//! callback by node count rather than collected, since a heavily recursive
//! schema can have far more cycles than nodes.

use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use std::collections::{HashMap, HashSet};

use super::SchemaArena;

/// Count and length range of all elementary cycles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub count: usize,
    /// Node count of the shortest cycle, 0 without cycles
    pub shortest: usize,
    /// Node count of the longest cycle, 0 without cycles
    pub longest: usize,
}

impl CycleSummary {
    pub fn has_cycles(&self) -> bool {
        self.count > 0
    }

    fn record(&mut self, length: usize) {
        self.shortest = if self.count == 0 { length } else { self.shortest.min(length) };
        self.longest = self.longest.max(length);
        self.count += 1;
    }
}

/// Summarize every elementary cycle of the arena
pub fn summarize_cycles(arena: &SchemaArena) -> CycleSummary {
    let mut summary = CycleSummary::default();
    for_each_cycle(arena, |length| summary.record(length));
    summary
}

/// Call `visit` with the node count of each elementary cycle
pub fn for_each_cycle(arena: &SchemaArena, mut visit: impl FnMut(usize)) {
    let handles: Vec<_> = arena.node_indices().collect();
    let position: HashMap<_, usize> = handles.iter().enumerate().map(|(i, h)| (*h, i)).collect();

    let adjacency: Vec<Vec<usize>> = handles
        .iter()
        .map(|&h| {
            let mut targets: Vec<usize> = arena
                .neighbors(h)
                .filter_map(|t| position.get(&t).copied())
                .collect();
            targets.sort_unstable();
            targets.dedup();
            targets
        })
        .collect();

    let all: Vec<usize> = (0..handles.len()).collect();
    let mut work = cyclic_components(&adjacency, &all);

    while let Some(mut component) = work.pop() {
        component.sort_unstable();
        let start = component[0];
        let members: HashSet<usize> = component.iter().copied().collect();
        circuits_through(start, &adjacency, &members, &mut visit);

        // Every cycle through `start` is found; continue without it
        work.extend(cyclic_components(&adjacency, &component[1..]));
    }
}

/// Strongly connected components of the induced subgraph that can hold a cycle
fn cyclic_components(adjacency: &[Vec<usize>], members: &[usize]) -> Vec<Vec<usize>> {
    let mut sub: DiGraph<usize, ()> = DiGraph::with_capacity(members.len(), members.len());
    let local: HashMap<usize, _> = members.iter().map(|&m| (m, sub.add_node(m))).collect();

    for &m in members {
        for target in &adjacency[m] {
            if let (Some(&s), Some(&t)) = (local.get(&m), local.get(target)) {
                sub.add_edge(s, t, ());
            }
        }
    }

    tarjan_scc(&sub)
        .into_iter()
        .map(|component| component.into_iter().map(|i| sub[i]).collect::<Vec<usize>>())
        .filter(|component| {
            component.len() > 1 || component.iter().any(|&n| adjacency[n].contains(&n))
        })
        .collect()
}

/// Johnson's CIRCUIT search from `start`, restricted to `members`
fn circuits_through(
    start: usize,
    adjacency: &[Vec<usize>],
    members: &HashSet<usize>,
    visit: &mut impl FnMut(usize),
) {
    let neighbors = |node: usize| -> Vec<usize> {
        adjacency[node].iter().copied().filter(|n| members.contains(n)).collect()
    };

    let mut blocked: HashSet<usize> = HashSet::from([start]);
    let mut blocked_by: HashMap<usize, HashSet<usize>> = HashMap::new();
    let mut path_len = 1usize;
    let mut closed = vec![false];
    let mut stack = vec![(start, neighbors(start))];

    while let Some(top) = stack.last_mut() {
        let node = top.0;
        match top.1.pop() {
            Some(next) if next == start => {
                visit(path_len);
                if let Some(flag) = closed.last_mut() {
                    *flag = true;
                }
            }
            Some(next) => {
                if blocked.insert(next) {
                    path_len += 1;
                    closed.push(false);
                    stack.push((next, neighbors(next)));
                }
            }
            None => {
                let found = closed.pop().unwrap_or(false);
                if found {
                    unblock(node, &mut blocked, &mut blocked_by);
                } else {
                    for n in neighbors(node) {
                        blocked_by.entry(n).or_default().insert(node);
                    }
                }
                stack.pop();
                path_len -= 1;
                if found {
                    if let Some(flag) = closed.last_mut() {
                        *flag = true;
                    }
                }
            }
        }
    }
}

fn unblock(node: usize, blocked: &mut HashSet<usize>, blocked_by: &mut HashMap<usize, HashSet<usize>>) {
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if blocked.remove(&current) {
            if let Some(waiting) = blocked_by.remove(&current) {
                stack.extend(waiting);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;

    fn arena(nodes: usize, edges: &[(usize, usize)]) -> SchemaArena {
        let mut arena = SchemaArena::default();
        let handles: Vec<_> = (0..nodes).map(|i| arena.add_node(Node::object(i.to_string()))).collect();
        for (ordinal, &(s, t)) in edges.iter().enumerate() {
            arena.add_edge(handles[s], handles[t], ordinal);
        }
        arena
    }

    #[test]
    fn test_acyclic() {
        let summary = summarize_cycles(&arena(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]));
        assert_eq!(summary, CycleSummary::default());
        assert!(!summary.has_cycles());
    }

    #[test]
    fn test_single_loop() {
        let summary = summarize_cycles(&arena(4, &[(0, 1), (1, 2), (2, 3), (3, 1)]));
        assert_eq!(summary, CycleSummary { count: 1, shortest: 3, longest: 3 });
    }

    #[test]
    fn test_self_loop() {
        let summary = summarize_cycles(&arena(2, &[(0, 1), (1, 1)]));
        assert_eq!(summary, CycleSummary { count: 1, shortest: 1, longest: 1 });
    }

    #[test]
    fn test_overlapping_cycles() {
        // 0 -> 1 -> 0, 0 -> 1 -> 2 -> 0, 2 -> 2
        let summary = summarize_cycles(&arena(3, &[(0, 1), (1, 0), (1, 2), (2, 0), (2, 2)]));
        assert_eq!(summary, CycleSummary { count: 3, shortest: 1, longest: 3 });
    }

    #[test]
    fn test_complete_graph() {
        // K3 with both directions: three 2-cycles and two 3-cycles
        let summary = summarize_cycles(&arena(3, &[(0, 1), (1, 0), (1, 2), (2, 1), (0, 2), (2, 0)]));
        assert_eq!(summary, CycleSummary { count: 5, shortest: 2, longest: 3 });
    }
}
