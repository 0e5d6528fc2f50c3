//! Memoized chain expansion.
//!
//! Flattens chains of `node -> {related}` entries into the full set of nodes
//! reachable from each node. The walk is iterative (explicit stack plus an
//! on-path set), so deep template hierarchies cannot overflow the call stack,
//! and all traversal state lives in the [`Expander`] owned by one call.
//!
//! ## Modes
//!
//! - [`Expander::reach`] is tolerant: an edge back into the current path is
//!   skipped, so malformed (cyclic) input still terminates.
//! - [`Expander::try_reach`] is strict: an edge back into the current path
//!   aborts with the offending cycle.

use std::collections::BTreeSet;

use crate::types::{NodeId, NodeSet, NodeSetMap};
use crate::types::closure::set_of;

/// A cycle found by a strict walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle {
    /// The node whose re-entry closed the cycle.
    pub node: NodeId,
    /// Nodes along the cycle, starting and ending with `node`.
    pub path: Vec<NodeId>,
}

/// Depth-first expansion with a per-run memo table.
#[derive(Debug)]
pub struct Expander<'a> {
    edges: &'a NodeSetMap,
    closed: NodeSetMap,
}

impl<'a> Expander<'a> {
    /// Create an expander over `edges` (node -> directly related nodes).
    pub fn new(edges: &'a NodeSetMap) -> Self {
        Self {
            edges,
            closed: NodeSetMap::new(),
        }
    }

    /// Every node reachable from `node` through one or more hops.
    ///
    /// Never contains `node` itself. Back edges are ignored.
    pub fn reach(&mut self, node: NodeId) -> &NodeSet {
        self.walk_tolerant(node);
        set_of(&self.closed, &node)
    }

    /// Like [`Expander::reach`], but fails on the first cycle encountered.
    pub fn try_reach(&mut self, node: NodeId) -> Result<&NodeSet, Cycle> {
        self.walk_strict(node)?;
        Ok(set_of(&self.closed, &node))
    }

    /// Consume the expander, returning every memoized closure.
    pub fn into_closed(self) -> NodeSetMap {
        self.closed
    }

    fn related(&self, node: &NodeId) -> std::vec::IntoIter<NodeId> {
        set_of(self.edges, node).iter().copied().collect::<Vec<_>>().into_iter()
    }

    fn walk_tolerant(&mut self, start: NodeId) {
        let Some(mut walk) = self.begin(start) else {
            return;
        };
        while !matches!(self.step(&mut walk), Step::Done) {}
    }

    fn walk_strict(&mut self, start: NodeId) -> Result<(), Cycle> {
        let Some(mut walk) = self.begin(start) else {
            return Ok(());
        };
        loop {
            match self.step(&mut walk) {
                Step::Advanced => {}
                Step::BackEdge(next) => return Err(walk.cycle_to(next)),
                Step::Done => return Ok(()),
            }
        }
    }

    /// `None` when `start` is already closed.
    fn begin(&self, start: NodeId) -> Option<Walk> {
        if self.closed.contains_key(&start) {
            return None;
        }
        Some(Walk {
            path: vec![start],
            on_path: BTreeSet::from([start]),
            stack: vec![(start, self.related(&start))],
        })
    }

    /// Advance the walk by one edge or one finished node.
    fn step(&mut self, walk: &mut Walk) -> Step {
        let Some(frame) = walk.stack.last_mut() else {
            return Step::Done;
        };
        let current = frame.0;

        match frame.1.next() {
            Some(next) if self.closed.contains_key(&next) => Step::Advanced,
            Some(next) if walk.on_path.contains(&next) => Step::BackEdge(next),
            Some(next) => {
                walk.on_path.insert(next);
                walk.path.push(next);
                walk.stack.push((next, self.related(&next)));
                Step::Advanced
            }
            None => {
                walk.stack.pop();
                walk.path.pop();
                walk.on_path.remove(&current);
                self.close(current);
                Step::Advanced
            }
        }
    }

    /// Memoize `node` from its direct edges and their closed reach.
    fn close(&mut self, node: NodeId) {
        let mut reach = NodeSet::new();
        for next in set_of(self.edges, &node) {
            reach.insert(*next);
            if let Some(beyond) = self.closed.get(next) {
                reach.extend(beyond.iter().copied());
            }
        }
        reach.remove(&node);
        self.closed.insert(node, reach);
    }
}

/// Traversal state of one walk.
struct Walk {
    path: Vec<NodeId>,
    on_path: BTreeSet<NodeId>,
    stack: Vec<(NodeId, std::vec::IntoIter<NodeId>)>,
}

impl Walk {
    /// The cycle closed by an edge back into `node`, which is on the path.
    fn cycle_to(&self, node: NodeId) -> Cycle {
        let from = self.path.iter().position(|n| *n == node).unwrap_or(0);
        let mut path = self.path[from..].to_vec();
        path.push(node);
        Cycle { node, path }
    }
}

enum Step {
    Advanced,
    BackEdge(NodeId),
    Done,
}

/// Flattened reach of each root over `edges`.
///
/// Every root gets an entry, empty when nothing is reachable from it.
pub fn expand<I>(edges: &NodeSetMap, roots: I) -> NodeSetMap
where
    I: IntoIterator<Item = NodeId>,
{
    let mut expander = Expander::new(edges);
    roots
        .into_iter()
        .map(|root| (root, expander.reach(root).clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(id: u64) -> NodeId {
        NodeId::new(id)
    }

    fn set(ids: &[u64]) -> NodeSet {
        ids.iter().copied().map(NodeId::new).collect()
    }

    fn graph(pairs: &[(u64, u64)]) -> NodeSetMap {
        let mut edges = NodeSetMap::new();
        for (from, to) in pairs {
            edges.entry(n(*from)).or_default().insert(n(*to));
        }
        edges
    }

    #[test]
    fn test_expand_chain() {
        let edges = graph(&[(1, 2), (2, 3), (3, 4)]);
        let reach = expand(&edges, [n(1), n(3), n(4)]);

        assert_eq!(reach[&n(1)], set(&[2, 3, 4]));
        assert_eq!(reach[&n(3)], set(&[4]));
        assert!(reach[&n(4)].is_empty());
    }

    #[test]
    fn test_expand_diamond() {
        let edges = graph(&[(1, 2), (1, 3), (2, 4), (3, 4), (4, 5)]);
        let reach = expand(&edges, [n(1)]);

        assert_eq!(reach[&n(1)], set(&[2, 3, 4, 5]));
    }

    #[test]
    fn test_memo_is_reused() {
        let edges = graph(&[(1, 3), (2, 3), (3, 4)]);
        let mut expander = Expander::new(&edges);

        assert_eq!(expander.reach(n(1)), &set(&[3, 4]));
        assert_eq!(expander.reach(n(2)), &set(&[3, 4]));

        let closed = expander.into_closed();
        assert_eq!(closed[&n(3)], set(&[4]));
        assert!(closed[&n(4)].is_empty());
    }

    #[test]
    fn test_tolerant_walk_terminates_on_cycle() {
        let edges = graph(&[(1, 2), (2, 3), (3, 1)]);
        let mut expander = Expander::new(&edges);

        let reach = expander.reach(n(1)).clone();
        assert!(reach.contains(&n(2)));
        assert!(reach.contains(&n(3)));
        assert!(!reach.contains(&n(1)));
    }

    #[test]
    fn test_strict_walk_reports_cycle_path() {
        let edges = graph(&[(1, 2), (2, 3), (3, 2)]);
        let mut expander = Expander::new(&edges);

        let cycle = expander.try_reach(n(1)).unwrap_err();
        assert_eq!(cycle.path, vec![n(2), n(3), n(2)]);
        assert_eq!(cycle.node, n(2));
    }

    #[test]
    fn test_strict_walk_reports_self_loop() {
        let edges = graph(&[(7, 7)]);
        let cycle = Expander::new(&edges).try_reach(n(7)).unwrap_err();
        assert_eq!(cycle.path, vec![n(7), n(7)]);
    }

    #[test]
    fn test_tolerant_walk_closes_every_node_on_cycle() {
        let edges = graph(&[(1, 2), (2, 3), (3, 1), (3, 4)]);
        let mut expander = Expander::new(&edges);
        expander.reach(n(1));

        let closed = expander.into_closed();
        assert_eq!(closed.len(), 4);
        assert_eq!(closed[&n(4)], NodeSet::new());
        assert!(closed[&n(3)].contains(&n(4)));
    }

    #[test]
    fn test_strict_walk_after_tolerant_uses_memo() {
        // Once tolerantly closed, the cyclic nodes are memoized and not re-walked.
        let edges = graph(&[(1, 2), (2, 1)]);
        let mut expander = Expander::new(&edges);
        expander.reach(n(1));
        assert!(expander.try_reach(n(1)).is_ok());

        assert!(Expander::new(&edges).try_reach(n(1)).is_err());
    }

    #[test]
    fn test_deep_chain_does_not_recurse() {
        let pairs: Vec<(u64, u64)> = (0..2_000).map(|i| (i, i + 1)).collect();
        let edges = graph(&pairs);

        let mut expander = Expander::new(&edges);
        assert_eq!(expander.reach(n(0)).len(), 2_000);
    }
}
