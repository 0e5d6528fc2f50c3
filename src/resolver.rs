//! Ancestor closure resolver.
//!
//! Computes, for a set of seed nodes, every template reachable through any
//! chain of direct links, and rejects graphs that are not acyclic.
//!
//! ## Algorithm
//!
//! 1. Every seed enters the working map with an empty parent set
//! 2. Level by level, the direct parents of each frontier node are loaded
//!    once and recorded; parents not seen yet form the next frontier
//! 3. Once the frontier is empty, each seed is closed by a strict memoized
//!    walk over the working map ([`crate::expand::Expander`])
//! 4. Re-entering a node whose closure is still being built fails with
//!    [`ResolveError::CycleDetected`]
//!
//! Loading (steps 1-2) is split out into [`ParentCollector`] so that async
//! callers can drive it against a store one level at a time.

use crate::expand::{Cycle, Expander};
use crate::types::{AncestorMap, NodeId, NodeSet, NodeSetMap};

/// Error type for resolver operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// The direct-link graph is not acyclic.
    #[error("Cycle detected at node {node}: circular linkage ({})", render_path(.path))]
    CycleDetected {
        /// Node that was re-entered.
        node: NodeId,
        /// Closed cycle, starting and ending with `node`.
        path: Vec<NodeId>,
    },
    /// The parent loader failed.
    #[error("Failed to load direct parents: {0}")]
    Load(String),
}

impl From<Cycle> for ResolveError {
    fn from(cycle: Cycle) -> Self {
        Self::CycleDetected {
            node: cycle.node,
            path: cycle.path,
        }
    }
}

/// Render a node path as `a -> b -> c`.
pub fn render_path(path: &[NodeId]) -> String {
    path.iter()
        .map(NodeId::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Breadth-level loader state.
///
/// Tracks the accumulated direct parents of every visited node and the
/// frontier of nodes whose parents are still unknown.
#[derive(Debug, Clone, Default)]
pub struct ParentCollector {
    working: NodeSetMap,
    frontier: NodeSet,
}

impl ParentCollector {
    /// Start from the given seeds.
    pub fn new<I>(seeds: I) -> Self
    where
        I: IntoIterator<Item = NodeId>,
    {
        let frontier: NodeSet = seeds.into_iter().collect();
        let working = frontier.iter().map(|seed| (*seed, NodeSet::new())).collect();
        Self { working, frontier }
    }

    /// Nodes whose direct parents must be loaded next.
    pub fn frontier(&self) -> &NodeSet {
        &self.frontier
    }

    /// Whether every reachable node has been loaded.
    pub fn is_done(&self) -> bool {
        self.frontier.is_empty()
    }

    /// Record the direct parents of the current frontier and advance it.
    ///
    /// Frontier nodes missing from `loaded` have no parents. Entries for
    /// nodes outside the frontier are ignored.
    pub fn absorb(&mut self, mut loaded: NodeSetMap) {
        let frontier = std::mem::take(&mut self.frontier);
        let mut next = NodeSet::new();

        for node in &frontier {
            let parents = loaded.remove(node).unwrap_or_default();
            for parent in &parents {
                if !self.working.contains_key(parent) {
                    next.insert(*parent);
                }
            }
            self.working.entry(*node).or_default().extend(parents);
        }

        for node in &next {
            self.working.entry(*node).or_default();
        }
        self.frontier = next;
    }

    /// Accumulated direct parents of every visited node.
    pub fn working(&self) -> &NodeSetMap {
        &self.working
    }

    /// Consume the collector, returning the working map.
    pub fn into_working(self) -> NodeSetMap {
        self.working
    }
}

/// Close each seed over an already loaded direct-parent map.
///
/// Returns one entry per seed, empty when the seed has no parents.
pub fn close_ancestors<I>(seeds: I, direct_parents: &NodeSetMap) -> Result<AncestorMap, ResolveError>
where
    I: IntoIterator<Item = NodeId>,
{
    let mut expander = Expander::new(direct_parents);
    let mut ancestors = AncestorMap::new();
    for seed in seeds {
        let closure = expander.try_reach(seed)?.clone();
        ancestors.insert(seed, closure);
    }
    Ok(ancestors)
}

/// Resolve the full ancestor set of every seed.
///
/// `load_direct_parents` is called exactly once for each node reachable from
/// the seeds.
pub fn resolve_ancestors<I, F, E>(seeds: I, mut load_direct_parents: F) -> Result<AncestorMap, ResolveError>
where
    I: IntoIterator<Item = NodeId>,
    F: FnMut(&NodeId) -> Result<NodeSet, E>,
    E: std::fmt::Display,
{
    let seeds: NodeSet = seeds.into_iter().collect();
    let mut collector = ParentCollector::new(seeds.iter().copied());

    while !collector.is_done() {
        let mut loaded = NodeSetMap::new();
        for node in collector.frontier() {
            let parents = load_direct_parents(node).map_err(|e| ResolveError::Load(e.to_string()))?;
            loaded.insert(*node, parents);
        }
        collector.absorb(loaded);
    }

    close_ancestors(seeds, collector.working())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::convert::Infallible;

    fn n(id: u64) -> NodeId {
        NodeId::new(id)
    }

    fn set(ids: &[u64]) -> NodeSet {
        ids.iter().copied().map(NodeId::new).collect()
    }

    fn graph(pairs: &[(u64, u64)]) -> NodeSetMap {
        let mut edges = NodeSetMap::new();
        for (child, parent) in pairs {
            edges.entry(n(*child)).or_default().insert(n(*parent));
        }
        edges
    }

    fn from_map(edges: &NodeSetMap) -> impl FnMut(&NodeId) -> Result<NodeSet, Infallible> + '_ {
        move |node| Ok(edges.get(node).cloned().unwrap_or_default())
    }

    #[test]
    fn test_resolve_chain() {
        // host 1 -> template 10 -> template 20
        let edges = graph(&[(1, 10), (10, 20)]);
        let ancestors = resolve_ancestors([n(1), n(10)], from_map(&edges)).unwrap();

        assert_eq!(ancestors[&n(1)], set(&[10, 20]));
        assert_eq!(ancestors[&n(10)], set(&[20]));
    }

    #[test]
    fn test_only_seeds_are_returned() {
        let edges = graph(&[(1, 10), (10, 20)]);
        let ancestors = resolve_ancestors([n(1)], from_map(&edges)).unwrap();

        assert_eq!(ancestors.len(), 1);
    }

    #[test]
    fn test_seed_without_parents_is_empty() {
        let edges = NodeSetMap::new();
        let ancestors = resolve_ancestors([n(5)], from_map(&edges)).unwrap();

        assert!(ancestors[&n(5)].is_empty());
    }

    #[test]
    fn test_each_node_loaded_once() {
        // Diamond: 1 -> {2, 3}, 2 -> 4, 3 -> 4, 4 -> 5
        let edges = graph(&[(1, 2), (1, 3), (2, 4), (3, 4), (4, 5)]);
        let mut loads: BTreeMap<NodeId, usize> = BTreeMap::new();

        let ancestors = resolve_ancestors([n(1), n(2)], |node: &NodeId| {
            *loads.entry(*node).or_default() += 1;
            Ok::<_, Infallible>(edges.get(node).cloned().unwrap_or_default())
        })
        .unwrap();

        assert_eq!(ancestors[&n(1)], set(&[2, 3, 4, 5]));
        assert!(loads.values().all(|count| *count == 1));
        assert_eq!(loads.len(), 5);
    }

    #[test]
    fn test_two_node_cycle_is_rejected() {
        let edges = graph(&[(1, 2), (2, 1)]);
        let err = resolve_ancestors([n(1)], from_map(&edges)).unwrap_err();

        match err {
            ResolveError::CycleDetected { node, path } => {
                assert_eq!(node, n(1));
                assert_eq!(path, vec![n(1), n(2), n(1)]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_self_link_is_rejected() {
        let edges = graph(&[(3, 3)]);
        let err = resolve_ancestors([n(3)], from_map(&edges)).unwrap_err();
        assert!(matches!(err, ResolveError::CycleDetected { node, .. } if node == n(3)));
    }

    #[test]
    fn test_cycle_above_seed_is_rejected() {
        let edges = graph(&[(1, 10), (10, 20), (20, 30), (30, 10)]);
        let err = resolve_ancestors([n(1)], from_map(&edges)).unwrap_err();

        assert_eq!(
            err.to_string(),
            "Cycle detected at node 10: circular linkage (10 -> 20 -> 30 -> 10)"
        );
    }

    #[test]
    fn test_loader_error_is_propagated() {
        let err = resolve_ancestors([n(1)], |_: &NodeId| Err::<NodeSet, _>("connection reset")).unwrap_err();
        assert_eq!(err, ResolveError::Load("connection reset".to_string()));
    }

    #[test]
    fn test_resolution_is_idempotent_and_order_independent() {
        let edges = graph(&[(1, 10), (2, 10), (10, 20), (10, 30), (30, 40)]);

        let first = resolve_ancestors([n(1), n(2), n(10)], from_map(&edges)).unwrap();
        let second = resolve_ancestors([n(10), n(2), n(1)], from_map(&edges)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_collector_absorbs_levels() {
        let edges = graph(&[(1, 10), (10, 20)]);
        let mut collector = ParentCollector::new([n(1)]);

        assert_eq!(collector.frontier(), &set(&[1]));
        collector.absorb(edges.clone());
        assert_eq!(collector.frontier(), &set(&[10]));
        collector.absorb(edges.clone());
        assert_eq!(collector.frontier(), &set(&[20]));
        collector.absorb(NodeSetMap::new());
        assert!(collector.is_done());

        let working = collector.into_working();
        assert_eq!(working, {
            let mut expected = edges;
            expected.insert(n(20), NodeSet::new());
            expected
        });
    }

    #[test]
    fn test_close_ancestors_over_loaded_map() {
        let edges = graph(&[(1, 10), (10, 20)]);
        let ancestors = close_ancestors([n(1)], &edges).unwrap();
        assert_eq!(ancestors[&n(1)], set(&[10, 20]));
    }
}
