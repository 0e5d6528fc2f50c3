//! Strongly-typed batches of node sets.
//!
//! Every "map from node to set of nodes" in the engine is a [`NodeSetMap`].
//! Values are sets, so an ancestor can never be recorded twice for the same
//! node. A key that is absent from a map is treated as an empty set.

use std::collections::{BTreeMap, BTreeSet};
use serde::{Deserialize, Serialize};

use super::edge::{ClosureRow, DirectEdge};
use super::node::NodeId;

/// Set of nodes, ordered for determinism.
pub type NodeSet = BTreeSet<NodeId>;

/// Map from node to a set of related nodes (parents, ancestors or descendants).
pub type NodeSetMap = BTreeMap<NodeId, NodeSet>;

/// Full ancestor set per node, as returned by the resolver.
pub type AncestorMap = NodeSetMap;

static EMPTY: NodeSet = BTreeSet::new();

/// Look up a node's set, treating a missing key as empty.
pub fn set_of<'a>(map: &'a NodeSetMap, node: &NodeId) -> &'a NodeSet {
    map.get(node).unwrap_or(&EMPTY)
}

/// Union every entry of `source` into `target`.
pub fn merge_into(target: &mut NodeSetMap, source: &NodeSetMap) {
    for (node, related) in source {
        if related.is_empty() {
            continue;
        }
        target.entry(*node).or_default().extend(related.iter().copied());
    }
}

/// Remove every (key, value) pair of `pairs` from `target`, dropping keys
/// whose set becomes empty.
pub fn remove_pairs(target: &mut NodeSetMap, pairs: &NodeSetMap) {
    for (node, related) in pairs {
        if let Some(set) = target.get_mut(node) {
            for value in related {
                set.remove(value);
            }
            if set.is_empty() {
                target.remove(node);
            }
        }
    }
}

/// Drop keys with empty sets.
pub fn prune_empty(map: &mut NodeSetMap) {
    map.retain(|_, set| !set.is_empty());
}

/// Reverse every pair: `a -> {b}` becomes `b -> {a}`.
///
/// Inverting an ancestor map yields the descendant map for the same nodes.
pub fn invert(map: &NodeSetMap) -> NodeSetMap {
    let mut inverted = NodeSetMap::new();
    for (node, related) in map {
        for other in related {
            inverted.entry(*other).or_default().insert(*node);
        }
    }
    inverted
}

/// Total number of (key, value) pairs.
pub fn count_pairs(map: &NodeSetMap) -> usize {
    map.values().map(BTreeSet::len).sum()
}

/// Group direct edges by child.
pub fn edges_to_map<I>(edges: I) -> NodeSetMap
where
    I: IntoIterator<Item = DirectEdge>,
{
    let mut map = NodeSetMap::new();
    for edge in edges {
        map.entry(edge.child).or_default().insert(edge.parent);
    }
    map
}

/// Flatten a child -> parents map into sorted direct edges.
pub fn map_to_edges(map: &NodeSetMap) -> Vec<DirectEdge> {
    map.iter()
        .flat_map(|(child, parents)| parents.iter().map(move |parent| DirectEdge::new(*child, *parent)))
        .collect()
}

/// Group closure rows by node.
pub fn rows_to_map<I>(rows: I) -> NodeSetMap
where
    I: IntoIterator<Item = ClosureRow>,
{
    let mut map = NodeSetMap::new();
    for row in rows {
        map.entry(row.node).or_default().insert(row.ancestor);
    }
    map
}

/// Flatten a node -> ancestors map into sorted closure rows.
pub fn map_to_rows(map: &NodeSetMap) -> Vec<ClosureRow> {
    map.iter()
        .flat_map(|(node, ancestors)| ancestors.iter().map(move |ancestor| ClosureRow::new(*node, *ancestor)))
        .collect()
}

/// Currently recorded closure of a set of nodes.
///
/// `ancestors` holds the ancestor set of each loaded node and
/// `descendants` the descendant set of each loaded node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureSnapshot {
    /// Node -> recorded ancestors.
    pub ancestors: NodeSetMap,
    /// Node -> nodes that record it as an ancestor.
    pub descendants: NodeSetMap,
}

impl ClosureSnapshot {
    /// Create a snapshot from explicit maps.
    pub fn new(ancestors: NodeSetMap, descendants: NodeSetMap) -> Self {
        Self { ancestors, descendants }
    }

    /// Recorded ancestors of a node.
    pub fn ancestors_of(&self, node: &NodeId) -> &NodeSet {
        set_of(&self.ancestors, node)
    }

    /// Recorded descendants of a node.
    pub fn descendants_of(&self, node: &NodeId) -> &NodeSet {
        set_of(&self.descendants, node)
    }

    /// Apply a closure delta to the in-memory snapshot.
    ///
    /// Deletes are applied before inserts, matching [`ClosureDelta`] semantics.
    /// Only nodes already present in the snapshot or touched by the delta are
    /// updated.
    pub fn advance(&mut self, delta: &ClosureDelta) {
        remove_pairs(&mut self.ancestors, &delta.delete);
        remove_pairs(&mut self.descendants, &invert(&delta.delete));
        merge_into(&mut self.ancestors, &delta.insert);
        merge_into(&mut self.descendants, &invert(&delta.insert));
    }
}

/// Closure rows to delete and insert.
///
/// Deletes are applied before inserts, so a row present in both sets
/// survives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureDelta {
    /// Node -> ancestors whose rows must be inserted.
    pub insert: NodeSetMap,
    /// Node -> ancestors whose rows must be deleted.
    pub delete: NodeSetMap,
}

impl ClosureDelta {
    /// Create a delta from explicit maps, dropping empty sets.
    pub fn new(mut insert: NodeSetMap, mut delete: NodeSetMap) -> Self {
        prune_empty(&mut insert);
        prune_empty(&mut delete);
        Self { insert, delete }
    }

    /// Whether the delta changes nothing.
    pub fn is_empty(&self) -> bool {
        self.insert.values().all(BTreeSet::is_empty) && self.delete.values().all(BTreeSet::is_empty)
    }

    /// Number of rows to insert.
    pub fn insert_count(&self) -> usize {
        count_pairs(&self.insert)
    }

    /// Number of rows to delete.
    pub fn delete_count(&self) -> usize {
        count_pairs(&self.delete)
    }

    /// Rows to insert, sorted.
    pub fn insert_rows(&self) -> Vec<ClosureRow> {
        map_to_rows(&self.insert)
    }

    /// Rows to delete, sorted.
    pub fn delete_rows(&self) -> Vec<ClosureRow> {
        map_to_rows(&self.delete)
    }
}

/// Batch of direct-link changes, keyed child -> parents.
///
/// Removals are applied before insertions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkChange {
    /// Child -> parents to link.
    pub insert: NodeSetMap,
    /// Child -> parents to unlink.
    pub remove: NodeSetMap,
}

impl LinkChange {
    /// Create an empty change.
    pub fn new() -> Self {
        Self::default()
    }

    /// Change that only links.
    pub fn linking(insert: NodeSetMap) -> Self {
        Self { insert, remove: NodeSetMap::new() }
    }

    /// Change that only unlinks.
    pub fn unlinking(remove: NodeSetMap) -> Self {
        Self { insert: NodeSetMap::new(), remove }
    }

    /// Add a link to the batch.
    pub fn link(mut self, child: impl Into<NodeId>, parent: impl Into<NodeId>) -> Self {
        self.insert.entry(child.into()).or_default().insert(parent.into());
        self
    }

    /// Add an unlink to the batch.
    pub fn unlink(mut self, child: impl Into<NodeId>, parent: impl Into<NodeId>) -> Self {
        self.remove.entry(child.into()).or_default().insert(parent.into());
        self
    }

    /// Whether the batch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.insert.values().all(BTreeSet::is_empty) && self.remove.values().all(BTreeSet::is_empty)
    }

    /// Every child touched by the batch.
    pub fn children(&self) -> NodeSet {
        self.insert.keys().chain(self.remove.keys()).copied().collect()
    }

    /// Every node touched by the batch, children and parents.
    pub fn endpoints(&self) -> NodeSet {
        let mut nodes = self.children();
        for parents in self.insert.values().chain(self.remove.values()) {
            nodes.extend(parents.iter().copied());
        }
        nodes
    }

    /// First requested link from a node to itself, if any.
    pub fn self_link(&self) -> Option<DirectEdge> {
        self.insert
            .iter()
            .find(|(child, parents)| parents.contains(child))
            .map(|(child, _)| DirectEdge::new(*child, *child))
    }
}
