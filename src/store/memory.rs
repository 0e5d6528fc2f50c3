//! In-memory link store for testing and embedding.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::resolver::{close_ancestors, ResolveError};
use crate::types::{
    ClosureDelta, ClosureRow, ClosureSnapshot, DirectEdge, LinkChange, NodeId, NodeSet, NodeSetMap,
};
use crate::types::closure::{
    edges_to_map, invert, map_to_edges, map_to_rows, merge_into, remove_pairs, rows_to_map, set_of,
};
use super::{LinkStore, LinkWriter};

/// Error type for in-memory store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InMemoryError {
    /// A link scheduled for removal does not exist.
    #[error("Link not found: {0}")]
    LinkNotFound(DirectEdge),
    /// The seeded links do not form an acyclic graph.
    #[error("Invalid seed graph: {0}")]
    Resolve(#[from] ResolveError),
}

#[derive(Debug, Default)]
struct Tables {
    /// Child -> direct parents.
    parents: NodeSetMap,
    /// Node -> recorded ancestors.
    ancestors: NodeSetMap,
    /// Node -> recorded descendants (reverse index of `ancestors`).
    descendants: NodeSetMap,
}

impl Tables {
    fn apply(&mut self, links: &LinkChange, closure: &ClosureDelta) -> Result<(), InMemoryError> {
        // Validate before mutating anything.
        for edge in map_to_edges(&links.remove) {
            if !set_of(&self.parents, &edge.child).contains(&edge.parent) {
                return Err(InMemoryError::LinkNotFound(edge));
            }
        }

        remove_pairs(&mut self.parents, &links.remove);
        remove_pairs(&mut self.ancestors, &closure.delete);
        remove_pairs(&mut self.descendants, &invert(&closure.delete));

        merge_into(&mut self.parents, &links.insert);
        merge_into(&mut self.ancestors, &closure.insert);
        merge_into(&mut self.descendants, &invert(&closure.insert));

        Ok(())
    }
}

/// In-memory link store.
///
/// Uses BTreeMap/BTreeSet for deterministic iteration order. Tables sit
/// behind one `RwLock`, so each commit is atomic; write sessions are
/// serialized by an async mutex held for the session's lifetime.
#[derive(Debug, Default)]
pub struct InMemoryLinkStore {
    tables: Arc<RwLock<Tables>>,
    writer: Arc<Mutex<()>>,
}

/// Write session over an [`InMemoryLinkStore`].
pub struct InMemoryWriter {
    tables: Arc<RwLock<Tables>>,
    _session: OwnedMutexGuard<()>,
}

impl InMemoryLinkStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `edges` and their exact closure.
    pub fn from_edges<I>(edges: I) -> Result<Self, InMemoryError>
    where
        I: IntoIterator<Item = DirectEdge>,
    {
        let parents = edges_to_map(edges);
        let mut ancestors = close_ancestors(parents.keys().copied(), &parents)?;
        ancestors.retain(|_, set| !set.is_empty());
        let descendants = invert(&ancestors);

        Ok(Self {
            tables: Arc::new(RwLock::new(Tables { parents, ancestors, descendants })),
            writer: Arc::default(),
        })
    }

    /// Replace the recorded closure with arbitrary rows.
    ///
    /// The rows are not checked against the links, which makes this useful
    /// for seeding a stale closure.
    pub fn with_closure_rows<I>(self, rows: I) -> Self
    where
        I: IntoIterator<Item = ClosureRow>,
    {
        {
            let mut tables = self.tables.write();
            let ancestors = rows_to_map(rows);
            tables.descendants = invert(&ancestors);
            tables.ancestors = ancestors;
        }
        self
    }

    /// Get number of direct links.
    pub fn num_links(&self) -> usize {
        self.tables.read().parents.values().map(NodeSet::len).sum()
    }

    /// Get number of closure rows.
    pub fn num_rows(&self) -> usize {
        self.tables.read().ancestors.values().map(NodeSet::len).sum()
    }

    /// Recorded ancestors of a node.
    pub fn ancestors_of(&self, node: &NodeId) -> NodeSet {
        set_of(&self.tables.read().ancestors, node).clone()
    }

    /// Copy of the whole recorded closure.
    pub fn closure(&self) -> NodeSetMap {
        self.tables.read().ancestors.clone()
    }
}

#[async_trait]
impl LinkStore for InMemoryLinkStore {
    type Error = InMemoryError;
    type Writer = InMemoryWriter;

    async fn direct_parents(&self, nodes: &[NodeId]) -> Result<NodeSetMap, Self::Error> {
        let tables = self.tables.read();
        Ok(nodes
            .iter()
            .filter_map(|node| tables.parents.get(node).map(|parents| (*node, parents.clone())))
            .collect())
    }

    async fn load_closure(&self, nodes: &[NodeId]) -> Result<ClosureSnapshot, Self::Error> {
        let tables = self.tables.read();
        let mut snapshot = ClosureSnapshot::default();

        for node in nodes {
            if let Some(ancestors) = tables.ancestors.get(node) {
                snapshot.ancestors.insert(*node, ancestors.clone());
            }
            if let Some(descendants) = tables.descendants.get(node) {
                snapshot.descendants.insert(*node, descendants.clone());
            }
        }

        Ok(snapshot)
    }

    async fn begin_write(&self) -> Result<Self::Writer, Self::Error> {
        let session = Arc::clone(&self.writer).lock_owned().await;
        Ok(InMemoryWriter {
            tables: Arc::clone(&self.tables),
            _session: session,
        })
    }

    async fn direct_edges(&self) -> Result<Vec<DirectEdge>, Self::Error> {
        Ok(map_to_edges(&self.tables.read().parents))
    }

    async fn closure_rows(&self) -> Result<Vec<ClosureRow>, Self::Error> {
        Ok(map_to_rows(&self.tables.read().ancestors))
    }
}

#[async_trait]
impl LinkWriter for InMemoryWriter {
    type Error = InMemoryError;

    async fn commit(self, links: &LinkChange, closure: &ClosureDelta) -> Result<(), Self::Error> {
        self.tables.write().apply(links, closure)
    }
}
