//! Store-backed link engine.
//!
//! Ties the pure core to a [`LinkStore`]: loads a snapshot of the affected
//! nodes, validates the batch, computes the exact closure delta and writes
//! links and delta in one atomic store call.
//!
//! ## Planning a batch
//!
//! 1. Reject self links and removals of links that do not exist
//! 2. Load the recorded closure of every endpoint, then the recorded
//!    ancestors of every descendant of the linked children
//! 3. Removals: diff with the configured [`UnlinkStrategy`], then advance the
//!    in-memory snapshot past the deletion
//! 4. Insertions: resolve the post-change direct graph of the children and
//!    their descendants strictly (cycle rejection), optionally check for
//!    double linkage, then diff
//!
//! [`LinkEngine::apply`] opens a store write session before reading the
//! snapshot and commits the delta through it, so no other batch can change
//! the state a delta was planned against.

use std::sync::Arc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::audit::{audit_closure, AuditReport};
use crate::config::{EngineConfig, UnlinkStrategy};
use crate::differ::{links_to_create, links_to_delete, links_to_delete_exact};
use crate::linkage::{find_double_linkage, DoubleLinkage};
use crate::resolver::{close_ancestors, ParentCollector, ResolveError};
use crate::store::{LinkStore, LinkWriter};
use crate::types::{
    AncestorMap, ClosureDelta, ClosureSnapshot, DirectEdge, LinkChange, NodeId, NodeSet, NodeSetMap,
};
use crate::types::closure::{count_pairs, map_to_edges, remove_pairs, set_of};

/// Error type for engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A node was linked to itself.
    #[error("Cannot link node {0} to itself")]
    SelfLink(NodeId),
    /// A link scheduled for removal does not exist.
    #[error("Link not found: {0}")]
    UnknownLink(DirectEdge),
    /// The resulting graph would contain a cycle, or loading failed.
    #[error("Invalid linkage: {0}")]
    Resolve(#[from] ResolveError),
    /// A node would inherit a template twice.
    #[error("Invalid linkage: {0}")]
    DoubleLinkage(#[from] DoubleLinkage),
    /// Store error.
    #[error("Store error: {0}")]
    Store(String),
}

impl EngineError {
    /// Create a store error from any error type.
    pub fn from_store<E: std::error::Error>(e: E) -> Self {
        Self::Store(e.to_string())
    }

    /// Whether the batch was rejected because of the caller's input.
    pub fn is_validation(&self) -> bool {
        match self {
            Self::SelfLink(_) | Self::UnknownLink(_) | Self::DoubleLinkage(_) => true,
            Self::Resolve(ResolveError::CycleDetected { .. }) => true,
            Self::Resolve(ResolveError::Load(_)) | Self::Store(_) => false,
        }
    }
}

/// Outcome of an applied batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeReport {
    /// Direct links inserted.
    pub links_inserted: usize,
    /// Direct links removed.
    pub links_removed: usize,
    /// Closure rows written.
    pub delta: ClosureDelta,
}

/// Link engine over a storage backend.
pub struct LinkEngine<S: LinkStore> {
    store: Arc<S>,
    config: EngineConfig,
}

impl<S: LinkStore + 'static> LinkEngine<S> {
    /// Create a new engine.
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get a reference to the store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Resolve the ancestor sets of `nodes` from the recorded direct links.
    pub async fn ancestors(&self, nodes: &[NodeId]) -> Result<AncestorMap, EngineError> {
        let graph = self.load_parent_graph(nodes.iter().copied(), &LinkChange::new()).await?;
        Ok(close_ancestors(nodes.iter().copied(), &graph)?)
    }

    /// Link children to parents (child -> parents).
    pub async fn link(&self, insert: NodeSetMap) -> Result<ChangeReport, EngineError> {
        self.apply(&LinkChange::linking(insert)).await
    }

    /// Unlink children from parents (child -> parents).
    pub async fn unlink(&self, remove: NodeSetMap) -> Result<ChangeReport, EngineError> {
        self.apply(&LinkChange::unlinking(remove)).await
    }

    /// Plan a batch and write it to the store.
    ///
    /// The snapshot is read and the delta written inside one store write
    /// session, so concurrent batches are applied one after the other.
    pub async fn apply(&self, change: &LinkChange) -> Result<ChangeReport, EngineError> {
        if change.is_empty() {
            return Ok(ChangeReport::default());
        }

        let writer = self.store.begin_write().await.map_err(EngineError::from_store)?;
        let delta = self.plan(change).await?;
        writer.commit(change, &delta).await.map_err(EngineError::from_store)?;

        debug!(
            links_inserted = count_pairs(&change.insert),
            links_removed = count_pairs(&change.remove),
            rows_inserted = delta.insert_count(),
            rows_deleted = delta.delete_count(),
            "Applied link change"
        );

        Ok(ChangeReport {
            links_inserted: count_pairs(&change.insert),
            links_removed: count_pairs(&change.remove),
            delta,
        })
    }

    /// Compute the closure delta of a batch without writing anything.
    ///
    /// Holds no write session: the delta is only exact as long as no other
    /// batch is written before it.
    pub async fn plan(&self, change: &LinkChange) -> Result<ClosureDelta, EngineError> {
        if let Some(edge) = change.self_link() {
            warn!(node = %edge.child, "Rejected self link");
            return Err(EngineError::SelfLink(edge.child));
        }
        self.check_removals_exist(change).await?;

        let mut snapshot = self.load_snapshot(change).await?;

        let deleted = self.plan_removals(change, &snapshot).await?;
        snapshot.advance(&ClosureDelta::new(NodeSetMap::new(), deleted.clone()));

        let created = self.plan_insertions(change, &snapshot).await?;

        let delta = ClosureDelta::new(created, deleted);
        debug!(
            children = change.children().len(),
            rows_inserted = delta.insert_count(),
            rows_deleted = delta.delete_count(),
            unlink_strategy = %self.config.unlink_strategy,
            "Planned link change"
        );
        Ok(delta)
    }

    /// Audit the stored closure, optionally writing the repair delta.
    ///
    /// Links and rows are read inside a write session, so the report never
    /// mixes two store states and the repair lands on the state it was
    /// computed from.
    pub async fn audit(&self, repair: bool) -> Result<AuditReport, EngineError> {
        let writer = self.store.begin_write().await.map_err(EngineError::from_store)?;
        let edges = self.store.direct_edges().await.map_err(EngineError::from_store)?;
        let rows = self.store.closure_rows().await.map_err(EngineError::from_store)?;
        let report = audit_closure(&edges, &rows)?;

        if !report.is_consistent() {
            warn!(
                missing_rows = report.missing_rows(),
                stale_rows = report.stale_rows(),
                "Stored closure does not match direct links"
            );
            if repair {
                writer
                    .commit(&LinkChange::new(), &report.repair)
                    .await
                    .map_err(EngineError::from_store)?;
                debug!("Closure repaired");
            }
        }

        Ok(report)
    }

    async fn check_removals_exist(&self, change: &LinkChange) -> Result<(), EngineError> {
        if change.remove.is_empty() {
            return Ok(());
        }
        let children: Vec<NodeId> = change.remove.keys().copied().collect();
        let existing = self.store.direct_parents(&children).await.map_err(EngineError::from_store)?;

        for edge in map_to_edges(&change.remove) {
            if !set_of(&existing, &edge.child).contains(&edge.parent) {
                warn!(child = %edge.child, parent = %edge.parent, "Rejected removal of unknown link");
                return Err(EngineError::UnknownLink(edge));
            }
        }
        Ok(())
    }

    /// Recorded closure of every endpoint, plus the recorded ancestors of
    /// every descendant of the children.
    async fn load_snapshot(&self, change: &LinkChange) -> Result<ClosureSnapshot, EngineError> {
        let endpoints: Vec<NodeId> = change.endpoints().into_iter().collect();
        let mut snapshot = self.store.load_closure(&endpoints).await.map_err(EngineError::from_store)?;

        let descendants: Vec<NodeId> = change
            .children()
            .iter()
            .flat_map(|child| snapshot.descendants_of(child).iter().copied())
            .filter(|node| !snapshot.ancestors.contains_key(node))
            .collect::<NodeSet>()
            .into_iter()
            .collect();

        if !descendants.is_empty() {
            let extra = self.store.load_closure(&descendants).await.map_err(EngineError::from_store)?;
            snapshot.ancestors.extend(extra.ancestors);
        }
        Ok(snapshot)
    }

    async fn plan_removals(
        &self,
        change: &LinkChange,
        snapshot: &ClosureSnapshot,
    ) -> Result<NodeSetMap, EngineError> {
        if change.remove.is_empty() {
            return Ok(NodeSetMap::new());
        }

        let deleted = match self.config.unlink_strategy {
            UnlinkStrategy::Cascade => {
                links_to_delete(&change.remove, &snapshot.ancestors, &snapshot.descendants)
            }
            UnlinkStrategy::Exact => {
                let candidates = links_to_delete(&change.remove, &snapshot.ancestors, &snapshot.descendants);
                let direct = self
                    .load_parent_graph(candidates.keys().copied(), &LinkChange::new())
                    .await?;
                links_to_delete_exact(&change.remove, &snapshot.ancestors, &snapshot.descendants, &direct)
            }
        };
        Ok(deleted)
    }

    async fn plan_insertions(
        &self,
        change: &LinkChange,
        snapshot: &ClosureSnapshot,
    ) -> Result<NodeSetMap, EngineError> {
        if change.insert.is_empty() {
            return Ok(NodeSetMap::new());
        }

        let mut affected: NodeSet = change.insert.keys().copied().collect();
        for child in change.insert.keys() {
            affected.extend(snapshot.descendants_of(child).iter().copied());
        }

        let graph = self.load_parent_graph(affected.iter().copied(), change).await?;
        let mut seeds = affected.clone();
        if self.config.forbid_double_linkage {
            for node in &affected {
                seeds.extend(set_of(&graph, node).iter().copied());
            }
        }

        let resolved = match close_ancestors(seeds, &graph) {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(error = %e, "Rejected link change");
                return Err(e.into());
            }
        };

        if self.config.forbid_double_linkage {
            if let Some(found) = find_double_linkage(&graph, &resolved, &affected) {
                warn!(
                    node = %found.node,
                    template = %found.template,
                    "Rejected double linkage"
                );
                return Err(found.into());
            }
        }

        Ok(links_to_create(&change.insert, &snapshot.ancestors, &snapshot.descendants))
    }

    /// Direct-parent graph reachable from `seeds`, with `overlay` applied
    /// (its removals dropped and its insertions added).
    async fn load_parent_graph<I>(&self, seeds: I, overlay: &LinkChange) -> Result<NodeSetMap, EngineError>
    where
        I: IntoIterator<Item = NodeId>,
    {
        let mut collector = ParentCollector::new(seeds);

        while !collector.is_done() {
            let batch: Vec<NodeId> = collector.frontier().iter().copied().collect();
            let mut loaded = self.store.direct_parents(&batch).await.map_err(EngineError::from_store)?;

            remove_pairs(&mut loaded, &overlay.remove);
            for node in &batch {
                if let Some(parents) = overlay.insert.get(node) {
                    loaded.entry(*node).or_default().extend(parents.iter().copied());
                }
            }
            collector.absorb(loaded);
        }

        Ok(collector.into_working())
    }
}
