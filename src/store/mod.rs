//! Link and closure storage backends.

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use crate::types::{ClosureDelta, ClosureRow, ClosureSnapshot, DirectEdge, LinkChange, NodeId, NodeSetMap};

/// Trait for storage of the direct-link relation and its closure.
///
/// Implementations must guarantee deterministic ordering of results.
/// All methods are async to support async database access.
#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync;

    /// Exclusive write session returned by [`LinkStore::begin_write`].
    type Writer: LinkWriter<Error = Self::Error>;

    /// Fetch the recorded direct parents of each node.
    ///
    /// Nodes without parents may be absent from the result.
    async fn direct_parents(&self, nodes: &[NodeId]) -> Result<NodeSetMap, Self::Error>;

    /// Fetch the recorded ancestor and descendant sets of each node.
    async fn load_closure(&self, nodes: &[NodeId]) -> Result<ClosureSnapshot, Self::Error>;

    /// Open a write session.
    ///
    /// While the session is alive no other session can be opened, so reads
    /// made through this store see a state that only the session's own
    /// commit can change. Dropping the session without committing releases
    /// it and writes nothing.
    async fn begin_write(&self) -> Result<Self::Writer, Self::Error>;

    /// Apply link changes and the matching closure delta atomically.
    ///
    /// Removals and closure deletes are applied before insertions.
    async fn apply(&self, links: &LinkChange, closure: &ClosureDelta) -> Result<(), Self::Error> {
        self.begin_write().await?.commit(links, closure).await
    }

    /// Fetch every direct link (ordered by child, then parent).
    async fn direct_edges(&self) -> Result<Vec<DirectEdge>, Self::Error>;

    /// Fetch every closure row (ordered by node, then ancestor).
    async fn closure_rows(&self) -> Result<Vec<ClosureRow>, Self::Error>;
}

/// Exclusive write session over a [`LinkStore`].
#[async_trait]
pub trait LinkWriter: Send {
    /// Error type for the commit.
    type Error: std::error::Error + Send + Sync;

    /// Write link changes and the matching closure delta, then end the session.
    ///
    /// Removals and closure deletes are applied before insertions. Either
    /// everything is written or nothing is.
    async fn commit(self, links: &LinkChange, closure: &ClosureDelta) -> Result<(), Self::Error>;
}

pub use memory::{InMemoryLinkStore, InMemoryWriter};

#[cfg(feature = "postgres")]
pub use postgres::{PostgresLinkStore, PostgresWriter};
