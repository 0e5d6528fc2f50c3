//! # template-graph-kernel
//!
//! Incremental maintenance of a template-linkage DAG and its ancestor closure.
//!
//! Nodes (hosts and templates) link to parent templates. Next to the direct
//! links the kernel keeps a denormalized closure relation: one row
//! `(node, ancestor)` for every pair connected by a chain of links. When a
//! batch of links is created or removed, the kernel computes exactly which
//! closure rows to insert and delete, rejecting batches that would close a
//! cycle.
//!
//! ## Architecture
//!
//! ```text
//! LinkChange → LinkEngine ─→ resolver (strict walk, cycle check)
//!                  │     └─→ differ (closure delta)
//!                  ↓
//!              LinkStore (Postgres or Memory) ← apply(links, delta)
//! ```
//!
//! ## Guarantees
//!
//! - No node is recorded as its own ancestor
//! - Applying the delta of a change makes the stored closure equal to the
//!   transitive closure of the stored links
//! - Results are ordered canonically (by [`NodeId`])

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod expand;
pub mod resolver;
pub mod differ;
pub mod linkage;
pub mod canonical;
pub mod config;
pub mod store;
pub mod engine;
pub mod audit;

// Re-exports
pub use types::{
    NodeId, DirectEdge, ClosureRow, NodeSet, NodeSetMap, AncestorMap,
    ClosureSnapshot, ClosureDelta, LinkChange,
};
pub use expand::{expand, Expander, Cycle};
pub use resolver::{close_ancestors, resolve_ancestors, ParentCollector, ResolveError};
pub use differ::{links_to_create, links_to_delete, links_to_delete_exact};
pub use linkage::{find_double_linkage, DoubleLinkage};
pub use canonical::{to_canonical_bytes, canonical_hash, canonical_hash_hex, closure_fingerprint};
pub use config::{EngineConfig, UnlinkStrategy};
pub use store::{LinkStore, LinkWriter, InMemoryLinkStore, InMemoryWriter};
#[cfg(feature = "postgres")]
pub use store::{PostgresLinkStore, PostgresWriter};
pub use engine::{LinkEngine, EngineError, ChangeReport};
pub use audit::{audit_closure, full_closure, AuditReport};

/// Schema version for the link and closure tables.
/// Increment on breaking changes to the stored layout.
pub const LINK_SCHEMA_VERSION: &str = "1.0.0";

/// Default engine configuration version identifier.
pub const DEFAULT_CONFIG_VERSION: &str = "engine_config_v1";
