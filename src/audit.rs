//! Closure audit.
//!
//! Recomputes the closure relation from the direct links and compares it
//! with the stored rows. The result carries the exact repair delta, so a
//! drifted closure can be brought back in line with one atomic write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::canonical::closure_fingerprint;
use crate::LINK_SCHEMA_VERSION;
use crate::resolver::{close_ancestors, ResolveError};
use crate::types::{ClosureDelta, ClosureRow, DirectEdge, NodeSetMap};
use crate::types::closure::{count_pairs, edges_to_map, prune_empty, remove_pairs, rows_to_map};

/// Outcome of comparing the stored closure with a full recomputation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    /// Layout version of the audited link and closure tables.
    pub schema_version: String,
    /// Number of direct links examined.
    pub link_count: usize,
    /// Number of stored closure rows.
    pub stored_rows: usize,
    /// Number of rows implied by the direct links.
    pub expected_rows: usize,
    /// Fingerprint of the stored closure.
    pub stored_fingerprint: String,
    /// Fingerprint of the recomputed closure.
    pub expected_fingerprint: String,
    /// Rows to insert (missing) and delete (stale) to repair the closure.
    pub repair: ClosureDelta,
    /// When the audit ran.
    pub computed_at: DateTime<Utc>,
}

impl AuditReport {
    /// Whether the stored closure matches the direct links exactly.
    pub fn is_consistent(&self) -> bool {
        self.repair.is_empty()
    }

    /// Number of rows missing from the stored closure.
    pub fn missing_rows(&self) -> usize {
        self.repair.insert_count()
    }

    /// Number of stored rows not backed by any chain of links.
    pub fn stale_rows(&self) -> usize {
        self.repair.delete_count()
    }
}

/// Exact closure of every node in a direct-link relation.
pub fn full_closure(edges: &[DirectEdge]) -> Result<NodeSetMap, ResolveError> {
    let parents = edges_to_map(edges.iter().copied());
    let mut closure = close_ancestors(parents.keys().copied(), &parents)?;
    prune_empty(&mut closure);
    Ok(closure)
}

/// Audit stored closure rows against the direct links.
///
/// Fails only when the direct links contain a cycle.
pub fn audit_closure(edges: &[DirectEdge], rows: &[ClosureRow]) -> Result<AuditReport, ResolveError> {
    let expected = full_closure(edges)?;
    let stored = rows_to_map(rows.iter().copied());

    let mut missing = expected.clone();
    remove_pairs(&mut missing, &stored);
    let mut stale = stored.clone();
    remove_pairs(&mut stale, &expected);

    Ok(AuditReport {
        schema_version: LINK_SCHEMA_VERSION.to_string(),
        link_count: edges.len(),
        stored_rows: count_pairs(&stored),
        expected_rows: count_pairs(&expected),
        stored_fingerprint: closure_fingerprint(&stored),
        expected_fingerprint: closure_fingerprint(&expected),
        repair: ClosureDelta::new(missing, stale),
        computed_at: Utc::now(),
    })
}
