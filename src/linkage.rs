//! Double-linkage detection.
//!
//! A node must not inherit the same template through two different direct
//! parents. When this holds for every node, the inheritance graph has no
//! diamonds and every closure row is backed by exactly one chain of links.

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

use crate::types::{NodeId, NodeSet, NodeSetMap};
use crate::types::closure::set_of;

/// A template reached twice from the same node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("Template {template} would be linked to node {node} twice, through {first_via} and {second_via}")]
pub struct DoubleLinkage {
    /// Node inheriting the template twice.
    pub node: NodeId,
    /// Template reached through both parents.
    pub template: NodeId,
    /// First direct parent leading to `template`.
    pub first_via: NodeId,
    /// Second direct parent leading to `template`.
    pub second_via: NodeId,
}

/// Find the first node in `nodes` that inherits a template twice.
///
/// * `direct_parents` - direct links of every node in `nodes`
/// * `ancestors` - full ancestor sets of those direct parents
///
/// For each node, the sets `{parent} ∪ ancestors(parent)` over its direct
/// parents must be pairwise disjoint. Nodes and parents are checked in
/// ascending order, so the reported violation is deterministic.
pub fn find_double_linkage(
    direct_parents: &NodeSetMap,
    ancestors: &NodeSetMap,
    nodes: &NodeSet,
) -> Option<DoubleLinkage> {
    for node in nodes {
        let mut reached: BTreeMap<NodeId, NodeId> = BTreeMap::new();

        for parent in set_of(direct_parents, node) {
            let inherited = std::iter::once(parent).chain(set_of(ancestors, parent).iter());
            for template in inherited {
                if let Some(first_via) = reached.insert(*template, *parent) {
                    return Some(DoubleLinkage {
                        node: *node,
                        template: *template,
                        first_via,
                        second_via: *parent,
                    });
                }
            }
        }
    }
    None
}
