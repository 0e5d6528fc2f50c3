//! Closure differs.
//!
//! Given a batch of direct links being created or removed, plus the
//! currently recorded ancestor and descendant sets of the nodes involved,
//! compute exactly which closure rows must be inserted or deleted.
//!
//! All functions here are pure and total: absent map keys are empty sets,
//! and nothing is logged or persisted. Results never contain empty sets.

use crate::expand::Expander;
use crate::types::{NodeSet, NodeSetMap};
use crate::types::closure::{merge_into, prune_empty, remove_pairs, set_of};

/// Closure rows to insert for a batch of new direct links.
///
/// * `requested` - child -> parents being linked in this batch
/// * `current_ancestors` - recorded ancestor sets of the endpoints
/// * `current_descendants` - recorded descendant sets of the children
///
/// ## Algorithm
///
/// 1. Each child's working parent set is its recorded ancestors plus the
///    requested parents; recorded ancestors of every other supplied node
///    (the new parents in particular) join the working map as well
/// 2. Each child's working set is flattened by a memoized walk
/// 3. Rows the child already records are subtracted
/// 4. Every descendant of a child that gained ancestors gains the same
///    ancestors, minus the rows it already records
pub fn links_to_create(
    requested: &NodeSetMap,
    current_ancestors: &NodeSetMap,
    current_descendants: &NodeSetMap,
) -> NodeSetMap {
    let mut working = current_ancestors.clone();
    merge_into(&mut working, requested);

    let mut expander = Expander::new(&working);
    let mut created = NodeSetMap::new();

    for child in requested.keys() {
        let known = set_of(current_ancestors, child);
        let gained: NodeSet = expander
            .reach(*child)
            .iter()
            .filter(|ancestor| !known.contains(*ancestor))
            .copied()
            .collect();

        if !gained.is_empty() {
            created.insert(*child, gained);
        }
    }

    propagate(&mut created, current_ancestors, current_descendants, true);
    created
}

/// Closure rows to delete for a batch of removed direct links.
///
/// * `removed` - child -> parents being unlinked in this batch
/// * `current_ancestors` - recorded ancestor sets of the unlinked parents
/// * `current_descendants` - recorded descendant sets of the children
///
/// Each child loses the unlinked parent and everything recorded above it,
/// and every descendant of the child loses the same rows. An ancestor that
/// stays reachable through another surviving link is removed as well; use
/// [`links_to_delete_exact`] when the graph may contain diamonds.
pub fn links_to_delete(
    removed: &NodeSetMap,
    current_ancestors: &NodeSetMap,
    current_descendants: &NodeSetMap,
) -> NodeSetMap {
    let mut deleted = NodeSetMap::new();

    for (child, parents) in removed {
        if parents.is_empty() {
            continue;
        }
        let rows = deleted.entry(*child).or_default();
        for parent in parents {
            rows.insert(*parent);
            rows.extend(set_of(current_ancestors, parent).iter().copied());
        }
        rows.remove(child);
    }

    propagate(&mut deleted, current_ancestors, current_descendants, false);
    prune_empty(&mut deleted);
    deleted
}

/// Closure rows to delete, keeping rows still reachable after the removal.
///
/// Starts from the cascade of [`links_to_delete`] and drops every candidate
/// row whose ancestor remains reachable from its node over the surviving
/// direct links (`direct_parents` minus `removed`). `direct_parents` must
/// hold the direct links of every candidate node and of its ancestors.
pub fn links_to_delete_exact(
    removed: &NodeSetMap,
    current_ancestors: &NodeSetMap,
    current_descendants: &NodeSetMap,
    direct_parents: &NodeSetMap,
) -> NodeSetMap {
    let candidates = links_to_delete(removed, current_ancestors, current_descendants);
    if candidates.is_empty() {
        return candidates;
    }

    let mut surviving = direct_parents.clone();
    remove_pairs(&mut surviving, removed);
    let mut expander = Expander::new(&surviving);

    let mut deleted = NodeSetMap::new();
    for (node, rows) in candidates {
        let still_reachable = expander.reach(node);
        let gone: NodeSet = rows
            .into_iter()
            .filter(|ancestor| !still_reachable.contains(ancestor))
            .collect();
        if !gone.is_empty() {
            deleted.insert(node, gone);
        }
    }
    deleted
}

/// Copy the rows of every changed node onto its recorded descendants.
///
/// Descendant results are merged, never overwritten. When `skip_known` is
/// set, rows a descendant already records are not added (creation).
fn propagate(
    changed: &mut NodeSetMap,
    current_ancestors: &NodeSetMap,
    current_descendants: &NodeSetMap,
    skip_known: bool,
) {
    let sources: Vec<_> = changed
        .iter()
        .map(|(node, rows)| (*node, rows.clone()))
        .collect();

    for (node, rows) in sources {
        for descendant in set_of(current_descendants, &node) {
            if *descendant == node {
                continue;
            }
            let known = set_of(current_ancestors, descendant);
            let inherited: NodeSet = rows
                .iter()
                .filter(|ancestor| *ancestor != descendant)
                .filter(|ancestor| !skip_known || !known.contains(*ancestor))
                .copied()
                .collect();
            if !inherited.is_empty() {
                changed.entry(*descendant).or_default().extend(inherited);
            }
        }
    }
}
