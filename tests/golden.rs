//! Golden tests for the template graph kernel.
//!
//! These tests pin the closure deltas of known scenarios and check that the
//! engine keeps the stored closure exact across batches.

use std::sync::Arc;
use template_graph_kernel::{
    NodeId, NodeSet, NodeSetMap, DirectEdge, ClosureRow, LinkChange,
    EngineConfig, EngineError, LinkEngine, ResolveError, UnlinkStrategy,
    links_to_create, links_to_delete, close_ancestors, closure_fingerprint,
    audit_closure, InMemoryLinkStore,
};

const H: u64 = 1;
const T1: u64 = 10;
const T2: u64 = 20;
const T3: u64 = 30;
const T4: u64 = 40;

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn n(id: u64) -> NodeId {
    NodeId::new(id)
}

fn set(ids: &[u64]) -> NodeSet {
    ids.iter().copied().map(NodeId::new).collect()
}

fn map(entries: &[(u64, &[u64])]) -> NodeSetMap {
    entries.iter().map(|(node, ids)| (n(*node), set(ids))).collect()
}

fn engine_with(edges: &[(u64, u64)], config: EngineConfig) -> LinkEngine<InMemoryLinkStore> {
    let store = InMemoryLinkStore::from_edges(edges.iter().map(|(c, p)| DirectEdge::new(*c, *p)))
        .expect("seed graph must be acyclic");
    LinkEngine::new(Arc::new(store), config)
}

fn empty_engine() -> LinkEngine<InMemoryLinkStore> {
    engine_with(&[], EngineConfig::default())
}

/// Template tree used by several tests.
///
/// ```text
///   H ──► T1 ──► T2 ──► T4
///          └───► T3
/// ```
fn tree_edges() -> Vec<(u64, u64)> {
    vec![(H, T1), (T1, T2), (T1, T3), (T2, T4)]
}

// ─────────────────────────────────────────────────────────────────────────────
// DIFFER SCENARIOS
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_unlink_concrete_scenario() {
    let ancestors = map(&[(H, &[T1, T2]), (T1, &[T2])]);
    let descendants = map(&[(T1, &[H]), (T2, &[H, T1])]);

    let deleted = links_to_delete(&map(&[(T1, &[T2])]), &ancestors, &descendants);

    assert_eq!(deleted, map(&[(T1, &[T2]), (H, &[T2])]));
    assert!(!deleted[&n(H)].contains(&n(T1)), "H -> T1 must survive");
}

#[test]
fn test_link_reaches_unrequested_descendants() {
    let ancestors = map(&[(H, &[T1])]);
    let descendants = map(&[(T1, &[H])]);

    let created = links_to_create(&map(&[(T1, &[T2])]), &ancestors, &descendants);

    assert_eq!(created, map(&[(T1, &[T2]), (H, &[T2])]));
}

#[test]
fn test_create_then_delete_restores_empty_closure() {
    let requested = map(&[(H, &[T1]), (T1, &[T2, T3]), (T2, &[T4])]);

    let created = links_to_create(&requested, &NodeSetMap::new(), &NodeSetMap::new());
    let closure = close_ancestors(requested.keys().copied(), &requested).unwrap();
    assert_eq!(created, closure);

    let mut descendants = NodeSetMap::new();
    for (node, ancestors) in &created {
        for ancestor in ancestors {
            descendants.entry(*ancestor).or_default().insert(*node);
        }
    }
    let deleted = links_to_delete(&requested, &created, &descendants);

    assert_eq!(deleted, created, "delete delta must restore the empty closure");
}

// ─────────────────────────────────────────────────────────────────────────────
// ENGINE ROUND-TRIPS
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_batch_order_does_not_change_closure() {
    let edges = tree_edges();

    let forward = empty_engine();
    for (child, parent) in &edges {
        forward.apply(&LinkChange::new().link(*child, *parent)).await.unwrap();
    }

    let backward = empty_engine();
    for (child, parent) in edges.iter().rev() {
        backward.apply(&LinkChange::new().link(*child, *parent)).await.unwrap();
    }

    let single = empty_engine();
    let batch = edges.iter().fold(LinkChange::new(), |change, (c, p)| change.link(*c, *p));
    single.apply(&batch).await.unwrap();

    let expected = closure_fingerprint(&forward.store().closure());
    assert_eq!(closure_fingerprint(&backward.store().closure()), expected);
    assert_eq!(closure_fingerprint(&single.store().closure()), expected);
    assert_eq!(forward.store().ancestors_of(&n(H)), set(&[T1, T2, T3, T4]));
}

#[tokio::test]
async fn test_link_then_unlink_restores_fingerprint() {
    let engine = engine_with(&tree_edges(), EngineConfig::default());
    let before = closure_fingerprint(&engine.store().closure());

    engine.apply(&LinkChange::new().link(T3, T4)).await.unwrap();
    engine.apply(&LinkChange::new().unlink(T3, T4)).await.unwrap();

    // T4 is still reachable from H and T1 through T2.
    assert_eq!(engine.store().ancestors_of(&n(T1)), set(&[T2, T3, T4]));
    assert_eq!(closure_fingerprint(&engine.store().closure()), before);
}

#[tokio::test]
async fn test_cascade_unlink_drops_rows_reachable_elsewhere() {
    let engine = engine_with(&tree_edges(), EngineConfig::cascade());

    engine.apply(&LinkChange::new().link(T3, T4)).await.unwrap();
    engine.apply(&LinkChange::new().unlink(T3, T4)).await.unwrap();

    assert_eq!(engine.config().unlink_strategy, UnlinkStrategy::Cascade);
    assert_eq!(engine.store().ancestors_of(&n(T1)), set(&[T2, T3]));
    let report = engine.audit(false).await.unwrap();
    assert_eq!(report.stale_rows(), 0);
    assert_eq!(report.missing_rows(), 2);
}

#[tokio::test]
async fn test_unlink_subtree_from_host() {
    let engine = engine_with(&tree_edges(), EngineConfig::default());

    let report = engine.apply(&LinkChange::new().unlink(H, T1)).await.unwrap();

    assert_eq!(report.links_removed, 1);
    assert_eq!(report.delta.delete, map(&[(H, &[T1, T2, T3, T4])]));
    assert!(engine.store().ancestors_of(&n(H)).is_empty());
    assert_eq!(engine.store().ancestors_of(&n(T1)), set(&[T2, T3, T4]));
}

#[tokio::test]
async fn test_cycle_error_names_the_path() {
    let engine = engine_with(&tree_edges(), EngineConfig::default());

    let err = engine.apply(&LinkChange::new().link(T4, T1)).await.unwrap_err();

    match &err {
        EngineError::Resolve(ResolveError::CycleDetected { path, .. }) => {
            assert_eq!(path.first(), path.last());
            assert!(path.contains(&n(T4)) && path.contains(&n(T1)));
        }
        other => panic!("expected cycle, got {other}"),
    }
    assert!(err.to_string().contains("circular linkage"));
    assert_eq!(engine.store().num_links(), 4);
}

#[tokio::test]
async fn test_plan_is_deterministic() {
    let engine = engine_with(&tree_edges(), EngineConfig::default());
    let change = LinkChange::new().unlink(T1, T3).link(T3, T4).link(H, T3);

    let first = engine.plan(&change).await.unwrap();
    for _ in 0..100 {
        assert_eq!(engine.plan(&change).await.unwrap(), first);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// AUDIT
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_audit_repairs_stale_closure() {
    let edges: Vec<DirectEdge> = tree_edges().into_iter().map(|(c, p)| DirectEdge::new(c, p)).collect();
    let stale = vec![ClosureRow::new(H, T1), ClosureRow::new(H, 99), ClosureRow::new(T1, T2)];
    let store = InMemoryLinkStore::from_edges(edges.clone()).unwrap().with_closure_rows(stale.clone());
    let engine = LinkEngine::new(Arc::new(store), EngineConfig::default());

    let offline = audit_closure(&edges, &stale).unwrap();
    let report = engine.audit(true).await.unwrap();

    assert_eq!(report.repair, offline.repair);
    assert_eq!(report.stale_rows(), 1);
    assert_eq!(report.missing_rows(), 6);

    let after = engine.audit(false).await.unwrap();
    assert!(after.is_consistent());
    assert_eq!(after.stored_fingerprint, report.expected_fingerprint);
}
