//! Performance benchmarks for closure maintenance.
//!
//! Run with: `cargo bench --bench closure`
//!
//! ## Scenarios
//!
//! | Operation | Shape | Notes |
//! |-----------|-------|-------|
//! | Resolve | Deep chain | Strict walk, memo reuse |
//! | Create | Wide tree | Propagation to many descendants |
//! | Delete | Wide tree | Cascade vs exact recomputation |

use criterion::{
    black_box, criterion_group, criterion_main,
    BenchmarkId, Criterion, Throughput,
};

use template_graph_kernel::{
    close_ancestors, full_closure, links_to_create, links_to_delete, links_to_delete_exact,
    DirectEdge, NodeId, NodeSetMap,
};

/// Chain 0 -> 1 -> ... -> depth.
fn chain(depth: u64) -> NodeSetMap {
    (0..depth)
        .map(|i| (NodeId::new(i), [NodeId::new(i + 1)].into_iter().collect()))
        .collect()
}

/// `hosts` hosts linked to one of `templates` templates, each template
/// linked to a shared root template.
fn wide_tree(hosts: u64, templates: u64) -> Vec<DirectEdge> {
    let root = 1_000_000;
    let mut edges: Vec<DirectEdge> = (0..templates)
        .map(|t| DirectEdge::new(100_000 + t, root))
        .collect();
    edges.extend((0..hosts).map(|h| DirectEdge::new(h, 100_000 + h % templates)));
    edges
}

fn descendants_of(closure: &NodeSetMap) -> NodeSetMap {
    let mut descendants = NodeSetMap::new();
    for (node, ancestors) in closure {
        for ancestor in ancestors {
            descendants.entry(*ancestor).or_default().insert(*node);
        }
    }
    descendants
}

fn bench_resolve_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_chain");

    for depth in [10u64, 100, 1_000] {
        let parents = chain(depth);
        group.throughput(Throughput::Elements(depth));
        group.bench_with_input(BenchmarkId::from_parameter(depth), &parents, |b, parents| {
            b.iter(|| close_ancestors([NodeId::new(0)], black_box(parents)).unwrap());
        });
    }

    group.finish();
}

fn bench_create_propagation(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_propagation");

    for hosts in [100u64, 1_000, 10_000] {
        let edges = wide_tree(hosts, 10);
        let closure = full_closure(&edges).unwrap();
        let descendants = descendants_of(&closure);

        // Link the shared root to a new top template.
        let mut requested = NodeSetMap::new();
        requested.entry(NodeId::new(1_000_000)).or_default().insert(NodeId::new(2_000_000));

        group.throughput(Throughput::Elements(hosts));
        group.bench_function(BenchmarkId::from_parameter(hosts), |b| {
            b.iter(|| links_to_create(black_box(&requested), &closure, &descendants));
        });
    }

    group.finish();
}

fn bench_delete_strategies(c: &mut Criterion) {
    let mut group = c.benchmark_group("delete_strategies");

    let edges = wide_tree(1_000, 10);
    let closure = full_closure(&edges).unwrap();
    let descendants = descendants_of(&closure);
    let mut parents = NodeSetMap::new();
    for edge in &edges {
        parents.entry(edge.child).or_default().insert(edge.parent);
    }

    let mut removed = NodeSetMap::new();
    removed.entry(NodeId::new(100_000)).or_default().insert(NodeId::new(1_000_000));

    group.bench_function("cascade", |b| {
        b.iter(|| links_to_delete(black_box(&removed), &closure, &descendants));
    });
    group.bench_function("exact", |b| {
        b.iter(|| links_to_delete_exact(black_box(&removed), &closure, &descendants, &parents));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_resolve_chain,
    bench_create_propagation,
    bench_delete_strategies,
);

criterion_main!(benches);
