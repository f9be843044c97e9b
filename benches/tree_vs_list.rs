use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use itertools::izip;
use meshloc::{
    ListIndex, Mesh, PointLocator, TreeIndex, DEFAULT_LEAF_SIZE, DEFAULT_MAX_DEPTH,
    DEFAULT_TOLERANCE,
};
use rand::prelude::*;

fn bench_strategies(c: &mut Criterion) {
    // Discretization parameter
    let ns: Vec<_> = (5..=85).step_by(20).collect();

    let (xmin, xmax) = (0., 10.);
    let (ymin, ymax) = (0., 10.);

    let meshes: Vec<_> = ns
        .iter()
        .map(|&n| Arc::new(Mesh::triangle_grid(xmin, xmax, ymin, ymax, n, n).unwrap()))
        .collect();
    let trees: Vec<_> = meshes
        .iter()
        .map(|mesh| {
            TreeIndex::build(mesh.clone(), DEFAULT_LEAF_SIZE, DEFAULT_MAX_DEPTH, DEFAULT_TOLERANCE)
                .unwrap()
        })
        .collect();
    let lists: Vec<_> = meshes
        .iter()
        .map(|mesh| ListIndex::build(mesh.clone(), DEFAULT_TOLERANCE).unwrap())
        .collect();

    // Random number generator
    let mut rng = rand::thread_rng();

    let mut group = c.benchmark_group("Triangle grid");
    for (n, tree, list) in izip!(ns, trees, lists) {
        let query: Vec<_> = (0..420)
            .map(|_| [rng.gen::<f64>() * xmax, rng.gen::<f64>() * ymax])
            .collect();
        group.bench_with_input(BenchmarkId::new("TreeIndex", n), &query, |b, q| {
            b.iter(|| tree.locate_many(q).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("ListIndex", n), &query, |b, q| {
            b.iter(|| list.locate_many(q).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_strategies);
criterion_main!(benches);
