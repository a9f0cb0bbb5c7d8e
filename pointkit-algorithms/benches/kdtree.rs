use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use pointkit_algorithms::{BruteForceSearch, KdTree};
use pointkit_core::{NearestNeighborSearch, Point3f};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SIZES: [usize; 3] = [1_000, 10_000, 100_000];

fn random_points(n: usize) -> Vec<Point3f> {
    let mut rng = StdRng::seed_from_u64(1);
    (0..n)
        .map(|_| Point3f::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)))
        .collect()
}

fn kdtree(c: &mut Criterion) {
    let mut g = c.benchmark_group("kdtree");
    g.sample_size(10);

    for n in SIZES {
        let points = random_points(n);
        g.bench_with_input(BenchmarkId::new("build", n), &points, |b, points| {
            b.iter(|| KdTree::new(std::hint::black_box(points)).unwrap());
        });

        let tree = KdTree::new(&points).unwrap();
        let query = Point3f::new(0.1, -0.2, 0.3);
        g.bench_with_input(BenchmarkId::new("knn_16", n), &tree, |b, tree| {
            b.iter(|| tree.find_k_nearest(std::hint::black_box(&query), 16));
        });
        g.bench_with_input(BenchmarkId::new("radius_0.05", n), &tree, |b, tree| {
            b.iter(|| tree.find_radius_neighbors(std::hint::black_box(&query), 0.05));
        });
    }

    let points = random_points(SIZES[0]);
    let brute = BruteForceSearch::new(&points);
    g.bench_function("brute_force_knn_16/1000", |b| {
        b.iter(|| brute.find_k_nearest(std::hint::black_box(&Point3f::origin()), 16));
    });

    g.finish();
}

criterion_group!(benches, kdtree);
criterion_main!(benches);
