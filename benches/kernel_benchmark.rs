//! Kernel evaluation and small-problem training benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ksvm::{Kernel, Svm};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect()
}

fn bench_kernel_evaluation(c: &mut Criterion) {
    let vectors = random_vectors(64, 50, 1);
    let kernels = [
        ("linear", Kernel::linear()),
        ("poly", Kernel::poly(3, 0.5, 1.0)),
        ("rbf", Kernel::rbf(0.5)),
        ("sigmoid", Kernel::sigmoid(0.1, 0.0)),
    ];

    let mut group = c.benchmark_group("kernel_evaluation");
    for (name, kernel) in kernels {
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut acc = 0.0;
                for x in &vectors {
                    for y in &vectors {
                        acc += kernel.evaluate(black_box(x), black_box(y));
                    }
                }
                acc
            })
        });
    }
    group.finish();
}

fn bench_training(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(2);
    let mut samples = Vec::new();
    let mut labels = Vec::new();
    for _ in 0..40 {
        let jx: f64 = rng.gen_range(-0.3..0.3);
        let jy: f64 = rng.gen_range(-0.3..0.3);
        samples.push(vec![1.5 + jx, 1.0 + jy]);
        labels.push(0);
        samples.push(vec![-1.5 + jx, -1.0 + jy]);
        labels.push(1);
    }

    let mut group = c.benchmark_group("training");
    group.sample_size(20);
    group.bench_function("linear_80_samples", |b| {
        b.iter(|| {
            Svm::new()
                .fit(black_box(&samples), black_box(&labels))
                .expect("fit")
        })
    });
    group.bench_function("rbf_80_samples", |b| {
        b.iter(|| {
            Svm::new()
                .with_kernel(Kernel::rbf(0.5))
                .fit(black_box(&samples), black_box(&labels))
                .expect("fit")
        })
    });
    group.finish();
}

criterion_group!(benches, bench_kernel_evaluation, bench_training);
criterion_main!(benches);
