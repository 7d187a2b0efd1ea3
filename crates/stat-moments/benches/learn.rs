//! Learn throughput of the moment engines
//!
//! Run with:
//!   cargo bench -p stat-moments --bench learn

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use stat_core::{Column, StatisticsEngine, Table};
use stat_moments::{CorrelativeStatistics, DescriptiveStatistics, MultiCorrelativeStatistics};

fn fixture(rows: usize, columns: usize) -> Table {
    let mut rng = StdRng::seed_from_u64(42);
    let normal = Normal::new(10.0, 2.0).unwrap();
    let mut table = Table::new();
    for c in 0..columns {
        let values = (0..rows).map(|_| normal.sample(&mut rng)).collect();
        table.add_column(format!("v{c}"), Column::Real(values)).unwrap();
    }
    table
}

fn bench_learn(c: &mut Criterion) {
    let mut group = c.benchmark_group("learn");
    for rows in [1_000usize, 10_000, 100_000] {
        let table = fixture(rows, 4);
        group.throughput(Throughput::Elements(rows as u64));

        let mut descriptive = DescriptiveStatistics::new();
        for c in 0..4 {
            descriptive.add_column(&format!("v{c}"));
        }
        group.bench_with_input(BenchmarkId::new("descriptive", rows), &table, |b, t| {
            b.iter(|| descriptive.learn(black_box(t), None).unwrap())
        });

        let mut correlative = CorrelativeStatistics::new();
        correlative.add_column_pair("v0", "v1");
        correlative.add_column_pair("v2", "v3");
        group.bench_with_input(BenchmarkId::new("correlative", rows), &table, |b, t| {
            b.iter(|| correlative.learn(black_box(t), None).unwrap())
        });

        let mut multi = MultiCorrelativeStatistics::new();
        multi.add_request(["v0", "v1", "v2", "v3"]);
        group.bench_with_input(BenchmarkId::new("multicorrelative", rows), &table, |b, t| {
            b.iter(|| multi.learn(black_box(t), None).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_learn);
criterion_main!(benches);
