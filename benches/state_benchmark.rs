#![allow(clippy::expect_used, clippy::unwrap_used, missing_docs)]
//! Benchmark for state computation and template expansion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use smart_monitor::device::OverallStatus;
use smart_monitor::state::StateTable;
use smart_monitor::template::expand;

fn resolve(key: &str) -> Option<String> {
    (key == "name").then(|| "nvme0n1".to_string())
}

fn state_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("state");

    for status in OverallStatus::ALL {
        group.bench_with_input(BenchmarkId::new("first_compute", status), &status, |b, s| {
            b.iter(|| {
                let mut table = StateTable::new();
                table.compute(black_box(s.value()), resolve)
            });
        });
    }

    let mut table = StateTable::new();
    table.compute(OverallStatus::BadSector.value(), resolve);
    group.bench_function("memoized_compute", |b| {
        b.iter(|| table.compute(black_box(OverallStatus::BadSector.value()), resolve));
    });

    group.bench_function("unknown_code", |b| {
        let mut table = StateTable::new();
        b.iter(|| table.compute(black_box(99), resolve));
    });

    group.finish();
}

fn template_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("template");

    for repeats in [1, 8, 64] {
        let template = "Bad sector on ${name}; ".repeat(repeats);
        group.bench_with_input(BenchmarkId::from_parameter(repeats), &template, |b, t| {
            b.iter(|| expand(black_box(t), resolve));
        });
    }

    group.finish();
}

criterion_group!(benches, state_benchmark, template_benchmark);
criterion_main!(benches);
