use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use opentelemetry_correlation::TraceState;

fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("trace_state");

    for (label, header) in [
        ("typical", typical_header()),
        ("32-entries", header_with(32, 16)),
        ("40-entries-oversized", oversized_header()),
    ] {
        group.bench_with_input(BenchmarkId::new("parse", label), &header, |b, header| {
            b.iter(|| black_box(TraceState::parse(header)))
        });

        let state = TraceState::parse(&header);
        group.bench_with_input(BenchmarkId::new("add", label), &state, |b, state| {
            b.iter(|| black_box(state.add("in", "4bf92f3577b34da6;00f067aa0ba902b7")))
        });
        group.bench_with_input(BenchmarkId::new("fetch", label), &state, |b, state| {
            b.iter(|| black_box(state.fetch("vendor7")))
        });
        group.bench_with_input(BenchmarkId::new("to_string", label), &state, |b, state| {
            b.iter(|| black_box(state.to_string()))
        });
    }

    group.finish();
}

fn typical_header() -> String {
    "in=4bf92f3577b34da6;00f067aa0ba902b7,rojo=00f067aa0ba902b7,congo=t61rcWkgMzE".to_string()
}

fn header_with(entries: usize, value_len: usize) -> String {
    (0..entries)
        .map(|i| format!("vendor{}={}", i, "x".repeat(value_len)))
        .collect::<Vec<_>>()
        .join(",")
}

fn oversized_header() -> String {
    (0..40)
        .map(|i| {
            let len = if i % 5 == 0 { 200 } else { 16 };
            format!("vendor{}={}", i, "x".repeat(len))
        })
        .collect::<Vec<_>>()
        .join(",")
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
