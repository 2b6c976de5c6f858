//! Performance benchmarks for the ingestion pipeline
//!
//! Run with: cargo bench

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ticket_insights::decoder::decode_rows;
use ticket_insights::line_parser::parse_lines;
use ticket_insights::metrics::compute_metrics;
use ticket_insights::period::Period;
use ticket_insights::profitability::{analyze_profitability, DEFAULT_UNIT_COST};
use ticket_insights::records::build_records;

/// Generate a label/value dashboard export with `num_rows` ticket rows.
fn generate_dashboard(num_rows: usize, include_noise: bool) -> String {
    let mut lines = vec!["🚨 ALERTAS:,Tickets críticos".to_string()];

    for i in 0..num_rows {
        if include_noise && i % 10 == 5 {
            // Broken quote every 10th row
            lines.push(format!("Nome:,\"Cliente {i},Status:,Open"));
            continue;
        }
        lines.push(format!(
            "ID:,{},Nome:,\"Cliente {}, Ltda\",Email:,cliente{}@example.com,Status:,{},Flag Urgente:,{},Flag VIP:,{},Score Risco:,{},Dias Cliente:,{},Timestamp:,2024-05-{:02}T10:30:00Z",
            1000 + i,
            i % 250,
            i % 250,
            if i % 3 == 0 { "Open" } else { "Closed" },
            if i % 7 == 0 { "SIM ⚠️" } else { "NÃO" },
            if i % 11 == 0 { "SIM" } else { "NÃO" },
            if i % 5 == 0 { "ALTO" } else { "BAIXO" },
            i % 400,
            1 + i % 28,
        ));
    }

    lines.join("\n")
}

fn benchmark_parse_lines(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_lines");

    for size in [10, 100, 1000, 10000].iter() {
        let text = generate_dashboard(*size, false);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &text, |b, text| {
            b.iter(|| parse_lines(black_box(text)).count());
        });
    }

    group.finish();
}

fn benchmark_decode_and_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_and_build");
    let ingested_at = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

    for size in [100, 1000, 10000].iter() {
        let matrix: Vec<_> = parse_lines(&generate_dashboard(*size, false)).collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), &matrix, |b, matrix| {
            b.iter(|| {
                let rows = decode_rows(black_box(matrix));
                build_records(&rows, Period::Last30Days, ingested_at)
            });
        });
    }

    group.finish();
}

fn benchmark_malformed_input(c: &mut Criterion) {
    let mut group = c.benchmark_group("malformed_input");

    // 10% of rows carry an unterminated quote
    let text = generate_dashboard(1000, true);
    group.bench_function("parse_with_repair", |b| {
        b.iter(|| parse_lines(black_box(&text)).count());
    });

    group.finish();
}

fn benchmark_aggregates(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregates");
    let ingested_at = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let matrix: Vec<_> = parse_lines(&generate_dashboard(10000, false)).collect();
    let records = build_records(&decode_rows(&matrix), Period::LastYear, ingested_at).records;

    group.bench_function("compute_metrics", |b| {
        b.iter(|| compute_metrics(Period::LastYear, black_box(&records)));
    });
    group.bench_function("analyze_profitability", |b| {
        b.iter(|| analyze_profitability(Period::LastYear, black_box(&records), DEFAULT_UNIT_COST));
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_parse_lines,
    benchmark_decode_and_build,
    benchmark_malformed_input,
    benchmark_aggregates
);
criterion_main!(benches);
