//! Criterion benchmarks for DataLab hot paths.
//!
//! Benchmarks:
//! 1. Alignment of sparse partials onto a daily calendar
//! 2. Column normalization of nested provider keys
//! 3. Cache key construction
//! 4. CSV round trip of an aligned table

use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use datalab_core::data::{align, read_csv, write_csv, ColumnNormalizer, ColumnSpec, NamingContext};
use datalab_core::domain::{ColumnKey, DateRange, Interval, QueryParams, RawTable, Row, Table, Value};
use datalab_core::build_cache_key;

// ── Helpers ──────────────────────────────────────────────────────────

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
}

fn range(days: i64) -> DateRange {
    DateRange::new(start(), start() + Duration::days(days - 1)).unwrap()
}

/// One column per partial, observed on every `stride`th day.
fn make_partials(count: usize, days: i64, stride: i64) -> Vec<Table> {
    (0..count)
        .map(|p| {
            let rows = (0..days)
                .step_by(stride as usize)
                .map(|i| {
                    let v = 100.0 + (i as f64 * 0.1 + p as f64).sin() * 10.0;
                    Row::daily(start() + Duration::days(i), vec![Value::from(v)])
                })
                .collect();
            Table::from_rows(vec![format!("series_{p}")], rows).unwrap()
        })
        .collect()
}

fn make_raw(tickers: usize, days: i64) -> RawTable {
    let fields = ["Open", "High", "Low", "Close", "Adj Close", "Volume"];
    let columns = (0..tickers)
        .flat_map(|t| fields.iter().map(move |f| ColumnKey::nested(format!("TICK-{t}"), *f)))
        .collect();
    let mut table = RawTable::new(columns);
    for i in 0..days {
        let values = (0..tickers * fields.len()).map(|j| Value::from((i + j as i64) as f64)).collect();
        table.push(Row::daily(start() + Duration::days(i), values)).unwrap();
    }
    table
}

// ── 1. Alignment ─────────────────────────────────────────────────────

fn bench_align(c: &mut Criterion) {
    let mut group = c.benchmark_group("align");
    for days in [365i64, 3650] {
        let partials = make_partials(10, days, 3);
        group.bench_with_input(BenchmarkId::new("daily_10_partials", days), &days, |b, &days| {
            b.iter(|| align(black_box(partials.clone()), range(days), Interval::DAILY).unwrap())
        });
    }
    group.finish();
}

// ── 2. Normalization ─────────────────────────────────────────────────

fn bench_normalize(c: &mut Criterion) {
    let raw = make_raw(20, 365);
    c.bench_function("normalize_20_tickers", |b| {
        b.iter(|| {
            ColumnNormalizer::new()
                .normalize(black_box(raw.clone()), &NamingContext::new())
                .unwrap()
        })
    });
}

// ── 3. Cache keys ────────────────────────────────────────────────────

fn bench_cache_key(c: &mut Criterion) {
    let params = QueryParams::new()
        .with_list("keywords", (0..50).map(|i| format!("keyword {i}")))
        .with_scalar("interval", "1d");
    let r = range(365);
    c.bench_function("build_cache_key_50_keywords", |b| {
        b.iter(|| build_cache_key(black_box(&r), black_box(&params)))
    });
}

// ── 4. CSV round trip ────────────────────────────────────────────────

fn bench_csv(c: &mut Criterion) {
    let table = align(make_partials(10, 3650, 1), range(3650), Interval::DAILY)
        .unwrap()
        .table;
    let specs: Vec<ColumnSpec> = table
        .columns()
        .iter()
        .zip(table.kinds())
        .map(|(name, kind)| ColumnSpec {
            name: name.clone(),
            kind,
        })
        .collect();

    c.bench_function("csv_round_trip_10x3650", |b| {
        b.iter(|| {
            let mut buf = Vec::new();
            write_csv(black_box(&table), &mut buf).unwrap();
            read_csv(buf.as_slice(), &specs).unwrap()
        })
    });
}

criterion_group!(benches, bench_align, bench_normalize, bench_cache_key, bench_csv);
criterion_main!(benches);
