//! Benchmarks for client-side hot paths: configuration parsing and row
//! conversion.

#![allow(missing_docs, clippy::unwrap_used)]

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use reql_client::{Config, Datum, FromDatum};
use reql_types::{FormatOptions, convert_pseudo};
use serde_json::json;
use std::hint::black_box;

fn bench_connection_string_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("connection_string");

    let simple = "Host=localhost;Db=test";
    group.throughput(Throughput::Bytes(simple.len() as u64));
    group.bench_function("simple", |b| {
        b.iter(|| black_box(Config::from_connection_string(black_box(simple))))
    });

    let full = "Host=db.internal:28016;Db=blog;AuthKey=hunter2;\
                Connect Timeout=5;Query Timeout=30;Prefetch=64;";
    group.throughput(Throughput::Bytes(full.len() as u64));
    group.bench_function("full", |b| {
        b.iter(|| black_box(Config::from_connection_string(black_box(full))))
    });

    group.finish();
}

fn bench_row_conversion(c: &mut Criterion) {
    let mut group = c.benchmark_group("row_conversion");
    let format = FormatOptions::default();

    let plain = json!({"id": 1, "title": "hello", "tags": ["a", "b", "c"], "score": 4.5});
    group.bench_function("plain_object", |b| {
        b.iter(|| black_box(convert_pseudo(black_box(plain.clone()), &format)))
    });

    let pseudo = json!({
        "id": 2,
        "created": {"$reql_type$": "TIME", "epoch_time": 1_500_000_000.123, "timezone": "+02:00"},
        "avatar": {"$reql_type$": "BINARY", "data": "aGVsbG8gd29ybGQ="},
    });
    group.bench_function("pseudo_types", |b| {
        b.iter(|| black_box(convert_pseudo(black_box(pseudo.clone()), &format)))
    });

    let row = Datum::Array((0..100i64).map(Datum::from).collect());
    group.bench_function("vec_i64_from_datum", |b| {
        b.iter(|| black_box(Vec::<i64>::from_datum(black_box(&row))))
    });

    group.finish();
}

criterion_group!(benches, bench_connection_string_parsing, bench_row_conversion);
criterion_main!(benches);
