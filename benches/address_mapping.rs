// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the metric-modbus project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Benchmarks for metric key hashing and batch ingestion
//!
//! Run with: cargo bench --bench address_mapping

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use metric_modbus::mapping::map_key_to_address;
use metric_modbus::metrics::MetricRecord;
use metric_modbus::modbus::{ingest, RegisterStore};

/// Generate records with `fields` numeric fields each
fn generate_records(count: usize, fields: usize) -> Vec<MetricRecord> {
    (0..count)
        .map(|i| {
            (0..fields).fold(MetricRecord::new(format!("host{}", i)), |record, f| {
                record.with_field(format!("field{}", f), (i * f) as f64 + 0.5)
            })
        })
        .collect()
}

fn bench_map_key_to_address(c: &mut Criterion) {
    let mut group = c.benchmark_group("map_key_to_address");

    for key in ["cpu_usage_idle", "datacenter_rack_42_inlet_temperature_celsius"] {
        group.bench_with_input(BenchmarkId::from_parameter(key.len()), key, |b, key| {
            b.iter(|| map_key_to_address(black_box(key)));
        });
    }

    group.finish();
}

fn bench_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest");

    for size in [10, 100, 1_000].iter() {
        let records = generate_records(*size, 8);
        let store = RegisterStore::new();

        group.throughput(Throughput::Elements((*size * 8) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| ingest(&store, black_box(&records)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_map_key_to_address, bench_ingest);
criterion_main!(benches);
