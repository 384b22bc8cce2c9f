//! Criterion benchmarks for the MBot Bridge envelope codec.
//!
//! Run with:
//! ```bash
//! cargo bench --package mbot-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mbot_core::{decode, decode_occupancy_grid, encode, Envelope};
use serde_json::{json, Value};

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn make_request() -> Envelope {
    Envelope::request("MBOT_ODOMETRY")
}

fn make_drive() -> Envelope {
    Envelope::publish("MBOT_VEL_CMD", "twist2D_t", json!({"vx": 0.2, "vy": 0.0, "wz": 0.5}))
}

fn make_lidar() -> Envelope {
    let ranges: Vec<f32> = (0..360).map(|i| 1.0 + i as f32 * 0.01).collect();
    let thetas: Vec<f32> = (0..360).map(|i| (i as f32).to_radians()).collect();
    Envelope::response(
        "LIDAR",
        "lidar_t",
        json!({"utime": 0, "num_ranges": 360, "ranges": ranges, "thetas": thetas}),
    )
}

/// A 200x200 grid, roughly the size of a room map at 5 cm per cell.
fn make_map_data() -> Value {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    let cells: Vec<u8> = (0..40_000u32).map(|i| (i % 256) as u8).collect();
    json!({
        "utime": 0, "origin_x": -5.0, "origin_y": -5.0, "meters_per_cell": 0.05,
        "width": 200, "height": 200, "num_cells": 40_000,
        "cells": BASE64.encode(cells),
    })
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    for (name, envelope) in [
        ("request", make_request()),
        ("drive", make_drive()),
        ("lidar", make_lidar()),
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(name), &envelope, |b, env| {
            b.iter(|| encode(black_box(env)))
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    for (name, envelope) in [
        ("request", make_request()),
        ("drive", make_drive()),
        ("lidar", make_lidar()),
    ] {
        let text = encode(&envelope);
        group.bench_with_input(BenchmarkId::from_parameter(name), &text, |b, text| {
            b.iter(|| decode(black_box(text)))
        });
    }
    group.bench_function("invalid", |b| b.iter(|| decode(black_box(r#"{"channel":"X"}"#))));
    group.finish();
}

fn bench_occupancy_grid(c: &mut Criterion) {
    let data = make_map_data();
    c.bench_function("decode_occupancy_grid_200x200", |b| {
        b.iter(|| decode_occupancy_grid(black_box(&data)))
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_occupancy_grid);
criterion_main!(benches);
