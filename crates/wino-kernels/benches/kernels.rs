// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for the transform and multiply-accumulate kernels.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use wino_kernels::{BlockGemm, MatrixKernel, WinogradKernel};

fn bench_transforms(c: &mut Criterion) {
    let mut group = c.benchmark_group("input_transform");
    for (name, kernel) in [
        ("f2x2_3x3", MatrixKernel::<f32>::f2x2_3x3()),
        ("f4x4_3x3", MatrixKernel::<f32>::f4x4_3x3()),
        ("f5x5_3x3", MatrixKernel::<f32>::f5x5_3x3()),
    ] {
        let a = kernel.tile_edge();
        let lanes = 16;
        let tile: Vec<f32> = (0..a * a * lanes).map(|i| i as f32 * 0.01).collect();
        let mut dst = vec![0.0f32; a * a * lanes];
        group.bench_function(BenchmarkId::from_parameter(name), |b| {
            b.iter(|| kernel.transform_input(black_box(&tile), lanes, &mut dst, lanes))
        });
    }
    group.finish();
}

fn bench_block_gemm(c: &mut Criterion) {
    let v = 16;
    let tiles = 8;
    let input = vec![0.5f32; tiles * v];
    let weights = vec![0.25f32; v * v];
    let mut acc = vec![0.0f32; tiles * v];
    c.bench_function("block_gemm_full_v16_t8", |b| {
        b.iter(|| BlockGemm::Full.accumulate(black_box(&input), &weights, &mut acc, tiles, v))
    });
}

criterion_group!(benches, bench_transforms, bench_block_gemm);
criterion_main!(benches);
