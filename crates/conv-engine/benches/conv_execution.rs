// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Benchmarks for steady-state convolution runs.

use conv_engine::{Algorithm, ConvEngine, EngineConfig};
use conv_geometry::ProblemShape;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn config(mode: &str, teams: usize) -> EngineConfig {
    EngineConfig {
        vector_width: 16,
        tile_block: 8,
        teams,
        threads: 2,
        execution_mode: mode.into(),
        ..Default::default()
    }
}

fn bench_strategies(c: &mut Criterion) {
    let shape = ProblemShape::conv2d(1, 64, 64, 28, 28, 3);
    let input = vec![0.5f32; shape.input_len()];
    let weights = vec![0.01f32; shape.weights_len()];
    let mut output = vec![0.0f32; shape.output_len()];

    let mut group = c.benchmark_group("steady_state");
    group.sample_size(20);
    for (mode, teams) in [
        ("a000", 1),
        ("a040", 1),
        ("a061", 1),
        ("a0e1", 1),
        ("a241", 2),
        ("a448", 2),
    ] {
        let Ok(planned) = ConvEngine::new(config(mode, teams)).plan::<f32>(&shape) else {
            continue;
        };
        let Ok(mut engine) = planned.prepare() else {
            continue;
        };
        let label = engine.strategy().label();
        group.bench_function(BenchmarkId::from_parameter(label), |b| {
            b.iter(|| {
                engine
                    .run(black_box(&input), black_box(&weights), None, &mut output)
                    .unwrap()
            })
        });
    }
    group.finish();
}

fn bench_direct(c: &mut Criterion) {
    let shape = ProblemShape::conv2d(1, 32, 32, 28, 28, 3).with_stride(2, 2);
    let input = vec![0.5f32; shape.input_len()];
    let weights = vec![0.01f32; shape.weights_len()];
    let mut output = vec![0.0f32; shape.output_len()];
    let cfg = EngineConfig {
        algorithm: Algorithm::Direct,
        ..config("auto", 1)
    };
    let mut engine = ConvEngine::new(cfg)
        .plan::<f32>(&shape)
        .unwrap()
        .prepare()
        .unwrap();
    c.bench_function("direct_stride2", |b| {
        b.iter(|| {
            engine
                .run(black_box(&input), black_box(&weights), None, &mut output)
                .unwrap()
        })
    });
}

fn bench_weights_transform(c: &mut Criterion) {
    let shape = ProblemShape::conv2d(1, 64, 64, 14, 14, 3);
    let input = vec![0.5f32; shape.input_len()];
    let weights = vec![0.01f32; shape.weights_len()];
    let mut output = vec![0.0f32; shape.output_len()];
    let mut engine = ConvEngine::new(config("a040", 1))
        .plan::<f32>(&shape)
        .unwrap()
        .prepare()
        .unwrap();
    c.bench_function("first_run_with_weights_transform", |b| {
        b.iter(|| {
            engine.invalidate_weights();
            engine
                .run(black_box(&input), black_box(&weights), None, &mut output)
                .unwrap()
        })
    });
}

criterion_group!(benches, bench_strategies, bench_direct, bench_weights_transform);
criterion_main!(benches);
