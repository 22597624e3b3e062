// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Property tests: every fused pipeline computes the same convolution as
//! the flat one and as the sliding-window reference, for random shapes.

use conv_engine::{ConvEngine, EngineConfig};
use conv_geometry::{Padding, ProblemShape};
use proptest::prelude::*;
use wino_kernels::reference_conv_nchw;

fn run(config: EngineConfig, shape: &ProblemShape, input: &[f64], weights: &[f64]) -> Vec<f64> {
    let mut engine = ConvEngine::with_hardware_threads(config, 8)
        .plan::<f64>(shape)
        .unwrap()
        .prepare()
        .unwrap();
    let mut out = vec![0.0; shape.output_len()];
    engine.run(input, weights, None, &mut out).unwrap();
    out
}

fn values(len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-1.0f64..1.0, len)
}

fn problem() -> impl Strategy<Value = (ProblemShape, Vec<f64>, Vec<f64>)> {
    (
        1usize..3,
        1usize..7,
        1usize..7,
        1usize..12,
        1usize..12,
        0usize..3,
    )
        .prop_filter("output must not be empty", |&(_, _, _, h, w, pad)| {
            h + 2 * pad >= 3 && w + 2 * pad >= 3
        })
        .prop_flat_map(|(n, ic, oc, h, w, pad)| {
            let shape =
                ProblemShape::conv2d(n, ic, oc, h, w, 3).with_padding(Padding::uniform(pad));
            (
                Just(shape),
                values(shape.input_len()),
                values(shape.weights_len()),
            )
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_pipelines_agree_with_reference(
        (shape, input, weights) in problem(),
        edge in prop::sample::select(vec![4usize, 5, 6, 7]),
        threads in 1usize..4,
        tile_block in 1usize..5,
    ) {
        let mut expected = vec![0.0; shape.output_len()];
        reference_conv_nchw(&shape, &input, &weights, None, &mut expected).unwrap();

        for mode in ["a000", "a040", "a061", "a0e1"] {
            let config = EngineConfig {
                tile_edge: edge,
                vector_width: 4,
                tile_block,
                threads,
                execution_mode: mode.into(),
                ..Default::default()
            };
            let got = run(config, &shape, &input, &weights);
            for (i, (a, b)) in got.iter().zip(&expected).enumerate() {
                prop_assert!(
                    (a - b).abs() <= 1e-8 * (1.0 + b.abs()),
                    "{} element {}: {} vs {}", mode, i, a, b
                );
            }
        }
    }

    #[test]
    fn prop_thread_count_is_invisible(
        (shape, input, weights) in problem(),
        threads in 2usize..5,
    ) {
        let config = |threads| EngineConfig {
            vector_width: 4,
            tile_block: 2,
            threads,
            execution_mode: "a040".into(),
            ..Default::default()
        };
        let single = run(config(1), &shape, &input, &weights);
        let many = run(config(threads), &shape, &input, &weights);
        prop_assert_eq!(single, many);
    }
}
