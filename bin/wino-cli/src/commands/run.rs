// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `wino run` command: initialise an engine for a synthetic problem, run it
//! repeatedly and print the metrics.

use super::{banner, load_config, max_relative_error, synthetic, OverrideArgs, ProblemArgs};
use conv_engine::ConvEngine;
use std::path::Path;
use wino_kernels::reference_conv_nchw;

/// Accepted relative error against the reference in single precision.
const VERIFY_TOLERANCE: f32 = 1e-3;

pub fn execute(
    config_path: Option<&Path>,
    problem: ProblemArgs,
    overrides: OverrideArgs,
    runs: usize,
    verify: bool,
) -> anyhow::Result<()> {
    banner("wino · Run");

    let config = load_config(config_path, &overrides)?;
    let shape = problem.shape();
    println!("  Problem:    {shape}");

    let mut engine = ConvEngine::initialize::<f32>(config.clone(), &shape)?;
    println!("  Strategy:   {}", engine.strategy().summary());
    for reason in &engine.selection().fallbacks {
        println!("  Fallback:   {reason}");
    }
    println!();

    let input = synthetic(shape.input_len(), 1);
    let weights = synthetic(shape.weights_len(), 2);
    let bias = config
        .with_bias
        .then(|| synthetic(shape.out_channels, 3));
    let mut output = vec![0.0f32; shape.output_len()];

    let first = engine.run(&input, &weights, bias.as_deref(), &mut output)?;
    println!("  First run:  {}", first.summary());
    for _ in 0..runs {
        engine.run(&input, &weights, bias.as_deref(), &mut output)?;
    }
    if let Some(last) = &engine.metrics().last {
        println!("  Last run:   {}", last.summary());
    }
    println!("  Engine:     {}", engine.metrics().summary());
    println!("  Arena:      {:?}", engine.arena_stats());
    println!();

    if verify {
        let default_layouts = config.input_format == Default::default()
            && config.weights_format == Default::default()
            && config.output_format == Default::default();
        if !default_layouts || config.with_sum || config.with_relu {
            anyhow::bail!("--verify supports nchw/oihw layouts without sum or relu");
        }
        let mut expected = vec![0.0f32; shape.output_len()];
        reference_conv_nchw(&shape, &input, &weights, bias.as_deref(), &mut expected)?;
        let err = max_relative_error(&output, &expected);
        println!("  Verify:     max relative error {err:.2e}");
        if err > VERIFY_TOLERANCE {
            anyhow::bail!("output differs from the reference by {err:.2e}");
        }
        println!("  Verify:     OK");
    }

    engine.teardown();
    Ok(())
}
