// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `wino bench` command: sweep strategy codes over one problem.
//!
//! Each strategy gets a fresh engine, one warm-up run (which transforms the
//! weights) and `runs` timed steady-state runs. Strategies the problem or
//! the machine cannot host are reported and skipped.

use super::{banner, load_config, synthetic, OverrideArgs, ProblemArgs};
use conv_engine::{ConvEngine, EngineConfig};
use conv_geometry::ProblemShape;
use std::path::Path;
use std::time::Duration;

struct Row {
    mode: String,
    selected: String,
    mean: Duration,
    gmacs: f64,
    scratch_kib: f64,
}

pub fn execute(
    config_path: Option<&Path>,
    problem: ProblemArgs,
    overrides: OverrideArgs,
    modes: String,
    runs: usize,
) -> anyhow::Result<()> {
    banner("wino · Benchmark Suite");

    let base = load_config(config_path, &overrides)?;
    let shape = problem.shape();
    let modes: Vec<&str> = modes.split(',').map(str::trim).filter(|m| !m.is_empty()).collect();

    println!("  Problem:    {shape}");
    println!("  Strategies: {modes:?}");
    println!("  Runs:       {runs}");
    println!();

    let input = synthetic(shape.input_len(), 1);
    let weights = synthetic(shape.weights_len(), 2);
    let mut output = vec![0.0f32; shape.output_len()];

    let mut rows = Vec::new();
    for mode in modes {
        let config = EngineConfig {
            execution_mode: mode.to_string(),
            ..base.clone()
        };
        match bench_one(config, &shape, &input, &weights, &mut output, runs) {
            Ok(row) => rows.push(row),
            Err(e) => {
                tracing::warn!(mode, error = %e, "strategy skipped");
                println!("  {mode}: skipped ({e})");
            }
        }
    }
    println!();

    // ── Results ────────────────────────────────────────────────
    println!(
        "  {:<6} {:<10} {:>12} {:>10} {:>12}",
        "Mode", "Selected", "Mean", "GMAC/s", "Scratch KiB",
    );
    println!("  {}", "-".repeat(54));
    for row in &rows {
        println!(
            "  {:<6} {:<10} {:>12.3?} {:>10.2} {:>12.1}",
            row.mode, row.selected, row.mean, row.gmacs, row.scratch_kib,
        );
    }
    if let Some(best) = rows.iter().min_by_key(|r| r.mean) {
        println!();
        println!("  Fastest: {} ({:.3?})", best.selected, best.mean);
    }
    Ok(())
}

fn bench_one(
    config: EngineConfig,
    shape: &ProblemShape,
    input: &[f32],
    weights: &[f32],
    output: &mut [f32],
    runs: usize,
) -> anyhow::Result<Row> {
    let mode = config.execution_mode.clone();
    let mut engine = ConvEngine::initialize::<f32>(config, shape)?;
    engine.run(input, weights, None, output)?;

    let mut total = Duration::ZERO;
    let mut macs = 0u64;
    for _ in 0..runs.max(1) {
        let m = engine.run(input, weights, None, output)?;
        total += m.total_duration;
        macs += m.macs;
    }
    let secs = total.as_secs_f64();
    let row = Row {
        mode,
        selected: engine.strategy().label(),
        mean: total / runs.max(1) as u32,
        gmacs: if secs > 0.0 { macs as f64 / secs / 1e9 } else { 0.0 },
        scratch_kib: engine.arena_stats().live_bytes as f64 / 1024.0,
    };
    engine.teardown();
    Ok(row)
}
