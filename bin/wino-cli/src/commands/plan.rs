// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `wino plan` command: show what the engine would do without allocating.

use super::{banner, load_config, OverrideArgs, ProblemArgs};
use conv_engine::ConvPlan;
use std::path::Path;
use strategy_planner::StrategySelector;

pub fn execute(
    config_path: Option<&Path>,
    problem: ProblemArgs,
    overrides: OverrideArgs,
    json: bool,
) -> anyhow::Result<()> {
    let config = load_config(config_path, &overrides)?;
    let shape = problem.shape();
    let hardware = StrategySelector::detect().hardware_threads();
    let plan = ConvPlan::<f32>::build(&config, &shape, hardware)?;

    if json {
        let doc = serde_json::json!({
            "shape": plan.shape(),
            "algorithm": plan.algorithm(),
            "hardware_threads": hardware,
            "geometry": plan.geometry(),
            "strategy": plan.strategy(),
            "fallbacks": plan.selection().fallbacks,
            "buffers": plan.buffers(),
            "scratch_bytes": plan.buffers().total_bytes(std::mem::size_of::<f32>()),
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    banner("wino · Plan");
    println!("  Hardware threads: {hardware}");
    println!();
    for line in plan.summary().lines() {
        println!("  {line}");
    }
    println!();

    // ── Buffers ────────────────────────────────────────────────
    println!("  {:<12} {:>14} {:>12}", "Buffer", "Elements", "KiB (f32)");
    println!("  {}", "-".repeat(40));
    for (role, len) in plan.buffers().requests() {
        println!(
            "  {:<12} {:>14} {:>12.1}",
            role.as_str(),
            len,
            (len * std::mem::size_of::<f32>()) as f64 / 1024.0,
        );
    }
    let ws = plan.buffers().working_set;
    println!();
    println!("  Working set: L1 ~{} elements, L2 ~{} elements", ws.l1, ws.l2);
    Ok(())
}
