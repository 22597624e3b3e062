// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Flat pipelines: three full-tensor passes separated by barriers.
//!
//! Covers plain flat execution, flat execution repeated per input-channel
//! partition (the multiply pass accumulates from the second partition on),
//! and output-channel teams, where each team transforms the input into its
//! own copy and multiplies only its output-channel range.

use super::stages::{group, split_groups, Context, TILE_SCRATCH};
use super::{distribute, distribute_teams, OutputSink, Scratch};
use conv_geometry::Element;
use rayon::prelude::*;
use strategy_planner::Pipeline;

pub(super) fn run<T: Element>(ctx: &Context<'_, T>, scratch: Scratch<'_, T>, sink: &OutputSink<'_, T>) {
    let geom = ctx.geom;
    let s = ctx.strategy;
    let layout = s.layout;
    let aa = geom.points();
    let v = geom.vector_width;
    let team_copies = matches!(s.pipeline, Pipeline::OutputChannelTeamsFlat);
    let copies = if team_copies { layout.teams } else { 1 };
    let Scratch { tinput, toutput, .. } = scratch;
    let copy_len = tinput.len() / copies;
    let out_per_tile = aa * geom.padded_oc;

    for p in 0..s.ic_partitions {
        let ic = s.ic_partition(p);
        let in_per_tile = aa * ic.len() * v;

        // Input transform into every team copy.
        let mut per_team = Vec::with_capacity(copies);
        for copy in tinput.chunks_mut(copy_len) {
            let mut items = Vec::new();
            for (g, block) in split_groups(copy, geom, in_per_tile).into_iter().enumerate() {
                let len = ctx.block_len(geom.tile_block_len(g));
                for (k, chunk) in block.chunks_mut(len).enumerate() {
                    items.push((g, ic.start + k, chunk));
                }
            }
            per_team.push(items);
        }
        distribute_teams(per_team, layout).into_par_iter().for_each(|items| {
            let mut staging = [T::zero(); TILE_SCRATCH];
            for (g, ib, dst) in items {
                ctx.input_block(g, ib, dst, &mut staging);
            }
        });

        // Multiply: each team covers the output blocks of its partition.
        let tin: &[T] = tinput;
        let mut per_team: Vec<Vec<_>> = (0..layout.teams).map(|_| Vec::new()).collect();
        for (g, block) in split_groups(toutput, geom, out_per_tile).into_iter().enumerate() {
            let len = ctx.block_len(geom.tile_block_len(g));
            for (ob, chunk) in block.chunks_mut(len).enumerate() {
                let team = if team_copies { ob / s.oc_blocks_per_partition } else { 0 };
                per_team[team].push((g, ob, chunk));
            }
        }
        distribute_teams(per_team, layout).into_par_iter().for_each(|items| {
            for (g, ob, acc) in items {
                let team = if team_copies { ob / s.oc_blocks_per_partition } else { 0 };
                let copy = &tin[team * copy_len..(team + 1) * copy_len];
                let plan = ctx.gemm(geom.tile_block_len(g), 0..aa, false);
                plan.run(
                    group(copy, geom, in_per_tile, g),
                    ic.start,
                    ctx.weights(0, ob),
                    ic.clone(),
                    acc,
                    p > 0,
                );
            }
        });
    }

    // Output transform.
    let tout: &[T] = toutput;
    let items: Vec<(usize, usize)> = (0..geom.tile_groups)
        .flat_map(|g| (0..geom.oc_blocks).map(move |ob| (g, ob)))
        .collect();
    distribute(items, layout.total_threads())
        .into_par_iter()
        .for_each(|items| {
            let mut tile = [T::zero(); TILE_SCRATCH];
            for (g, ob) in items {
                let len = ctx.block_len(geom.tile_block_len(g));
                let src = &group(tout, geom, out_per_tile, g)[ob * len..(ob + 1) * len];
                // SAFETY: every (group, block) pair is in exactly one item list.
                unsafe { ctx.output_block(g, ob, src, sink, &mut tile) };
            }
        });
}
