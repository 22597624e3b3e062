// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tile-fused pipelines.
//!
//! A worker takes one tile block at a time through input transform,
//! multiply and output transform, so the transformed tiles stay in its
//! private scratch slice. The variants differ in which part of the work a
//! worker owns and in which buffers are shared.

use super::stages::{group, split_groups, Context, TILE_SCRATCH};
use super::{distribute, input_pass, slot_groups, OutputSink, Scratch};
use conv_geometry::Element;
use rayon::prelude::*;
use std::ops::Range;
use strategy_planner::{Pipeline, Teaming};

/// Private input and output scratch per worker.
///
/// Serves plain tile fusion, tile + output fusion with private input,
/// tile teams (each team multiplies with its own weights copy) and
/// output-channel teams (each team owns one output partition).
pub(super) fn private_input<T: Element>(
    ctx: &Context<'_, T>,
    scratch: Scratch<'_, T>,
    sink: &OutputSink<'_, T>,
) {
    let geom = ctx.geom;
    let s = ctx.strategy;
    let layout = s.layout;
    let slots = layout.total_threads();
    let Scratch { tinput, toutput, .. } = scratch;
    let in_len = tinput.len() / slots;
    let out_len = toutput.len() / slots;

    let workers: Vec<(usize, &mut [T], &mut [T])> = tinput
        .chunks_mut(in_len)
        .zip(toutput.chunks_mut(out_len))
        .enumerate()
        .map(|(slot, (ti, to))| (slot, ti, to))
        .collect();

    workers.into_par_iter().for_each(|(slot, ti, to)| {
        let team = layout.team_of(slot);
        let copy = match s.key.teaming {
            Teaming::Tile => team,
            _ => 0,
        };
        let partitions: Range<usize> = match s.pipeline {
            Pipeline::OutputChannelTeams => team..team + 1,
            _ => 0..s.oc_partitions,
        };
        let mut staging = [T::zero(); TILE_SCRATCH];
        let mut tile = [T::zero(); TILE_SCRATCH];

        for g in slot_groups(s, slot, geom.tile_groups) {
            let len = ctx.block_len(geom.tile_block_len(g));
            for ib in 0..geom.ic_blocks {
                ctx.input_block(g, ib, &mut ti[ib * len..(ib + 1) * len], &mut staging);
            }
            let plan = ctx.gemm(geom.tile_block_len(g), 0..geom.points(), false);
            for p in partitions.clone() {
                let oc = s.oc_partition(p);
                ctx.multiply(&plan, ti, 0..geom.ic_blocks, 0, copy, oc.clone(), to, false);
                for (k, ob) in oc.enumerate() {
                    // SAFETY: tile groups are partitioned across the workers
                    // of a team, and teams split either tiles or output blocks.
                    unsafe { ctx.output_block(g, ob, &to[k * len..(k + 1) * len], sink, &mut tile) };
                }
            }
        }
    });
}

/// Shared flat input transform, then per (tile block, output partition)
/// items with a private output accumulator.
pub(super) fn shared_input<T: Element>(
    ctx: &Context<'_, T>,
    scratch: Scratch<'_, T>,
    sink: &OutputSink<'_, T>,
) {
    let geom = ctx.geom;
    let s = ctx.strategy;
    let slots = s.total_threads();
    let Scratch { tinput, toutput, .. } = scratch;
    input_pass(ctx, tinput, slots);

    let tin: &[T] = tinput;
    let in_per_tile = geom.points() * geom.padded_ic;
    let items: Vec<(usize, usize)> = (0..geom.tile_groups)
        .flat_map(|g| (0..s.oc_partitions).map(move |p| (g, p)))
        .collect();
    let out_len = toutput.len() / slots;
    let workers: Vec<_> = toutput
        .chunks_mut(out_len)
        .zip(distribute(items, slots))
        .collect();

    workers.into_par_iter().for_each(|(to, items)| {
        let mut tile = [T::zero(); TILE_SCRATCH];
        for (g, p) in items {
            let len = ctx.block_len(geom.tile_block_len(g));
            let plan = ctx.gemm(geom.tile_block_len(g), 0..geom.points(), false);
            let oc = s.oc_partition(p);
            let ti = group(tin, geom, in_per_tile, g);
            ctx.multiply(&plan, ti, 0..geom.ic_blocks, 0, 0, oc.clone(), to, false);
            for (k, ob) in oc.enumerate() {
                // SAFETY: each (group, partition) item is owned by one worker.
                unsafe { ctx.output_block(g, ob, &to[k * len..(k + 1) * len], sink, &mut tile) };
            }
        }
    });
}

/// Input-partition fusion: a worker transforms one input partition of a
/// tile block at a time and accumulates into that block's slice of the
/// shared full-size output accumulator.
pub(super) fn input_partitioned<T: Element>(
    ctx: &Context<'_, T>,
    scratch: Scratch<'_, T>,
    sink: &OutputSink<'_, T>,
) {
    let geom = ctx.geom;
    let s = ctx.strategy;
    let slots = s.total_threads();
    let Scratch { tinput, toutput, .. } = scratch;
    let in_len = tinput.len() / slots;
    let out_per_tile = geom.points() * geom.padded_oc;

    let owned: Vec<_> = split_groups(toutput, geom, out_per_tile)
        .into_iter()
        .enumerate()
        .collect();
    let workers: Vec<_> = tinput
        .chunks_mut(in_len)
        .zip(distribute(owned, slots))
        .collect();

    workers.into_par_iter().for_each(|(ti, groups)| {
        let mut staging = [T::zero(); TILE_SCRATCH];
        let mut tile = [T::zero(); TILE_SCRATCH];
        for (g, acc) in groups {
            let len = ctx.block_len(geom.tile_block_len(g));
            let plan = ctx.gemm(geom.tile_block_len(g), 0..geom.points(), false);
            for pin in 0..s.ic_partitions {
                let ic = s.ic_partition(pin);
                for (k, ib) in ic.clone().enumerate() {
                    ctx.input_block(g, ib, &mut ti[k * len..(k + 1) * len], &mut staging);
                }
                for p in 0..s.oc_partitions {
                    let oc = s.oc_partition(p);
                    let at = oc.start * len;
                    ctx.multiply(&plan, ti, ic.clone(), ic.start, 0, oc, &mut acc[at..], pin > 0);
                }
            }
            for ob in 0..geom.oc_blocks {
                // SAFETY: each group is owned by one worker.
                unsafe { ctx.output_block(g, ob, &acc[ob * len..(ob + 1) * len], sink, &mut tile) };
            }
        }
    });
}
