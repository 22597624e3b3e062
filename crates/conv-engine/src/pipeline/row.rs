// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Row-fused pipelines.
//!
//! The multiply runs one transform column `wa` (`A` points) at a time and
//! its rows pass follows immediately, so only `A` points per output block
//! are live in the private accumulator. The rows results of every column
//! collect in the partial-output buffer, and a final columns pass per tile
//! block assembles and stores the output tiles.

use super::stages::{group, split_groups, Context, TILE_SCRATCH};
use super::{distribute, input_pass, OutputSink, Scratch};
use conv_geometry::Element;
use rayon::prelude::*;

/// Elements of one output partition's partial region for `tiles` tiles.
fn partition_len<T: Element>(ctx: &Context<'_, T>, tiles: usize) -> usize {
    let g = ctx.geom;
    g.tile_edge * g.out_tile * ctx.strategy.oc_blocks_per_partition * g.vector_width * tiles
}

/// Shared full input transform; items are (tile block, output partition).
pub(super) fn shared_input<T: Element>(
    ctx: &Context<'_, T>,
    scratch: Scratch<'_, T>,
    sink: &OutputSink<'_, T>,
) {
    let geom = ctx.geom;
    let s = ctx.strategy;
    let a = geom.tile_edge;
    let slots = s.total_threads();
    let Scratch {
        tinput,
        toutput,
        partial,
    } = scratch;
    input_pass(ctx, tinput, slots);

    let tin: &[T] = tinput;
    let in_per_tile = geom.points() * geom.padded_ic;
    let partial_per_tile = a * geom.out_tile * geom.padded_oc;
    let mut items = Vec::new();
    for (g, region) in split_groups(partial, geom, partial_per_tile).into_iter().enumerate() {
        let len = partition_len(ctx, geom.tile_block_len(g));
        for (p, chunk) in region.chunks_mut(len).enumerate() {
            items.push((g, p, chunk));
        }
    }
    let out_len = toutput.len() / slots;
    let workers: Vec<_> = toutput
        .chunks_mut(out_len)
        .zip(distribute(items, slots))
        .collect();

    workers.into_par_iter().for_each(|(acc, items)| {
        let mut tile = [T::zero(); TILE_SCRATCH];
        for (g, p, part) in items {
            let tz = geom.tile_block_len(g);
            let ti = group(tin, geom, in_per_tile, g);
            let oc = s.oc_partition(p);
            for wa in 0..a {
                let plan = ctx.gemm(tz, wa * a..(wa + 1) * a, false);
                ctx.multiply(&plan, ti, 0..geom.ic_blocks, 0, 0, oc.clone(), acc, false);
                ctx.output_rows(g, wa, oc.clone(), acc, part);
            }
            // SAFETY: each (group, partition) item is owned by one worker.
            unsafe { ctx.output_cols(g, oc, part, sink, &mut tile) };
        }
    });
}

/// Private row-sized input transform; workers own whole tile blocks.
pub(super) fn private_input<T: Element>(
    ctx: &Context<'_, T>,
    scratch: Scratch<'_, T>,
    sink: &OutputSink<'_, T>,
) {
    let geom = ctx.geom;
    let s = ctx.strategy;
    let a = geom.tile_edge;
    let slots = s.total_threads();
    let Scratch {
        tinput,
        toutput,
        partial,
    } = scratch;
    let in_len = tinput.len() / slots;
    let out_len = toutput.len() / slots;
    let partial_per_tile = a * geom.out_tile * geom.padded_oc;

    let owned: Vec<_> = split_groups(partial, geom, partial_per_tile)
        .into_iter()
        .enumerate()
        .collect();
    let workers: Vec<_> = tinput
        .chunks_mut(in_len)
        .zip(toutput.chunks_mut(out_len))
        .zip(distribute(owned, slots))
        .collect();

    workers.into_par_iter().for_each(|((ti, acc), groups)| {
        let mut staging = [T::zero(); TILE_SCRATCH];
        let mut tile = [T::zero(); TILE_SCRATCH];
        for (g, region) in groups {
            let tz = geom.tile_block_len(g);
            let column = ctx.column_len(tz);
            let len = partition_len(ctx, tz);
            for wa in 0..a {
                for ib in 0..geom.ic_blocks {
                    ctx.input_column(g, ib, wa, &mut ti[ib * column..(ib + 1) * column], &mut staging);
                }
                let plan = ctx.gemm(tz, wa * a..(wa + 1) * a, true);
                for p in 0..s.oc_partitions {
                    let oc = s.oc_partition(p);
                    ctx.multiply(&plan, ti, 0..geom.ic_blocks, 0, 0, oc.clone(), acc, false);
                    ctx.output_rows(g, wa, oc, acc, &mut region[p * len..(p + 1) * len]);
                }
            }
            for p in 0..s.oc_partitions {
                // SAFETY: each group is owned by one worker.
                unsafe {
                    ctx.output_cols(g, s.oc_partition(p), &region[p * len..(p + 1) * len], sink, &mut tile)
                };
            }
        }
    });
}
