// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-work-item stage bodies shared by every Winograd pipeline.
//!
//! Buffer layouts, with `pt = wa·A + ha` the transformed point and `Tz`
//! the tiles of the current tile block:
//!
//! ```text
//!   transformed weights  [copy][oc/V][ic/V][pt][V_i][V_o]
//!   transformed input    [ic block][pt][Tz][V]        (one tile block)
//!   transformed output   [oc block][pt][Tz][V]        (one tile block)
//!   row-fused partial    [wa][oc block][Tz][m][V]     (one output partition)
//! ```

use super::sink::OutputSink;
use conv_geometry::{BlockGeometry, Element, TileMapper};
use rayon::prelude::*;
use std::ops::Range;
use strategy_planner::ExecutionStrategy;
use wino_kernels::{gather, Epilogue, GemmPlan, Plane, WinogradKernel, MAX_LANES, MAX_TILE_EDGE};

/// Scratch for one gathered `[A][A][lanes]` tile or one `[m][m][lanes]` result.
pub(crate) const TILE_SCRATCH: usize = MAX_TILE_EDGE * MAX_TILE_EDGE * MAX_LANES;

/// Read-only state shared by every worker during one run.
pub(crate) struct Context<'a, T: Element> {
    pub geom: &'a BlockGeometry,
    pub strategy: &'a ExecutionStrategy,
    pub kernel: &'a dyn WinogradKernel<T>,
    pub mapper: TileMapper,
    pub epilogue: Epilogue,
    /// Blocked input `(n, ic/V, ih, iw, V)`.
    pub input: &'a [T],
    pub tweights: &'a [T],
    /// Padded bias, empty when the epilogue adds none.
    pub bias: &'a [T],
}

impl<'a, T: Element> Context<'a, T> {
    /// Elements of one transformed channel block for `tiles` tiles.
    #[inline]
    pub fn block_len(&self, tiles: usize) -> usize {
        self.geom.points() * tiles * self.geom.vector_width
    }

    /// Elements of one rows-pass result block for `tiles` tiles.
    #[inline]
    pub fn column_len(&self, tiles: usize) -> usize {
        self.geom.tile_edge * tiles * self.geom.vector_width
    }

    #[inline]
    pub fn ic_lanes(&self, ib: usize) -> usize {
        if ib + 1 == self.geom.ic_blocks {
            self.geom.ic_remainder
        } else {
            self.geom.vector_width
        }
    }

    #[inline]
    pub fn oc_lanes(&self, ob: usize) -> usize {
        if ob + 1 == self.geom.oc_blocks {
            self.geom.oc_remainder
        } else {
            self.geom.vector_width
        }
    }

    fn bias_for(&self, ob: usize) -> &'a [T] {
        let v = self.geom.vector_width;
        if self.bias.is_empty() {
            &[]
        } else {
            &self.bias[ob * v..(ob + 1) * v]
        }
    }

    /// Transformed weights of output block `ob`: `[ic/V][pt][V][V]`.
    pub fn weights(&self, copy: usize, ob: usize) -> &'a [T] {
        let g = self.geom;
        let v = g.vector_width;
        let per_block = g.ic_blocks * g.points() * v * v;
        let one_copy = g.oc_blocks * per_block;
        &self.tweights[copy * one_copy + ob * per_block..][..per_block]
    }

    /// Multiply-accumulate plan for a tile block of `tiles` tiles.
    pub fn gemm(&self, tiles: usize, points: Range<usize>, input_column: bool) -> GemmPlan {
        GemmPlan {
            vector_width: self.geom.vector_width,
            tiles,
            points_per_tile: self.geom.points(),
            points,
            input_column,
            ic_blocks: self.geom.ic_blocks,
            ic_remainder: self.geom.ic_remainder,
        }
    }

    /// Runs `plan` for every output block in `oc`, writing block `k` of
    /// `oc` to `acc[k * stride..]`.
    #[allow(clippy::too_many_arguments)]
    pub fn multiply(
        &self,
        plan: &GemmPlan,
        input: &[T],
        ic: Range<usize>,
        ic_base: usize,
        copy: usize,
        oc: Range<usize>,
        acc: &mut [T],
        accumulate: bool,
    ) {
        let stride = plan.points.len() * plan.tiles * self.geom.vector_width;
        for (k, ob) in oc.enumerate() {
            plan.run(
                input,
                ic_base,
                self.weights(copy, ob),
                ic.clone(),
                &mut acc[k * stride..(k + 1) * stride],
                accumulate,
            );
        }
    }

    fn plane(&self, batch: usize, ib: usize) -> Plane<'a, T> {
        let s = &self.geom.shape;
        let v = self.geom.vector_width;
        let len = s.in_height * s.in_width * v;
        Plane {
            data: &self.input[(batch * self.geom.ic_blocks + ib) * len..][..len],
            width: s.in_width,
            vector_width: v,
        }
    }

    /// Transforms input block `ib` of every tile in group `g` into
    /// `dst` (`[pt][Tz][V]`).
    pub fn input_block(&self, g: usize, ib: usize, dst: &mut [T], staging: &mut [T]) {
        let a = self.geom.tile_edge;
        let v = self.geom.vector_width;
        let tz = self.geom.tile_block_len(g);
        let lanes = self.ic_lanes(ib);
        for z in 0..tz {
            let tile = self.mapper.input_tile(self.mapper.tile_index(g, z));
            gather(&self.plane(tile.batch, ib), &tile, a, lanes, staging);
            self.kernel.transform_input(staging, lanes, &mut dst[z * v..], tz * v);
        }
    }

    /// Like [`Self::input_block`] for the `A` points of column `wa` only
    /// (`dst` is `[ha][Tz][V]`).
    pub fn input_column(&self, g: usize, ib: usize, wa: usize, dst: &mut [T], staging: &mut [T]) {
        let a = self.geom.tile_edge;
        let v = self.geom.vector_width;
        let tz = self.geom.tile_block_len(g);
        let lanes = self.ic_lanes(ib);
        for z in 0..tz {
            let tile = self.mapper.input_tile(self.mapper.tile_index(g, z));
            gather(&self.plane(tile.batch, ib), &tile, a, lanes, staging);
            self.kernel
                .transform_input_column(staging, lanes, wa, &mut dst[z * v..], tz * v);
        }
    }

    /// Transforms output block `ob` of group `g` back and stores it.
    ///
    /// `src` is the block's `[pt][Tz][V]` accumulator.
    ///
    /// # Safety
    /// `(g, ob)` must be owned by the calling worker for the whole stage.
    pub unsafe fn output_block(
        &self,
        g: usize,
        ob: usize,
        src: &[T],
        sink: &OutputSink<'_, T>,
        tile_buf: &mut [T],
    ) {
        let v = self.geom.vector_width;
        let tz = self.geom.tile_block_len(g);
        let lanes = self.oc_lanes(ob);
        let bias = self.bias_for(ob);
        for z in 0..tz {
            self.kernel
                .transform_output(&src[z * v..], tz * v, lanes, tile_buf);
            let tile = self.mapper.output_tile(self.mapper.tile_index(g, z));
            // SAFETY: forwarded from the caller.
            unsafe { sink.store_tile(&tile, ob, tile_buf, lanes, bias, &self.epilogue) };
        }
    }

    /// Rows pass of column `wa` for the output blocks `oc`.
    ///
    /// `acc` holds `[oc3][ha][Tz][V]` for that column; the results go to
    /// `partial[((wa·oc3 + o3)·Tz + z)·m·V]`.
    pub fn output_rows(&self, g: usize, wa: usize, oc: Range<usize>, acc: &[T], partial: &mut [T]) {
        let v = self.geom.vector_width;
        let m = self.geom.out_tile;
        let tz = self.geom.tile_block_len(g);
        let oc3 = oc.len();
        for (o3, ob) in oc.enumerate() {
            let lanes = self.oc_lanes(ob);
            let block = &acc[o3 * self.column_len(tz)..];
            for z in 0..tz {
                let at = ((wa * oc3 + o3) * tz + z) * m * v;
                self.kernel
                    .transform_output_rows(&block[z * v..], tz * v, lanes, &mut partial[at..]);
            }
        }
    }

    /// Columns pass over `partial` (see [`Self::output_rows`]) and store.
    ///
    /// # Safety
    /// Every `(g, ob)` with `ob` in `oc` must be owned by the calling worker.
    pub unsafe fn output_cols(
        &self,
        g: usize,
        oc: Range<usize>,
        partial: &[T],
        sink: &OutputSink<'_, T>,
        tile_buf: &mut [T],
    ) {
        let v = self.geom.vector_width;
        let m = self.geom.out_tile;
        let tz = self.geom.tile_block_len(g);
        let oc3 = oc.len();
        let stride = oc3 * tz * m * v;
        for (o3, ob) in oc.enumerate() {
            let lanes = self.oc_lanes(ob);
            let bias = self.bias_for(ob);
            for z in 0..tz {
                self.kernel.transform_output_cols(
                    &partial[(o3 * tz + z) * m * v..],
                    stride,
                    lanes,
                    tile_buf,
                );
                let tile = self.mapper.output_tile(self.mapper.tile_index(g, z));
                // SAFETY: forwarded from the caller.
                unsafe { sink.store_tile(&tile, ob, tile_buf, lanes, bias, &self.epilogue) };
            }
        }
    }
}

/// Transforms blocked weights `(oc/V, ic/V, K, K, V_i, V_o)` into
/// `tweights` and replicates the result into every further copy.
pub(crate) fn transform_weights<T: Element>(
    geom: &BlockGeometry,
    kernel: &dyn WinogradKernel<T>,
    blocked: &[T],
    tweights: &mut [T],
    copies: usize,
) {
    let v = geom.vector_width;
    let kk = geom.kernel * geom.kernel;
    let block = v * v;
    let one_copy = geom.points() * geom.padded_ic * geom.padded_oc;
    let (first, rest) = tweights.split_at_mut(one_copy);

    first
        .par_chunks_mut(geom.points() * block)
        .zip(blocked.par_chunks(kk * block))
        .for_each(|(dst, src)| kernel.transform_weights(src, block, dst, block));

    let first: &[T] = first;
    rest[..(copies.max(1) - 1) * one_copy]
        .par_chunks_mut(one_copy)
        .for_each(|copy| copy.copy_from_slice(first));
}

/// Contiguous per-group slices of a buffer holding `per_tile` elements per
/// tile; the last group is `Tr` tiles long.
pub(crate) fn split_groups<'b, T>(
    buf: &'b mut [T],
    geom: &BlockGeometry,
    per_tile: usize,
) -> Vec<&'b mut [T]> {
    let mut groups = Vec::with_capacity(geom.tile_groups);
    let mut rest = buf;
    for g in 0..geom.tile_groups {
        let (head, tail) = rest.split_at_mut(geom.tile_block_len(g) * per_tile);
        groups.push(head);
        rest = tail;
    }
    groups
}

/// Read-only view of group `g` in a buffer laid out like [`split_groups`].
pub(crate) fn group<'b, T>(buf: &'b [T], geom: &BlockGeometry, per_tile: usize, g: usize) -> &'b [T] {
    &buf[g * geom.tile_block * per_tile..][..geom.tile_block_len(g) * per_tile]
}

#[cfg(test)]
mod tests {
    use super::*;
    use conv_geometry::ProblemShape;
    use wino_kernels::MatrixKernel;

    #[test]
    fn test_split_groups_remainder() {
        // 3x3 tiles with T = 4 → groups of 4, 4, 1.
        let shape = ProblemShape::conv2d(1, 4, 4, 6, 6, 3);
        let geom = BlockGeometry::derive(&shape, 4, 4, 4).unwrap();
        assert_eq!(geom.tiles, 9);
        let mut buf = vec![0u8; geom.tiles * 2];
        let lens: Vec<usize> = split_groups(&mut buf, &geom, 2).iter().map(|g| g.len()).collect();
        assert_eq!(lens, vec![8, 8, 2]);
        assert_eq!(group(&buf, &geom, 2, 2).len(), 2);
    }

    #[test]
    fn test_weight_copies_replicated() {
        let shape = ProblemShape::conv2d(1, 4, 4, 4, 4, 3);
        let geom = BlockGeometry::derive(&shape, 4, 4, 1).unwrap();
        let kernel = MatrixKernel::<f32>::f2x2_3x3();
        let blocked: Vec<f32> = (0..geom.blocked_weights_len()).map(|i| i as f32 * 0.1).collect();
        let one = geom.points() * geom.padded_ic * geom.padded_oc;
        let mut tw = vec![0.0f32; one * 3];
        transform_weights(&geom, &kernel, &blocked, &mut tw, 3);
        assert!(tw[..one].iter().any(|&x| x != 0.0));
        assert_eq!(&tw[..one], &tw[one..2 * one]);
        assert_eq!(&tw[..one], &tw[2 * one..]);
    }
}
