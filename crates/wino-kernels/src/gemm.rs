// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Block multiply-accumulate in the transformed domain.
//!
//! For every transformed point `pt`, output-channel block `o` and tile `z`
//! of a tile block:
//!
//! ```text
//!   acc[pt][z][vo] += Σ_ib Σ_vi  input[ib][pt][z][vi] · weights[o][ib][pt][vi][vo]
//! ```
//!
//! The last input-channel block uses [`BlockGemm::Tail`] when it has fewer
//! valid lanes than the vector width. The variant is picked once per
//! channel block, outside the point and tile loops.

use conv_geometry::Element;
use std::ops::Range;

/// Inner multiply-accumulate variant for one input-channel block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockGemm {
    /// All `V` input lanes are valid.
    Full,
    /// Only the first `n` input lanes are valid.
    Tail(usize),
}

impl BlockGemm {
    /// Variant for input-channel block `block` of `blocks`.
    pub fn for_block(block: usize, blocks: usize, remainder: usize, vector_width: usize) -> Self {
        if block + 1 == blocks && remainder < vector_width {
            BlockGemm::Tail(remainder)
        } else {
            BlockGemm::Full
        }
    }

    #[inline]
    pub fn lanes(self, vector_width: usize) -> usize {
        match self {
            BlockGemm::Full => vector_width,
            BlockGemm::Tail(n) => n,
        }
    }

    /// `acc[z][vo] += Σ_vi input[z][vi] · weights[vi][vo]` over `tiles` tiles.
    #[inline]
    pub fn accumulate<T: Element>(
        self,
        input: &[T],
        weights: &[T],
        acc: &mut [T],
        tiles: usize,
        v: usize,
    ) {
        let lanes = self.lanes(v);
        for z in 0..tiles {
            let x = &input[z * v..z * v + lanes];
            let out = &mut acc[z * v..(z + 1) * v];
            for (vi, &xv) in x.iter().enumerate() {
                let w = &weights[vi * v..(vi + 1) * v];
                for (o, &wv) in out.iter_mut().zip(w) {
                    *o = *o + xv * wv;
                }
            }
        }
    }
}

/// Strides and ranges for a block multiply-accumulate over one tile block.
///
/// Transformed input is `[ic_local][input_points][tiles][V]`; transformed
/// weights for one output block are `[ic][points_per_tile][V][V]`; the
/// accumulator is `[points.len()][tiles][V]`.
#[derive(Debug, Clone)]
pub struct GemmPlan {
    pub vector_width: usize,
    /// Tiles in this tile block (`T` or the last-block remainder).
    pub tiles: usize,
    /// `A²`.
    pub points_per_tile: usize,
    /// Transformed points to accumulate, e.g. `0..A²` or one column.
    pub points: Range<usize>,
    /// The transformed input holds only `points`, not all `A²`.
    pub input_column: bool,
    pub ic_blocks: usize,
    pub ic_remainder: usize,
}

impl GemmPlan {
    fn input_points(&self) -> usize {
        if self.input_column {
            self.points.len()
        } else {
            self.points_per_tile
        }
    }

    /// Accumulates input-channel blocks `ic` into `acc`.
    ///
    /// `input` starts at the first block of its partition, `ic_base`. When
    /// `accumulate` is false the accumulator is cleared first.
    pub fn run<T: Element>(
        &self,
        input: &[T],
        ic_base: usize,
        weights: &[T],
        ic: Range<usize>,
        acc: &mut [T],
        accumulate: bool,
    ) {
        let v = self.vector_width;
        let tz = self.tiles;
        let plane = tz * v;
        let acc = &mut acc[..self.points.len() * plane];
        if !accumulate {
            acc.fill(T::zero());
        }
        let in_points = self.input_points();
        for ib in ic {
            let variant = BlockGemm::for_block(ib, self.ic_blocks, self.ic_remainder, v);
            let local = ib - ic_base;
            for (k, pt) in self.points.clone().enumerate() {
                let ipt = if self.input_column { k } else { pt };
                let x = &input[(local * in_points + ipt) * plane..][..plane];
                let w = &weights[(ib * self.points_per_tile + pt) * v * v..][..v * v];
                variant.accumulate(x, w, &mut acc[k * plane..(k + 1) * plane], tz, v);
            }
        }
    }
}
