// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Direct pipeline: output rows of the blocked output are independent
//! contiguous chunks, split statically over the workers.

use crate::pipeline::distribute;
use conv_geometry::{BlockGeometry, Element};
use rayon::prelude::*;
use wino_kernels::{DirectConv, Epilogue, MAX_LANES};

pub(crate) struct DirectPass<'a, T> {
    pub geom: &'a BlockGeometry,
    pub epilogue: Epilogue,
    /// Blocked input `(n, ic/V, ih, iw, V)`.
    pub input: &'a [T],
    /// Blocked weights `(oc/V, ic/V, kh, kw, V_i, V_o)`.
    pub weights: &'a [T],
    /// Padded bias, empty when the epilogue adds none.
    pub bias: &'a [T],
}

impl<T: Element> DirectPass<'_, T> {
    pub(crate) fn run(&self, output: &mut [T], slots: usize) {
        let geom = self.geom;
        let v = geom.vector_width;
        let (oh, ow) = (geom.shape.out_height, geom.shape.out_width);
        let row_len = ow * v;
        if row_len == 0 {
            return;
        }
        let conv = DirectConv::new(geom);
        let rows: Vec<(usize, &mut [T])> = output.chunks_mut(row_len).enumerate().collect();

        distribute(rows, slots).into_par_iter().for_each(|rows| {
            let mut pixel = [T::zero(); MAX_LANES];
            for (index, dst) in rows {
                let oy = index % oh;
                let ob = (index / oh) % geom.oc_blocks;
                let n = index / (oh * geom.oc_blocks);
                let lanes = if ob + 1 == geom.oc_blocks {
                    geom.oc_remainder
                } else {
                    v
                };
                let bias = if self.bias.is_empty() {
                    &[][..]
                } else {
                    &self.bias[ob * v..(ob + 1) * v]
                };
                for ox in 0..ow {
                    conv.compute_pixel(self.input, self.weights, n, ob, oy, ox, &mut pixel);
                    self.epilogue.store(
                        &pixel[..lanes],
                        lanes,
                        bias,
                        &mut dst[ox * v..(ox + 1) * v],
                        v,
                    );
                }
            }
        });
    }
}
