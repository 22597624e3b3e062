// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Shared write access to the blocked output tensor.
//!
//! An output tile covers `rows` separate row segments of the blocked output
//! `(n, oc/V, oh, ow, V)`, so the regions owned by different workers
//! interleave in memory and cannot be handed out as disjoint `&mut` slices
//! up front. [`OutputSink`] keeps the raw pointer and lets each worker
//! materialise only the segments of the tiles it was assigned.

use conv_geometry::{BlockGeometry, Element, OutputTile};
use std::marker::PhantomData;
use wino_kernels::Epilogue;

pub(crate) struct OutputSink<'a, T> {
    ptr: *mut T,
    len: usize,
    oc_blocks: usize,
    height: usize,
    width: usize,
    vector_width: usize,
    out_tile: usize,
    _output: PhantomData<&'a mut [T]>,
}

// The sink is shared across workers, each of which writes only the
// (tile, output block) regions it was assigned; see `store_tile`.
unsafe impl<T: Send> Send for OutputSink<'_, T> {}
unsafe impl<T: Send> Sync for OutputSink<'_, T> {}

impl<'a, T: Element> OutputSink<'a, T> {
    pub(crate) fn new(output: &'a mut [T], geom: &BlockGeometry) -> Self {
        Self {
            ptr: output.as_mut_ptr(),
            len: output.len(),
            oc_blocks: geom.oc_blocks,
            height: geom.shape.out_height,
            width: geom.shape.out_width,
            vector_width: geom.vector_width,
            out_tile: geom.out_tile,
            _output: PhantomData,
        }
    }

    /// Stores one transformed-back tile of output block `ob`.
    ///
    /// `src` is `[m][m][lanes]`; only the `rows x cols` part inside the
    /// image is written, through the epilogue.
    ///
    /// # Safety
    /// No other thread may read or write the region of `(tile, ob)` while
    /// this call runs.
    #[allow(clippy::too_many_arguments)]
    pub(crate) unsafe fn store_tile(
        &self,
        tile: &OutputTile,
        ob: usize,
        src: &[T],
        lanes: usize,
        bias: &[T],
        epilogue: &Epilogue,
    ) {
        let v = self.vector_width;
        let m = self.out_tile;
        for r in 0..tile.rows {
            let pixel = ((tile.batch * self.oc_blocks + ob) * self.height + tile.row + r) * self.width
                + tile.col;
            let start = pixel * v;
            let len = tile.cols * v;
            debug_assert!(start + len <= self.len, "output tile outside the tensor");
            // SAFETY: in bounds per the tile mapper; exclusive per the caller.
            let dst = unsafe { std::slice::from_raw_parts_mut(self.ptr.add(start), len) };
            epilogue.store(&src[r * m * lanes..][..tile.cols * lanes], lanes, bias, dst, v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conv_geometry::{ProblemShape, TileMapper};

    #[test]
    fn test_store_clips_last_tile() {
        // 5x5 output with m = 2: the last tile column holds one pixel.
        let shape = ProblemShape::conv2d(1, 4, 4, 5, 5, 3);
        let geom = BlockGeometry::derive(&shape, 4, 4, 1).unwrap();
        let mapper = TileMapper::new(&geom);
        let mut out = vec![0.0f32; geom.blocked_output_len()];
        let tile = mapper.output_tile(geom.tiles_w - 1);
        assert_eq!((tile.rows, tile.cols), (2, 1));
        let src: Vec<f32> = (1..=16).map(|x| x as f32).collect(); // [2][2][4]
        {
            let sink = OutputSink::new(&mut out, &geom);
            unsafe { sink.store_tile(&tile, 0, &src, 4, &[], &Epilogue::default()) };
        }
        assert_eq!(&out[4 * 4..5 * 4], &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(&out[(5 + 4) * 4..(5 + 5) * 4], &[9.0, 10.0, 11.0, 12.0]);
        assert_eq!(out.iter().filter(|&&x| x != 0.0).count(), 8);
    }
}
