// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Gathering input windows into `[A][A][lanes]` staging tiles.
//!
//! The source is one channel block of one image in the blocked layout,
//! `[ih][iw][V]`. Interior tiles are copied row by row; border tiles take
//! the clip bounds from [`InputTile`] and zero everything outside them.

use conv_geometry::{Element, InputTile};

/// One channel-block plane of the blocked input.
#[derive(Debug, Clone, Copy)]
pub struct Plane<'a, T> {
    pub data: &'a [T],
    pub width: usize,
    pub vector_width: usize,
}

impl<'a, T: Element> Plane<'a, T> {
    #[inline]
    fn pixel(&self, row: usize, col: usize) -> &'a [T] {
        let at = (row * self.width + col) * self.vector_width;
        &self.data[at..at + self.vector_width]
    }
}

/// Copies a window that lies fully inside the image.
pub fn gather_interior<T: Element>(
    plane: &Plane<'_, T>,
    tile: &InputTile,
    edge: usize,
    lanes: usize,
    dst: &mut [T],
) {
    for r in 0..edge {
        let row = tile.image_row(r);
        for c in 0..edge {
            let src = plane.pixel(row, tile.image_col(c));
            dst[(r * edge + c) * lanes..][..lanes].copy_from_slice(&src[..lanes]);
        }
    }
}

/// Copies the in-image part of a window and zero-fills the rest.
pub fn gather_border<T: Element>(
    plane: &Plane<'_, T>,
    tile: &InputTile,
    edge: usize,
    lanes: usize,
    dst: &mut [T],
) {
    dst[..edge * edge * lanes].fill(T::zero());
    for r in tile.row_start..tile.row_end {
        let row = tile.image_row(r);
        for c in tile.col_start..tile.col_end {
            let src = plane.pixel(row, tile.image_col(c));
            dst[(r * edge + c) * lanes..][..lanes].copy_from_slice(&src[..lanes]);
        }
    }
}

/// Picks the interior or border variant from the clip bounds.
#[inline]
pub fn gather<T: Element>(
    plane: &Plane<'_, T>,
    tile: &InputTile,
    edge: usize,
    lanes: usize,
    dst: &mut [T],
) {
    if tile.is_interior(edge) {
        gather_interior(plane, tile, edge, lanes, dst);
    } else {
        gather_border(plane, tile, edge, lanes, dst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conv_geometry::{BlockGeometry, ProblemShape, TileMapper};

    fn plane_data(h: usize, w: usize, v: usize) -> Vec<f32> {
        (0..h * w * v).map(|i| (i / v) as f32 + 1.0).collect()
    }

    #[test]
    fn test_interior_copy() {
        let shape = ProblemShape::conv2d(1, 4, 4, 8, 8, 3);
        let g = BlockGeometry::derive(&shape, 4, 4, 1).unwrap();
        let map = TileMapper::new(&g);
        let data = plane_data(8, 8, 4);
        let plane = Plane { data: &data, width: 8, vector_width: 4 };
        // Tile (0, 1): window origin (-1, 1) is a border tile; (1, 1) is interior.
        let t = map.input_tile(g.tiles_w + 1);
        assert!(t.is_interior(4));
        let mut dst = vec![0.0f32; 16 * 2];
        gather(&plane, &t, 4, 2, &mut dst);
        // Window origin (1, 1) → pixel index 9.
        assert_eq!(dst[0], 10.0);
        assert_eq!(dst[1], 10.0);
        assert_eq!(dst[(3 * 4 + 3) * 2], (4 * 8 + 4) as f32 + 1.0);
    }

    #[test]
    fn test_border_zero_fill() {
        let shape = ProblemShape::conv2d(1, 4, 4, 8, 8, 3);
        let g = BlockGeometry::derive(&shape, 4, 4, 1).unwrap();
        let map = TileMapper::new(&g);
        let data = plane_data(8, 8, 4);
        let plane = Plane { data: &data, width: 8, vector_width: 4 };
        let t = map.input_tile(0);
        assert!(!t.is_interior(4));
        let mut dst = vec![f32::NAN; 16 * 4];
        gather(&plane, &t, 4, 4, &mut dst);
        // Top row and left column of the window are padding.
        assert!((0..4).all(|c| dst[c * 4] == 0.0));
        assert!((0..4).all(|r| dst[r * 16] == 0.0));
        assert_eq!(dst[(4 + 1) * 4], 1.0);
    }
}
