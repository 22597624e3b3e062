// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Linear tile index to spatial coordinates.
//!
//! Tile `t` of a batch is laid out as `t = (n * ht + th) * wt + tw`. Its
//! output region starts at `(th * m, tw * m)`; its input window starts
//! `padding` samples earlier and spans `A x A` samples, some of which may
//! fall outside the image and must be read as zero.
//!
//! ```text
//!   padded input           output
//!   +---------------+      +-----------+
//!   | ..A x A..     |  ->  | m x m     |
//!   | window at     |      | region at |
//!   | (th*m - tp,   |      | (th*m,    |
//!   |  tw*m - lp)   |      |  tw*m)    |
//!   +---------------+      +-----------+
//! ```

use crate::BlockGeometry;

/// Input-side mapping of one tile.
///
/// Clip bounds are half-open: rows `row_start..row_end` and columns
/// `col_start..col_end` of the `A x A` window lie inside the image; every
/// other sample is zero padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputTile {
    pub batch: usize,
    pub origin_row: isize,
    pub origin_col: isize,
    pub row_start: usize,
    pub row_end: usize,
    pub col_start: usize,
    pub col_end: usize,
}

impl InputTile {
    /// Returns `true` when the whole `edge x edge` window is inside the image.
    #[inline]
    pub fn is_interior(&self, edge: usize) -> bool {
        self.row_start == 0 && self.col_start == 0 && self.row_end == edge && self.col_end == edge
    }

    /// Image row of window row `r`. Only meaningful inside the clip bounds.
    #[inline]
    pub fn image_row(&self, r: usize) -> usize {
        (self.origin_row + r as isize) as usize
    }

    /// Image column of window column `c`. Only meaningful inside the clip bounds.
    #[inline]
    pub fn image_col(&self, c: usize) -> usize {
        (self.origin_col + c as isize) as usize
    }
}

/// Output-side mapping of one tile: the region its output transform writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputTile {
    pub batch: usize,
    pub row: usize,
    pub col: usize,
    /// Valid output rows (`m`, fewer on the bottom edge).
    pub rows: usize,
    /// Valid output columns (`m`, fewer on the right edge).
    pub cols: usize,
}

impl OutputTile {
    #[inline]
    pub fn is_full(&self, out_tile: usize) -> bool {
        self.rows == out_tile && self.cols == out_tile
    }
}

/// Maps linear tile indices to input windows and output regions.
#[derive(Debug, Clone, Copy)]
pub struct TileMapper {
    edge: usize,
    out_tile: usize,
    tiles_w: usize,
    tiles_per_image: usize,
    tiles: usize,
    tile_block: usize,
    pad_top: usize,
    pad_left: usize,
    in_height: usize,
    in_width: usize,
    out_height: usize,
    out_width: usize,
}

impl TileMapper {
    pub fn new(geom: &BlockGeometry) -> Self {
        Self {
            edge: geom.tile_edge,
            out_tile: geom.out_tile,
            tiles_w: geom.tiles_w,
            tiles_per_image: geom.tiles_per_image,
            tiles: geom.tiles,
            tile_block: geom.tile_block,
            pad_top: geom.shape.padding.top,
            pad_left: geom.shape.padding.left,
            in_height: geom.shape.in_height,
            in_width: geom.shape.in_width,
            out_height: geom.shape.out_height,
            out_width: geom.shape.out_width,
        }
    }

    /// Linear tile index of slot `offset` inside tile block `group`.
    #[inline]
    pub fn tile_index(&self, group: usize, offset: usize) -> usize {
        group * self.tile_block + offset
    }

    /// Total number of tiles across the batch.
    pub fn len(&self) -> usize {
        self.tiles
    }

    pub fn is_empty(&self) -> bool {
        self.tiles == 0
    }

    #[inline]
    fn split(&self, t: usize) -> (usize, usize, usize) {
        let batch = t / self.tiles_per_image;
        let rem = t % self.tiles_per_image;
        (batch, rem / self.tiles_w, rem % self.tiles_w)
    }

    /// Input window and clip bounds for tile `t`.
    pub fn input_tile(&self, t: usize) -> InputTile {
        let (batch, th, tw) = self.split(t);
        let origin_row = (th * self.out_tile) as isize - self.pad_top as isize;
        let origin_col = (tw * self.out_tile) as isize - self.pad_left as isize;
        let (row_start, row_end) = clip(origin_row, self.in_height, self.edge);
        let (col_start, col_end) = clip(origin_col, self.in_width, self.edge);
        InputTile {
            batch,
            origin_row,
            origin_col,
            row_start,
            row_end,
            col_start,
            col_end,
        }
    }

    /// Output region written by tile `t`.
    pub fn output_tile(&self, t: usize) -> OutputTile {
        let (batch, th, tw) = self.split(t);
        let row = th * self.out_tile;
        let col = tw * self.out_tile;
        OutputTile {
            batch,
            row,
            col,
            rows: self.out_tile.min(self.out_height - row),
            cols: self.out_tile.min(self.out_width - col),
        }
    }

    /// Lazily maps every tile in order.
    pub fn tiles(&self) -> impl Iterator<Item = (InputTile, OutputTile)> + '_ {
        (0..self.tiles).map(move |t| (self.input_tile(t), self.output_tile(t)))
    }
}

/// Valid window positions `[start, end)` for a window of `edge` samples
/// starting at `origin` over an axis of `extent` samples.
fn clip(origin: isize, extent: usize, edge: usize) -> (usize, usize) {
    let edge_i = edge as isize;
    let start = (-origin).clamp(0, edge_i);
    let end = (extent as isize - origin).clamp(start, edge_i);
    (start as usize, end as usize)
}
