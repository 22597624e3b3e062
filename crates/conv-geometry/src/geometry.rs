// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Block geometry: channel blocks, spatial tiles and their remainders.
//!
//! ```text
//!   channels:  |<--- V --->|<--- V --->|<- Ir ->...|   IC = ceil(ic / V) * V
//!   output row:|<-- m -->|<-- m -->|<-- m -->|<r>|     ht = ceil(oh / m)
//!   tiles:     [ T ][ T ][ T ] ... [ Tr ]              t2 = ceil(t / T)
//! ```
//!
//! `m = A - K + 1` is the number of output samples one tile produces along
//! each axis for tile edge `A` and kernel size `K`.

use crate::{GeometryError, ProblemShape};

/// Lane counts the blocked kernels are built for.
pub const SUPPORTED_VECTOR_WIDTHS: &[usize] = &[4, 8, 16];

/// Number of `width`-sized blocks needed to cover `count` channels.
pub fn channel_blocks(count: usize, width: usize) -> usize {
    count.div_ceil(width)
}

/// Valid lanes in the last channel block (`width` when `count` divides evenly).
pub fn channel_remainder(count: usize, width: usize) -> usize {
    match count % width {
        0 => width,
        r => r,
    }
}

/// Number of tiles of `step` output samples needed to cover `extent`.
pub fn tile_count(extent: usize, step: usize) -> usize {
    extent.div_ceil(step)
}

/// Output samples covered by the last tile along an axis.
pub fn tile_remainder(extent: usize, step: usize) -> usize {
    match extent % step {
        0 => step,
        r => r,
    }
}

/// Everything the planner and pipelines derive from a shape once the vector
/// width `V`, tile edge `A` and tile block `T` are fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub struct BlockGeometry {
    pub shape: ProblemShape,
    /// `V`: lanes per channel block.
    pub vector_width: usize,
    /// `A`: transform tile edge.
    pub tile_edge: usize,
    /// `K`: kernel edge.
    pub kernel: usize,
    /// `m = A - K + 1`: output samples per tile edge.
    pub out_tile: usize,
    pub ic_blocks: usize,
    pub oc_blocks: usize,
    /// `IC`: input channels rounded up to a multiple of `V`.
    pub padded_ic: usize,
    /// `OC`: output channels rounded up to a multiple of `V`.
    pub padded_oc: usize,
    /// `Ir`: valid lanes in the last input-channel block.
    pub ic_remainder: usize,
    /// `Or`: valid lanes in the last output-channel block.
    pub oc_remainder: usize,
    pub tiles_h: usize,
    pub tiles_w: usize,
    pub tiles_per_image: usize,
    /// `t`: tiles over the whole batch.
    pub tiles: usize,
    /// `T`: tiles processed together by one multiply-accumulate call.
    pub tile_block: usize,
    /// `t2`: number of tile blocks.
    pub tile_groups: usize,
    /// `Tr`: tiles in the last tile block.
    pub tile_block_remainder: usize,
    /// Output rows produced by the bottom row of tiles.
    pub last_tile_rows: usize,
    /// Output columns produced by the rightmost column of tiles.
    pub last_tile_cols: usize,
}

impl BlockGeometry {
    /// Derives block geometry for the Winograd pipelines.
    ///
    /// Validates the shape first, so a caller-supplied output extent that
    /// disagrees with the formula is rejected here. A `tile_block` of zero is
    /// treated as one.
    pub fn derive(
        shape: &ProblemShape,
        tile_edge: usize,
        vector_width: usize,
        tile_block: usize,
    ) -> Result<Self, GeometryError> {
        shape.validate()?;
        check_vector_width(vector_width)?;

        if shape.kernel_height != shape.kernel_width {
            return Err(GeometryError::InvalidDimension {
                name: "kernel_width",
                value: shape.kernel_width,
                detail: format!(
                    "tiled transforms need a square kernel, got {}x{}",
                    shape.kernel_height, shape.kernel_width
                ),
            });
        }
        if !shape.is_unit_stride() {
            return Err(GeometryError::InvalidDimension {
                name: "stride_h",
                value: shape.stride_h.max(shape.stride_w),
                detail: "tiled transforms need unit stride and dilation".into(),
            });
        }
        let kernel = shape.kernel_height;
        if tile_edge < kernel {
            return Err(GeometryError::TileTooSmall { tile_edge, kernel });
        }

        Ok(Self::assemble(
            shape,
            tile_edge,
            kernel,
            tile_edge - kernel + 1,
            vector_width,
            tile_block,
        ))
    }

    /// Geometry for the direct algorithm: every output sample is its own
    /// one-by-one tile and any stride, dilation or kernel is accepted.
    pub fn for_direct(
        shape: &ProblemShape,
        vector_width: usize,
        tile_block: usize,
    ) -> Result<Self, GeometryError> {
        shape.validate()?;
        check_vector_width(vector_width)?;
        Ok(Self::assemble(
            shape,
            shape.kernel_height,
            shape.kernel_height,
            1,
            vector_width,
            tile_block,
        ))
    }

    fn assemble(
        shape: &ProblemShape,
        tile_edge: usize,
        kernel: usize,
        out_tile: usize,
        vector_width: usize,
        tile_block: usize,
    ) -> Self {
        let v = vector_width;
        let ic_blocks = channel_blocks(shape.in_channels, v);
        let oc_blocks = channel_blocks(shape.out_channels, v);
        let tiles_h = tile_count(shape.out_height, out_tile);
        let tiles_w = tile_count(shape.out_width, out_tile);
        let tiles_per_image = tiles_h * tiles_w;
        let tiles = tiles_per_image * shape.batch;
        let tile_block = tile_block.clamp(1, tiles.max(1));

        Self {
            shape: *shape,
            vector_width: v,
            tile_edge,
            kernel,
            out_tile,
            ic_blocks,
            oc_blocks,
            padded_ic: ic_blocks * v,
            padded_oc: oc_blocks * v,
            ic_remainder: channel_remainder(shape.in_channels, v),
            oc_remainder: channel_remainder(shape.out_channels, v),
            tiles_h,
            tiles_w,
            tiles_per_image,
            tiles,
            tile_block,
            tile_groups: tile_count(tiles, tile_block),
            tile_block_remainder: tile_remainder(tiles, tile_block),
            last_tile_rows: tile_remainder(shape.out_height, out_tile),
            last_tile_cols: tile_remainder(shape.out_width, out_tile),
        }
    }

    /// `A * A`: points in one transformed tile.
    pub fn points(&self) -> usize {
        self.tile_edge * self.tile_edge
    }

    /// Tiles in tile block `group` (`T`, or `Tr` for the last block).
    pub fn tile_block_len(&self, group: usize) -> usize {
        if group + 1 == self.tile_groups {
            self.tile_block_remainder
        } else {
            self.tile_block
        }
    }

    /// Elements in the channel-blocked input tensor.
    pub fn blocked_input_len(&self) -> usize {
        self.shape.batch * self.padded_ic * self.shape.in_height * self.shape.in_width
    }

    /// Elements in the channel-blocked weights tensor.
    pub fn blocked_weights_len(&self) -> usize {
        self.padded_oc * self.padded_ic * self.shape.kernel_height * self.shape.kernel_width
    }

    /// Elements in the channel-blocked output tensor.
    pub fn blocked_output_len(&self) -> usize {
        self.shape.batch * self.padded_oc * self.shape.out_height * self.shape.out_width
    }

    /// One-line description for logs and the CLI.
    pub fn summary(&self) -> String {
        format!(
            "A={} K={} m={} V={} | IC={} ({} blk, Ir={}) OC={} ({} blk, Or={}) | tiles {}x{}x{}={} T={} t2={} Tr={}",
            self.tile_edge,
            self.kernel,
            self.out_tile,
            self.vector_width,
            self.padded_ic,
            self.ic_blocks,
            self.ic_remainder,
            self.padded_oc,
            self.oc_blocks,
            self.oc_remainder,
            self.shape.batch,
            self.tiles_h,
            self.tiles_w,
            self.tiles,
            self.tile_block,
            self.tile_groups,
            self.tile_block_remainder,
        )
    }
}

fn check_vector_width(width: usize) -> Result<(), GeometryError> {
    if SUPPORTED_VECTOR_WIDTHS.contains(&width) {
        Ok(())
    } else {
        Err(GeometryError::UnsupportedVectorWidth {
            width,
            supported: SUPPORTED_VECTOR_WIDTHS,
        })
    }
}
