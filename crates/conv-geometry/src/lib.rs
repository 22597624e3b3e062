// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # conv-geometry
//!
//! Shape bookkeeping for blocked, tiled 2-D convolution.
//!
//! This crate provides:
//! - [`ProblemShape`]: the raw convolution problem (batch, channels,
//!   spatial extents, kernel, padding, stride, dilation) and its output
//!   formula.
//! - [`BlockGeometry`]: everything derived from a shape once a vector
//!   width and a tile edge are fixed: channel blocks and their remainders,
//!   tile counts, tile groups and the last-group remainder.
//! - [`TileMapper`]: maps a linear tile index to its input window (with
//!   clip bounds) and to the output region it produces.
//! - [`FormatAdapter`]: repacks tensors between external layouts
//!   (`nchw`, `nhwc`, `oihw`, `hwio`) and the channel-blocked layout the
//!   pipelines consume.
//! - [`Element`]: the scalar trait every pipeline is generic over.
//!
//! Everything here is pure: no thread pools, no scratch allocation beyond
//! what the caller hands in.

mod element;
mod error;
mod format;
mod geometry;
mod shape;
mod tile;

pub use element::{Element, Precision};
pub use error::GeometryError;
pub use format::{ActivationLayout, FormatAdapter, WeightsLayout};
pub use geometry::{
    channel_blocks, channel_remainder, tile_count, tile_remainder, BlockGeometry,
    SUPPORTED_VECTOR_WIDTHS,
};
pub use shape::{Padding, ProblemShape};
pub use tile::{InputTile, OutputTile, TileMapper};
