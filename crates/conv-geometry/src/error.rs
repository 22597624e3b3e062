// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for shape derivation and layout conversion.

/// Errors raised while validating a problem shape or repacking tensors.
#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    /// The supplied output extent disagrees with the convolution formula.
    #[error("output {axis} mismatch: formula gives {derived}, caller supplied {supplied}")]
    OutputMismatch {
        axis: &'static str,
        derived: usize,
        supplied: usize,
    },

    /// The vector width is not one of the supported lane counts.
    #[error("unsupported vector width {width}; supported widths are {supported:?}")]
    UnsupportedVectorWidth {
        width: usize,
        supported: &'static [usize],
    },

    /// A dimension is zero or otherwise unusable.
    #[error("invalid dimension {name} = {value}: {detail}")]
    InvalidDimension {
        name: &'static str,
        value: usize,
        detail: String,
    },

    /// The tile edge cannot hold a single kernel window.
    #[error("tile edge {tile_edge} is smaller than kernel size {kernel}")]
    TileTooSmall { tile_edge: usize, kernel: usize },

    /// A buffer handed to the format adapter has the wrong length.
    #[error("buffer length mismatch for {tensor}: expected {expected} elements, got {actual}")]
    BufferLength {
        tensor: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A layout name could not be parsed.
    #[error("unknown {role} layout '{name}'")]
    UnknownLayout { role: &'static str, name: String },
}
