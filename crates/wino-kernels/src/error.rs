// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for kernel registration and lookup.

/// Errors raised by the kernel layer.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// No kernel is registered for this tile edge and kernel size.
    #[error("no Winograd kernel registered for tile edge {tile_edge} and kernel {kernel}x{kernel}")]
    Unimplemented { tile_edge: usize, kernel: usize },

    /// Transform matrices do not have the dimensions their edge implies.
    #[error("malformed {matrix} matrix: expected {expected} entries, got {actual}")]
    MalformedMatrix {
        matrix: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The tile edge exceeds what the stack-resident transform scratch holds.
    #[error("tile edge {tile_edge} exceeds the maximum of {max}")]
    TileTooLarge { tile_edge: usize, max: usize },

    /// A tensor handed to a reference routine has the wrong length.
    #[error("buffer length mismatch for {tensor}: expected {expected} elements, got {actual}")]
    BufferLength {
        tensor: &'static str,
        expected: usize,
        actual: usize,
    },
}
