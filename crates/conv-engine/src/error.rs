// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for the convolution engine.
//!
//! Every error is fatal: the engine performs no I/O on the compute path,
//! so nothing here is worth retrying.

use conv_geometry::GeometryError;
use scratch_arena::ArenaError;
use strategy_planner::PlannerError;
use wino_kernels::KernelError;

/// Errors surfaced by [`crate::ConvEngine`].
#[derive(Debug, thiserror::Error)]
pub enum ConvError {
    /// Unsupported shape, strategy or resource combination.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A tensor passed to `run` disagrees with the shape fixed at initialisation.
    #[error("shape mismatch for {tensor}: expected {expected} elements, got {actual}")]
    ShapeMismatch {
        tensor: &'static str,
        expected: usize,
        actual: usize,
    },

    /// No kernel or pipeline exists for the requested combination.
    #[error("unimplemented: {0}")]
    Unimplemented(String),

    /// The configuration file could not be read or parsed.
    #[error("config file error: {0}")]
    ConfigFile(String),
}

impl From<GeometryError> for ConvError {
    fn from(e: GeometryError) -> Self {
        match e {
            GeometryError::BufferLength {
                tensor,
                expected,
                actual,
            } => ConvError::ShapeMismatch {
                tensor,
                expected,
                actual,
            },
            other => ConvError::Configuration(other.to_string()),
        }
    }
}

impl From<PlannerError> for ConvError {
    fn from(e: PlannerError) -> Self {
        match e {
            PlannerError::Unimplemented { .. } => ConvError::Unimplemented(e.to_string()),
            other => ConvError::Configuration(other.to_string()),
        }
    }
}

impl From<KernelError> for ConvError {
    fn from(e: KernelError) -> Self {
        match e {
            KernelError::Unimplemented { .. } => ConvError::Unimplemented(e.to_string()),
            KernelError::BufferLength {
                tensor,
                expected,
                actual,
            } => ConvError::ShapeMismatch {
                tensor,
                expected,
                actual,
            },
            other => ConvError::Configuration(other.to_string()),
        }
    }
}

impl From<ArenaError> for ConvError {
    fn from(e: ArenaError) -> Self {
        ConvError::Configuration(format!("scratch arena: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_mapping() {
        let e: ConvError = PlannerError::Unimplemented {
            code: "a048".into(),
            detail: "no pipeline".into(),
        }
        .into();
        assert!(matches!(e, ConvError::Unimplemented(_)));

        let e: ConvError = PlannerError::UnknownStrategy("b000".into()).into();
        assert!(matches!(e, ConvError::Configuration(_)));

        let e: ConvError = KernelError::Unimplemented {
            tile_edge: 8,
            kernel: 3,
        }
        .into();
        assert!(e.to_string().contains("tile edge 8"));

        let e: ConvError = GeometryError::BufferLength {
            tensor: "input",
            expected: 4,
            actual: 3,
        }
        .into();
        assert!(matches!(e, ConvError::ShapeMismatch { tensor: "input", .. }));
    }
}
