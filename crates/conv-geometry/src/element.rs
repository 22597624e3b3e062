// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Scalar element types carried through the convolution pipelines.

/// Numeric precision of an [`Element`], used for byte accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Precision {
    /// 32-bit IEEE 754 floating point.
    F32,
    /// 64-bit IEEE 754 floating point.
    F64,
}

impl Precision {
    /// Returns the size of a single element in bytes.
    pub fn size_bytes(self) -> usize {
        match self {
            Precision::F32 => 4,
            Precision::F64 => 8,
        }
    }

    /// Returns a human-readable label for this precision.
    pub fn as_str(self) -> &'static str {
        match self {
            Precision::F32 => "f32",
            Precision::F64 => "f64",
        }
    }
}

/// A scalar the engine can convolve.
///
/// Precision is a type parameter of every kernel and pipeline rather than
/// a run-time switch, so each element type gets its own monomorphised code.
pub trait Element:
    num_traits::Float + Default + std::fmt::Debug + Send + Sync + 'static
{
    /// Precision tag for this type.
    const PRECISION: Precision;

    /// Converts a transform-matrix constant into this type.
    fn lit(value: f64) -> Self;

    /// Widens to `f64` for tolerance checks and diagnostics.
    fn widen(self) -> f64;
}

impl Element for f32 {
    const PRECISION: Precision = Precision::F32;

    #[inline]
    fn lit(value: f64) -> Self {
        value as f32
    }

    #[inline]
    fn widen(self) -> f64 {
        self as f64
    }
}

impl Element for f64 {
    const PRECISION: Precision = Precision::F64;

    #[inline]
    fn lit(value: f64) -> Self {
        value
    }

    #[inline]
    fn widen(self) -> f64 {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precision_sizes() {
        assert_eq!(<f32 as Element>::PRECISION.size_bytes(), 4);
        assert_eq!(<f64 as Element>::PRECISION.size_bytes(), 8);
        assert_eq!(Precision::F32.as_str(), "f32");
    }

    #[test]
    fn test_lit_round_trip() {
        assert_eq!(<f32 as Element>::lit(0.25), 0.25f32);
        assert_eq!(<f64 as Element>::lit(-1.0 / 6.0).widen(), -1.0 / 6.0);
    }
}
