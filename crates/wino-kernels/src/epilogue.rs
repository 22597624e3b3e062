// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Fused output epilogue: bias, then sum with the previous output, then ReLU.

use conv_geometry::Element;

/// Post-processing applied while a result is stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Epilogue {
    pub bias: bool,
    pub sum: bool,
    pub relu: bool,
}

impl Epilogue {
    #[inline]
    pub fn apply<T: Element>(&self, value: T, bias: T, previous: T) -> T {
        let mut out = value;
        if self.bias {
            out = out + bias;
        }
        if self.sum {
            out = out + previous;
        }
        if self.relu {
            out = out.max(T::zero());
        }
        out
    }

    /// Stores `cols` pixels of `lanes` values into a blocked output row.
    ///
    /// `src` is `[cols][lanes]`, `dst` is `[cols][V]`; only the first
    /// `lanes` of each pixel are written. `bias` holds the block's lanes.
    pub fn store<T: Element>(
        &self,
        src: &[T],
        lanes: usize,
        bias: &[T],
        dst: &mut [T],
        vector_width: usize,
    ) {
        for (px, out) in src.chunks_exact(lanes).zip(dst.chunks_mut(vector_width)) {
            for l in 0..lanes {
                let b = if self.bias { bias[l] } else { T::zero() };
                out[l] = self.apply(px[l], b, out[l]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_bias_sum_relu() {
        let e = Epilogue {
            bias: true,
            sum: true,
            relu: true,
        };
        assert_eq!(e.apply(1.0f32, 2.0, -5.0), 0.0);
        assert_eq!(e.apply(1.0f32, 2.0, 1.0), 4.0);
        assert_eq!(Epilogue::default().apply(-3.0f64, 9.0, 9.0), -3.0);
    }

    #[test]
    fn test_store_partial_lanes() {
        let e = Epilogue {
            bias: true,
            ..Epilogue::default()
        };
        let src = [1.0f32, 2.0, 3.0, 4.0]; // 2 pixels x 2 lanes
        let mut dst = [9.0f32; 8]; // 2 pixels x V = 4
        e.store(&src, 2, &[10.0, 20.0], &mut dst, 4);
        assert_eq!(dst, [11.0, 22.0, 9.0, 9.0, 13.0, 24.0, 9.0, 9.0]);
    }
}
