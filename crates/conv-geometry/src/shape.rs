// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Convolution problem shapes and the output-extent formula.

use crate::GeometryError;
use std::fmt;

/// Zero padding applied to each spatial edge of the input.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize,
)]
pub struct Padding {
    pub top: usize,
    pub bottom: usize,
    pub left: usize,
    pub right: usize,
}

impl Padding {
    /// The same padding on all four edges.
    pub fn uniform(pad: usize) -> Self {
        Self {
            top: pad,
            bottom: pad,
            left: pad,
            right: pad,
        }
    }
}

/// A single 2-D convolution problem.
///
/// Channel counts are raw (not rounded to a vector width). The output
/// extent is stored explicitly so that a caller-supplied value can be
/// checked against the formula in [`validate`](ProblemShape::validate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ProblemShape {
    pub batch: usize,
    pub in_channels: usize,
    pub out_channels: usize,
    pub in_height: usize,
    pub in_width: usize,
    pub out_height: usize,
    pub out_width: usize,
    pub kernel_height: usize,
    pub kernel_width: usize,
    pub padding: Padding,
    pub stride_h: usize,
    pub stride_w: usize,
    pub dilation_h: usize,
    pub dilation_w: usize,
}

impl ProblemShape {
    /// Creates a square-kernel, stride-1 problem with `kernel / 2` padding
    /// on every edge. The output extent is derived from the formula.
    ///
    /// # Examples
    /// ```
    /// use conv_geometry::ProblemShape;
    /// let s = ProblemShape::conv2d(1, 16, 32, 8, 8, 3);
    /// assert_eq!((s.out_height, s.out_width), (8, 8));
    /// assert!(s.validate().is_ok());
    /// ```
    pub fn conv2d(
        batch: usize,
        in_channels: usize,
        out_channels: usize,
        height: usize,
        width: usize,
        kernel: usize,
    ) -> Self {
        let shape = Self {
            batch,
            in_channels,
            out_channels,
            in_height: height,
            in_width: width,
            out_height: 0,
            out_width: 0,
            kernel_height: kernel,
            kernel_width: kernel,
            padding: Padding::uniform(kernel / 2),
            stride_h: 1,
            stride_w: 1,
            dilation_h: 1,
            dilation_w: 1,
        };
        shape.with_derived_output()
    }

    /// Replaces the padding and re-derives the output extent.
    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self.with_derived_output()
    }

    /// Replaces the strides and re-derives the output extent.
    pub fn with_stride(mut self, stride_h: usize, stride_w: usize) -> Self {
        self.stride_h = stride_h;
        self.stride_w = stride_w;
        self.with_derived_output()
    }

    /// Replaces the dilations and re-derives the output extent.
    pub fn with_dilation(mut self, dilation_h: usize, dilation_w: usize) -> Self {
        self.dilation_h = dilation_h;
        self.dilation_w = dilation_w;
        self.with_derived_output()
    }

    /// Overrides the output extent, e.g. with dimensions supplied by a caller.
    pub fn with_output(mut self, out_height: usize, out_width: usize) -> Self {
        self.out_height = out_height;
        self.out_width = out_width;
        self
    }

    fn with_derived_output(mut self) -> Self {
        let (oh, ow) = self.derived_output().unwrap_or((0, 0));
        self.out_height = oh;
        self.out_width = ow;
        self
    }

    /// Output extent from the standard convolution formula, or `None` when
    /// the (dilated) kernel does not fit in the padded input.
    pub fn derived_output(&self) -> Option<(usize, usize)> {
        let oh = output_extent(
            self.in_height,
            self.padding.top + self.padding.bottom,
            self.kernel_height,
            self.stride_h,
            self.dilation_h,
        )?;
        let ow = output_extent(
            self.in_width,
            self.padding.left + self.padding.right,
            self.kernel_width,
            self.stride_w,
            self.dilation_w,
        )?;
        Some((oh, ow))
    }

    /// Checks that every dimension is usable and that the stored output
    /// extent matches the formula.
    pub fn validate(&self) -> Result<(), GeometryError> {
        let dims: [(&'static str, usize); 11] = [
            ("batch", self.batch),
            ("in_channels", self.in_channels),
            ("out_channels", self.out_channels),
            ("in_height", self.in_height),
            ("in_width", self.in_width),
            ("kernel_height", self.kernel_height),
            ("kernel_width", self.kernel_width),
            ("stride_h", self.stride_h),
            ("stride_w", self.stride_w),
            ("dilation_h", self.dilation_h),
            ("dilation_w", self.dilation_w),
        ];
        for (name, value) in dims {
            if value == 0 {
                return Err(GeometryError::InvalidDimension {
                    name,
                    value,
                    detail: "must be non-zero".into(),
                });
            }
        }

        let (oh, ow) = self
            .derived_output()
            .ok_or_else(|| GeometryError::InvalidDimension {
                name: "kernel_height",
                value: self.kernel_height,
                detail: "dilated kernel exceeds the padded input".into(),
            })?;

        if oh != self.out_height {
            return Err(GeometryError::OutputMismatch {
                axis: "height",
                derived: oh,
                supplied: self.out_height,
            });
        }
        if ow != self.out_width {
            return Err(GeometryError::OutputMismatch {
                axis: "width",
                derived: ow,
                supplied: self.out_width,
            });
        }
        Ok(())
    }

    /// Number of elements in the (unblocked) input tensor.
    pub fn input_len(&self) -> usize {
        self.batch * self.in_channels * self.in_height * self.in_width
    }

    /// Number of elements in the (unblocked) weights tensor.
    pub fn weights_len(&self) -> usize {
        self.out_channels * self.in_channels * self.kernel_height * self.kernel_width
    }

    /// Number of elements in the (unblocked) output tensor.
    pub fn output_len(&self) -> usize {
        self.batch * self.out_channels * self.out_height * self.out_width
    }

    /// Multiply-accumulates performed by a direct evaluation of this problem.
    pub fn direct_macs(&self) -> u64 {
        (self.output_len() * self.in_channels * self.kernel_height * self.kernel_width) as u64
    }

    /// Returns `true` for unit stride and unit dilation on both axes.
    pub fn is_unit_stride(&self) -> bool {
        self.stride_h == 1 && self.stride_w == 1 && self.dilation_h == 1 && self.dilation_w == 1
    }
}

fn output_extent(
    input: usize,
    pad_total: usize,
    kernel: usize,
    stride: usize,
    dilation: usize,
) -> Option<usize> {
    if kernel == 0 || stride == 0 || dilation == 0 {
        return None;
    }
    let effective = dilation * (kernel - 1) + 1;
    let padded = input + pad_total;
    if padded < effective {
        return None;
    }
    Some((padded - effective) / stride + 1)
}

impl fmt::Display for ProblemShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "n={} ic={} oc={} in={}x{} out={}x{} k={}x{} pad=[{},{},{},{}] stride={}x{} dil={}x{}",
            self.batch,
            self.in_channels,
            self.out_channels,
            self.in_height,
            self.in_width,
            self.out_height,
            self.out_width,
            self.kernel_height,
            self.kernel_width,
            self.padding.top,
            self.padding.bottom,
            self.padding.left,
            self.padding.right,
            self.stride_h,
            self.stride_w,
            self.dilation_h,
            self.dilation_w,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_same_padding() {
        let s = ProblemShape::conv2d(2, 3, 4, 7, 9, 3);
        assert_eq!((s.out_height, s.out_width), (7, 9));
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_valid_padding() {
        let s = ProblemShape::conv2d(1, 1, 1, 8, 8, 3).with_padding(Padding::default());
        assert_eq!((s.out_height, s.out_width), (6, 6));
    }

    #[test]
    fn test_stride_and_dilation() {
        let s = ProblemShape::conv2d(1, 1, 1, 10, 10, 3).with_stride(2, 2);
        assert_eq!(s.out_height, 5);
        let d = ProblemShape::conv2d(1, 1, 1, 10, 10, 3)
            .with_padding(Padding::default())
            .with_dilation(2, 2);
        assert_eq!(d.out_height, 6);
    }

    #[test]
    fn test_output_mismatch() {
        let s = ProblemShape::conv2d(1, 1, 1, 8, 8, 3).with_output(8, 7);
        let err = s.validate().unwrap_err();
        assert!(matches!(
            err,
            GeometryError::OutputMismatch { axis: "width", derived: 8, supplied: 7 }
        ));
    }

    #[test]
    fn test_zero_dimension() {
        let s = ProblemShape::conv2d(1, 0, 1, 8, 8, 3);
        assert!(matches!(
            s.validate(),
            Err(GeometryError::InvalidDimension { name: "in_channels", .. })
        ));
    }

    #[test]
    fn test_kernel_larger_than_input() {
        let s = ProblemShape::conv2d(1, 1, 1, 2, 2, 5).with_padding(Padding::default());
        assert!(s.derived_output().is_none());
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_lengths() {
        let s = ProblemShape::conv2d(2, 3, 5, 4, 4, 3);
        assert_eq!(s.input_len(), 2 * 3 * 16);
        assert_eq!(s.weights_len(), 5 * 3 * 9);
        assert_eq!(s.output_len(), 2 * 5 * 16);
    }

    #[test]
    fn test_display() {
        let s = ProblemShape::conv2d(1, 2, 3, 4, 5, 3);
        let text = format!("{s}");
        assert!(text.contains("ic=2"));
        assert!(text.contains("out=4x5"));
    }

    proptest! {
        #[test]
        fn prop_derived_output_matches_formula(
            h in 1usize..40,
            w in 1usize..40,
            k in 1usize..6,
            pad in 0usize..3,
            stride in 1usize..4,
        ) {
            let s = ProblemShape::conv2d(1, 1, 1, h, w, k)
                .with_padding(Padding::uniform(pad))
                .with_stride(stride, stride);
            if h + 2 * pad >= k && w + 2 * pad >= k {
                let expect_h = (h + 2 * pad - k) / stride + 1;
                let expect_w = (w + 2 * pad - k) / stride + 1;
                prop_assert_eq!(s.derived_output(), Some((expect_h, expect_w)));
                prop_assert!(s.validate().is_ok());
            } else {
                prop_assert!(s.validate().is_err());
            }
        }
    }
}
