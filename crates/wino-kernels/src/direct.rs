// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Direct convolution.
//!
//! [`reference_conv_nchw`] is the plain sliding-window definition, used to
//! verify every other path. [`DirectConv`] computes on the blocked layout
//! one output pixel at a time and supports any stride, dilation and padding.

use crate::{BlockGemm, KernelError};
use conv_geometry::{BlockGeometry, Element, ProblemShape};
use rayon::prelude::*;

fn check_len(tensor: &'static str, expected: usize, actual: usize) -> Result<(), KernelError> {
    if expected == actual {
        Ok(())
    } else {
        Err(KernelError::BufferLength {
            tensor,
            expected,
            actual,
        })
    }
}

/// Input coordinate for output index `o` and kernel tap `k`, if inside the image.
#[inline]
fn source(o: usize, k: usize, stride: usize, dilation: usize, pad: usize, extent: usize) -> Option<usize> {
    let at = (o * stride + k * dilation) as isize - pad as isize;
    (at >= 0 && (at as usize) < extent).then_some(at as usize)
}

/// Reference convolution over `nchw` input, `oihw` weights and `nchw` output.
///
/// # Errors
/// Returns [`KernelError::BufferLength`] if a tensor does not match `shape`.
pub fn reference_conv_nchw<T: Element>(
    shape: &ProblemShape,
    input: &[T],
    weights: &[T],
    bias: Option<&[T]>,
    output: &mut [T],
) -> Result<(), KernelError> {
    check_len("input", shape.input_len(), input.len())?;
    check_len("weights", shape.weights_len(), weights.len())?;
    check_len("output", shape.output_len(), output.len())?;
    if let Some(b) = bias {
        check_len("bias", shape.out_channels, b.len())?;
    }

    let s = *shape;
    let (ih, iw) = (s.in_height, s.in_width);
    let (oh, ow) = (s.out_height, s.out_width);
    let (kh, kw) = (s.kernel_height, s.kernel_width);
    let plane = oh * ow;
    if plane == 0 {
        return Ok(());
    }

    output.par_chunks_mut(plane).enumerate().for_each(|(p, out)| {
        let (n, o) = (p / s.out_channels, p % s.out_channels);
        let b = bias.map_or(T::zero(), |b| b[o]);
        for oy in 0..oh {
            for ox in 0..ow {
                let mut acc = b;
                for i in 0..s.in_channels {
                    for ky in 0..kh {
                        let Some(y) = source(oy, ky, s.stride_h, s.dilation_h, s.padding.top, ih) else {
                            continue;
                        };
                        for kx in 0..kw {
                            let Some(x) = source(ox, kx, s.stride_w, s.dilation_w, s.padding.left, iw) else {
                                continue;
                            };
                            let xv = input[((n * s.in_channels + i) * ih + y) * iw + x];
                            let wv = weights[((o * s.in_channels + i) * kh + ky) * kw + kx];
                            acc = acc + xv * wv;
                        }
                    }
                }
                out[oy * ow + ox] = acc;
            }
        }
    });
    Ok(())
}

/// Direct convolution over the blocked layouts.
#[derive(Debug, Clone, Copy)]
pub struct DirectConv {
    shape: ProblemShape,
    vector_width: usize,
    ic_blocks: usize,
    ic_remainder: usize,
}

impl DirectConv {
    pub fn new(geom: &BlockGeometry) -> Self {
        Self {
            shape: geom.shape,
            vector_width: geom.vector_width,
            ic_blocks: geom.ic_blocks,
            ic_remainder: geom.ic_remainder,
        }
    }

    /// Computes output pixel `(oy, ox)` of image `n` and output block `ob`
    /// into `acc` (`V` lanes), overwriting it.
    ///
    /// `input` is the blocked input `(n, ic/V, ih, iw, V)` and `weights`
    /// the blocked weights `(oc/V, ic/V, kh, kw, V_i, V_o)`.
    #[allow(clippy::too_many_arguments)]
    pub fn compute_pixel<T: Element>(
        &self,
        input: &[T],
        weights: &[T],
        n: usize,
        ob: usize,
        oy: usize,
        ox: usize,
        acc: &mut [T],
    ) {
        let s = &self.shape;
        let v = self.vector_width;
        let (ih, iw) = (s.in_height, s.in_width);
        let (kh, kw) = (s.kernel_height, s.kernel_width);
        let acc = &mut acc[..v];
        acc.fill(T::zero());

        for ib in 0..self.ic_blocks {
            let variant = BlockGemm::for_block(ib, self.ic_blocks, self.ic_remainder, v);
            let image = &input[(n * self.ic_blocks + ib) * ih * iw * v..][..ih * iw * v];
            let filter = &weights[(ob * self.ic_blocks + ib) * kh * kw * v * v..][..kh * kw * v * v];
            for ky in 0..kh {
                let Some(y) = source(oy, ky, s.stride_h, s.dilation_h, s.padding.top, ih) else {
                    continue;
                };
                for kx in 0..kw {
                    let Some(x) = source(ox, kx, s.stride_w, s.dilation_w, s.padding.left, iw) else {
                        continue;
                    };
                    let px = &image[(y * iw + x) * v..][..v];
                    let w = &filter[(ky * kw + kx) * v * v..][..v * v];
                    variant.accumulate(px, w, acc, 1, v);
                }
            }
        }
    }

    /// Computes a whole output row (`[ow][V]`) with [`Self::compute_pixel`].
    pub fn compute_row<T: Element>(
        &self,
        input: &[T],
        weights: &[T],
        n: usize,
        ob: usize,
        oy: usize,
        row: &mut [T],
    ) {
        let v = self.vector_width;
        for (ox, px) in row.chunks_exact_mut(v).take(self.shape.out_width).enumerate() {
            self.compute_pixel(input, weights, n, ob, oy, ox, px);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conv_geometry::{ActivationLayout, FormatAdapter, Padding, WeightsLayout};

    #[test]
    fn test_reference_identity_kernel() {
        // 1x1 input channel, 3x3 kernel with a single centre tap.
        let shape = ProblemShape::conv2d(1, 1, 1, 3, 3, 3);
        let input: Vec<f32> = (1..=9).map(|x| x as f32).collect();
        let mut w = vec![0.0f32; 9];
        w[4] = 1.0;
        let mut out = vec![0.0f32; 9];
        reference_conv_nchw(&shape, &input, &w, Some(&[0.5]), &mut out).unwrap();
        let expected: Vec<f32> = input.iter().map(|x| x + 0.5).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_reference_strided_sum() {
        // All-ones 2x2 kernel, stride 2, no padding: sums 2x2 blocks.
        let shape = ProblemShape::conv2d(1, 1, 1, 4, 4, 2)
            .with_padding(Padding::uniform(0))
            .with_stride(2, 2);
        let input: Vec<f64> = (0..16).map(|x| x as f64).collect();
        let mut out = vec![0.0f64; 4];
        reference_conv_nchw(&shape, &input, &[1.0; 4], None, &mut out).unwrap();
        assert_eq!(out, vec![10.0, 18.0, 42.0, 50.0]);
    }

    #[test]
    fn test_reference_length_check() {
        let shape = ProblemShape::conv2d(1, 2, 2, 4, 4, 3);
        let mut out = vec![0.0f32; shape.output_len()];
        let err = reference_conv_nchw(&shape, &[0.0; 3], &[0.0; 36], None, &mut out).unwrap_err();
        assert!(matches!(err, KernelError::BufferLength { tensor: "input", .. }));
    }

    #[test]
    fn test_blocked_direct_matches_reference() {
        // 5 input channels forces a tail block at V = 4.
        let shape = ProblemShape::conv2d(2, 5, 6, 7, 6, 3)
            .with_stride(2, 1)
            .with_dilation(1, 2);
        let geom = BlockGeometry::for_direct(&shape, 4, 1).unwrap();
        let input: Vec<f32> = (0..shape.input_len()).map(|i| ((i * 7) % 13) as f32 - 6.0).collect();
        let weights: Vec<f32> = (0..shape.weights_len()).map(|i| ((i * 5) % 11) as f32 - 5.0).collect();
        let mut expected = vec![0.0f32; shape.output_len()];
        reference_conv_nchw(&shape, &input, &weights, None, &mut expected).unwrap();

        let adapter = FormatAdapter::new(
            &geom,
            ActivationLayout::Nchw,
            WeightsLayout::Oihw,
            ActivationLayout::Nchw,
        );
        let mut bi = vec![0.0f32; geom.blocked_input_len()];
        let mut bw = vec![0.0f32; geom.blocked_weights_len()];
        adapter.pack_input(&input, &mut bi).unwrap();
        adapter.pack_weights(&weights, &mut bw).unwrap();

        let conv = DirectConv::new(&geom);
        let v = geom.vector_width;
        let (oh, ow) = (shape.out_height, shape.out_width);
        let mut blocked = vec![0.0f32; geom.blocked_output_len()];
        for n in 0..shape.batch {
            for ob in 0..geom.oc_blocks {
                for oy in 0..oh {
                    let at = ((n * geom.oc_blocks + ob) * oh + oy) * ow * v;
                    conv.compute_row(&bi, &bw, n, ob, oy, &mut blocked[at..at + ow * v]);
                }
            }
        }
        let mut got = vec![0.0f32; shape.output_len()];
        adapter.unpack_output(&blocked, &mut got).unwrap();
        for (a, b) in got.iter().zip(&expected) {
            assert!((a - b).abs() < 1e-3, "{a} vs {b}");
        }
    }
}
