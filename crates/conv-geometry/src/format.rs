// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Conversion between external tensor layouts and the channel-blocked
//! layout consumed by the pipelines.
//!
//! Blocked activations are `(n, c / V, h, w, V)`; blocked weights are
//! `(o / V, i / V, kh, kw, V_i, V_o)`. Channels past the real count are
//! zero-filled so every block can be processed at full width.

use crate::{BlockGeometry, Element, GeometryError};
use rayon::prelude::*;
use std::fmt;
use std::str::FromStr;

/// External layout of an activation tensor (input or output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationLayout {
    /// Already in the internal channel-blocked layout.
    Blocked,
    /// Channel-planar.
    #[default]
    Nchw,
    /// Channel-interleaved.
    Nhwc,
}

/// External layout of the weights tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightsLayout {
    /// Already in the internal channel-blocked layout.
    Blocked,
    #[default]
    Oihw,
    Hwio,
}

impl ActivationLayout {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivationLayout::Blocked => "blocked",
            ActivationLayout::Nchw => "nchw",
            ActivationLayout::Nhwc => "nhwc",
        }
    }
}

impl WeightsLayout {
    pub fn as_str(self) -> &'static str {
        match self {
            WeightsLayout::Blocked => "blocked",
            WeightsLayout::Oihw => "oihw",
            WeightsLayout::Hwio => "hwio",
        }
    }
}

impl FromStr for ActivationLayout {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "blocked" => Ok(ActivationLayout::Blocked),
            "nchw" => Ok(ActivationLayout::Nchw),
            "nhwc" => Ok(ActivationLayout::Nhwc),
            _ => Err(GeometryError::UnknownLayout {
                role: "activation",
                name: s.to_string(),
            }),
        }
    }
}

impl FromStr for WeightsLayout {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "blocked" => Ok(WeightsLayout::Blocked),
            "oihw" => Ok(WeightsLayout::Oihw),
            "hwio" => Ok(WeightsLayout::Hwio),
            _ => Err(GeometryError::UnknownLayout {
                role: "weights",
                name: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for ActivationLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for WeightsLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dimensions of one activation tensor as seen by the adapter.
#[derive(Debug, Clone, Copy)]
struct ActDims {
    batch: usize,
    channels: usize,
    blocks: usize,
    height: usize,
    width: usize,
}

impl ActDims {
    fn external_len(&self) -> usize {
        self.batch * self.channels * self.height * self.width
    }

    fn blocked_len(&self, v: usize) -> usize {
        self.batch * self.blocks * v * self.height * self.width
    }
}

/// Repacks input, weights and output independently between their external
/// layouts and the blocked layout.
#[derive(Debug, Clone, Copy)]
pub struct FormatAdapter {
    input_layout: ActivationLayout,
    weights_layout: WeightsLayout,
    output_layout: ActivationLayout,
    vector_width: usize,
    input: ActDims,
    output: ActDims,
    in_channels: usize,
    out_channels: usize,
    ic_blocks: usize,
    oc_blocks: usize,
    kernel_height: usize,
    kernel_width: usize,
}

impl FormatAdapter {
    pub fn new(
        geom: &BlockGeometry,
        input_layout: ActivationLayout,
        weights_layout: WeightsLayout,
        output_layout: ActivationLayout,
    ) -> Self {
        let s = &geom.shape;
        Self {
            input_layout,
            weights_layout,
            output_layout,
            vector_width: geom.vector_width,
            input: ActDims {
                batch: s.batch,
                channels: s.in_channels,
                blocks: geom.ic_blocks,
                height: s.in_height,
                width: s.in_width,
            },
            output: ActDims {
                batch: s.batch,
                channels: s.out_channels,
                blocks: geom.oc_blocks,
                height: s.out_height,
                width: s.out_width,
            },
            in_channels: s.in_channels,
            out_channels: s.out_channels,
            ic_blocks: geom.ic_blocks,
            oc_blocks: geom.oc_blocks,
            kernel_height: s.kernel_height,
            kernel_width: s.kernel_width,
        }
    }

    pub fn input_layout(&self) -> ActivationLayout {
        self.input_layout
    }

    pub fn weights_layout(&self) -> WeightsLayout {
        self.weights_layout
    }

    pub fn output_layout(&self) -> ActivationLayout {
        self.output_layout
    }

    pub fn input_needs_repack(&self) -> bool {
        self.input_layout != ActivationLayout::Blocked
    }

    pub fn weights_needs_repack(&self) -> bool {
        self.weights_layout != WeightsLayout::Blocked
    }

    pub fn output_needs_repack(&self) -> bool {
        self.output_layout != ActivationLayout::Blocked
    }

    /// Elements the caller's input buffer must hold.
    pub fn external_input_len(&self) -> usize {
        match self.input_layout {
            ActivationLayout::Blocked => self.input.blocked_len(self.vector_width),
            _ => self.input.external_len(),
        }
    }

    /// Elements the caller's weights buffer must hold.
    pub fn external_weights_len(&self) -> usize {
        let spatial = self.kernel_height * self.kernel_width;
        match self.weights_layout {
            WeightsLayout::Blocked => {
                self.oc_blocks * self.ic_blocks * spatial * self.vector_width * self.vector_width
            }
            _ => self.out_channels * self.in_channels * spatial,
        }
    }

    /// Elements the caller's output buffer must hold.
    pub fn external_output_len(&self) -> usize {
        match self.output_layout {
            ActivationLayout::Blocked => self.output.blocked_len(self.vector_width),
            _ => self.output.external_len(),
        }
    }

    /// Packs the external input into the blocked layout.
    pub fn pack_input<T: Element>(&self, src: &[T], dst: &mut [T]) -> Result<(), GeometryError> {
        check_len("input", self.external_input_len(), src.len())?;
        check_len("blocked input", self.input.blocked_len(self.vector_width), dst.len())?;
        pack_activations(src, self.input_layout, &self.input, self.vector_width, dst);
        Ok(())
    }

    /// Packs an external output tensor (for accumulation into it).
    pub fn pack_output<T: Element>(&self, src: &[T], dst: &mut [T]) -> Result<(), GeometryError> {
        check_len("output", self.external_output_len(), src.len())?;
        check_len("blocked output", self.output.blocked_len(self.vector_width), dst.len())?;
        pack_activations(src, self.output_layout, &self.output, self.vector_width, dst);
        Ok(())
    }

    /// Writes a blocked output tensor back in the external layout, dropping
    /// the padded channels.
    pub fn unpack_output<T: Element>(&self, src: &[T], dst: &mut [T]) -> Result<(), GeometryError> {
        check_len("blocked output", self.output.blocked_len(self.vector_width), src.len())?;
        check_len("output", self.external_output_len(), dst.len())?;
        unpack_activations(src, self.output_layout, &self.output, self.vector_width, dst);
        Ok(())
    }

    /// Packs external weights into `(o / V, i / V, kh, kw, V_i, V_o)`.
    pub fn pack_weights<T: Element>(&self, src: &[T], dst: &mut [T]) -> Result<(), GeometryError> {
        let v = self.vector_width;
        let (kh, kw) = (self.kernel_height, self.kernel_width);
        let (ic, oc) = (self.in_channels, self.out_channels);
        let plane = kh * kw * v * v;
        check_len("weights", self.external_weights_len(), src.len())?;
        check_len("blocked weights", self.oc_blocks * self.ic_blocks * plane, dst.len())?;

        if self.weights_layout == WeightsLayout::Blocked {
            dst.copy_from_slice(src);
            return Ok(());
        }

        let layout = self.weights_layout;
        let ic_blocks = self.ic_blocks;
        dst.par_chunks_mut(plane).enumerate().for_each(|(p, block)| {
            let (ob, ib) = (p / ic_blocks, p % ic_blocks);
            for ky in 0..kh {
                for kx in 0..kw {
                    for iv in 0..v {
                        for ov in 0..v {
                            let (i, o) = (ib * v + iv, ob * v + ov);
                            let at = ((ky * kw + kx) * v + iv) * v + ov;
                            block[at] = if i < ic && o < oc {
                                match layout {
                                    WeightsLayout::Hwio => src[((ky * kw + kx) * ic + i) * oc + o],
                                    _ => src[((o * ic + i) * kh + ky) * kw + kx],
                                }
                            } else {
                                T::zero()
                            };
                        }
                    }
                }
            }
        });
        Ok(())
    }

    /// Copies a bias vector into `dst`, zero-padding up to the blocked
    /// output-channel count.
    pub fn pack_bias<T: Element>(&self, src: &[T], dst: &mut [T]) -> Result<(), GeometryError> {
        check_len("bias", self.out_channels, src.len())?;
        check_len("blocked bias", self.oc_blocks * self.vector_width, dst.len())?;
        dst[..src.len()].copy_from_slice(src);
        dst[src.len()..].fill(T::zero());
        Ok(())
    }
}

fn check_len(tensor: &'static str, expected: usize, actual: usize) -> Result<(), GeometryError> {
    if expected == actual {
        Ok(())
    } else {
        Err(GeometryError::BufferLength {
            tensor,
            expected,
            actual,
        })
    }
}

fn pack_activations<T: Element>(
    src: &[T],
    layout: ActivationLayout,
    d: &ActDims,
    v: usize,
    dst: &mut [T],
) {
    if layout == ActivationLayout::Blocked {
        dst.copy_from_slice(src);
        return;
    }
    let (c, h, w) = (d.channels, d.height, d.width);
    let blocks = d.blocks;
    dst.par_chunks_mut(h * w * v)
        .enumerate()
        .for_each(|(p, plane)| {
            let (n, cb) = (p / blocks, p % blocks);
            for y in 0..h {
                for x in 0..w {
                    let lanes = &mut plane[(y * w + x) * v..(y * w + x + 1) * v];
                    for (lane, out) in lanes.iter_mut().enumerate() {
                        let ch = cb * v + lane;
                        *out = if ch >= c {
                            T::zero()
                        } else if layout == ActivationLayout::Nhwc {
                            src[((n * h + y) * w + x) * c + ch]
                        } else {
                            src[((n * c + ch) * h + y) * w + x]
                        };
                    }
                }
            }
        });
}

fn unpack_activations<T: Element>(
    src: &[T],
    layout: ActivationLayout,
    d: &ActDims,
    v: usize,
    dst: &mut [T],
) {
    if layout == ActivationLayout::Blocked {
        dst.copy_from_slice(src);
        return;
    }
    let (c, h, w) = (d.channels, d.height, d.width);
    let blocks = d.blocks;
    dst.par_chunks_mut(c * h * w)
        .enumerate()
        .for_each(|(n, image)| {
            for ch in 0..c {
                let (cb, lane) = (ch / v, ch % v);
                let plane = &src[(n * blocks + cb) * h * w * v..];
                for y in 0..h {
                    for x in 0..w {
                        let value = plane[(y * w + x) * v + lane];
                        match layout {
                            ActivationLayout::Nhwc => image[(y * w + x) * c + ch] = value,
                            _ => image[(ch * h + y) * w + x] = value,
                        }
                    }
                }
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProblemShape;

    fn adapter(
        input: ActivationLayout,
        weights: WeightsLayout,
        output: ActivationLayout,
    ) -> (BlockGeometry, FormatAdapter) {
        let shape = ProblemShape::conv2d(2, 5, 3, 3, 4, 3);
        let g = BlockGeometry::derive(&shape, 4, 4, 1).unwrap();
        (g, FormatAdapter::new(&g, input, weights, output))
    }

    #[test]
    fn test_parse_layouts() {
        assert_eq!("NCHW".parse::<ActivationLayout>().unwrap(), ActivationLayout::Nchw);
        assert_eq!("hwio".parse::<WeightsLayout>().unwrap(), WeightsLayout::Hwio);
        assert!(matches!(
            "nchw16c".parse::<ActivationLayout>(),
            Err(GeometryError::UnknownLayout { role: "activation", .. })
        ));
    }

    #[test]
    fn test_pack_input_nchw_zero_pads() {
        let (g, a) = adapter(ActivationLayout::Nchw, WeightsLayout::Oihw, ActivationLayout::Nchw);
        let src: Vec<f32> = (0..g.shape.input_len()).map(|i| i as f32).collect();
        let mut dst = vec![-1.0f32; g.blocked_input_len()];
        a.pack_input(&src, &mut dst).unwrap();
        let (h, w, v) = (3, 4, 4);
        // n = 1, c = 4 lives in block 1, lane 0.
        let at = (((1 * 2 + 1) * h + 2) * w + 3) * v;
        assert_eq!(dst[at], src[((1 * 5 + 4) * h + 2) * w + 3]);
        // c = 5..8 are padding.
        assert_eq!(dst[at + 1], 0.0);
        assert_eq!(dst[at + 3], 0.0);
    }

    #[test]
    fn test_nhwc_and_nchw_agree() {
        let (g, planar) = adapter(ActivationLayout::Nchw, WeightsLayout::Oihw, ActivationLayout::Nchw);
        let (_, inter) = adapter(ActivationLayout::Nhwc, WeightsLayout::Oihw, ActivationLayout::Nhwc);
        let s = g.shape;
        let (c, h, w) = (s.in_channels, s.in_height, s.in_width);
        let nchw: Vec<f64> = (0..s.input_len()).map(|i| (i * 7 % 13) as f64).collect();
        let mut nhwc = vec![0.0; s.input_len()];
        for n in 0..s.batch {
            for ch in 0..c {
                for y in 0..h {
                    for x in 0..w {
                        nhwc[((n * h + y) * w + x) * c + ch] = nchw[((n * c + ch) * h + y) * w + x];
                    }
                }
            }
        }
        let mut a = vec![0.0; g.blocked_input_len()];
        let mut b = vec![0.0; g.blocked_input_len()];
        planar.pack_input(&nchw, &mut a).unwrap();
        inter.pack_input(&nhwc, &mut b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_output_unpack_inverts_pack() {
        for layout in [ActivationLayout::Nchw, ActivationLayout::Nhwc] {
            let (g, a) = adapter(ActivationLayout::Nchw, WeightsLayout::Oihw, layout);
            let ext: Vec<f32> = (0..g.shape.output_len()).map(|i| i as f32 * 0.5).collect();
            let mut blocked = vec![0.0f32; g.blocked_output_len()];
            a.pack_output(&ext, &mut blocked).unwrap();
            let mut back = vec![0.0f32; ext.len()];
            a.unpack_output(&blocked, &mut back).unwrap();
            assert_eq!(ext, back);
        }
    }

    #[test]
    fn test_pack_weights_layouts_agree() {
        let (g, oihw) = adapter(ActivationLayout::Nchw, WeightsLayout::Oihw, ActivationLayout::Nchw);
        let (_, hwio) = adapter(ActivationLayout::Nchw, WeightsLayout::Hwio, ActivationLayout::Nchw);
        let s = g.shape;
        let (o_n, i_n, k) = (s.out_channels, s.in_channels, 3);
        let w_oihw: Vec<f32> = (0..s.weights_len()).map(|i| i as f32).collect();
        let mut w_hwio = vec![0.0f32; s.weights_len()];
        for o in 0..o_n {
            for i in 0..i_n {
                for ky in 0..k {
                    for kx in 0..k {
                        w_hwio[((ky * k + kx) * i_n + i) * o_n + o] =
                            w_oihw[((o * i_n + i) * k + ky) * k + kx];
                    }
                }
            }
        }
        let mut a = vec![0.0f32; g.blocked_weights_len()];
        let mut b = vec![0.0f32; g.blocked_weights_len()];
        oihw.pack_weights(&w_oihw, &mut a).unwrap();
        hwio.pack_weights(&w_hwio, &mut b).unwrap();
        assert_eq!(a, b);

        // o = 2, i = 4, ky = 1, kx = 2 -> block (0, 1), lanes (0, 2)
        let at = ((((0 * 2 + 1) * 3 + 1) * 3 + 2) * 4 + 0) * 4 + 2;
        assert_eq!(a[at], w_oihw[((2 * i_n + 4) * 3 + 1) * 3 + 2]);
    }

    #[test]
    fn test_blocked_is_passthrough() {
        let (g, a) = adapter(
            ActivationLayout::Blocked,
            WeightsLayout::Blocked,
            ActivationLayout::Blocked,
        );
        assert!(!a.input_needs_repack());
        assert!(!a.weights_needs_repack());
        assert_eq!(a.external_input_len(), g.blocked_input_len());
        assert_eq!(a.external_weights_len(), g.blocked_weights_len());
    }

    #[test]
    fn test_length_checks() {
        let (g, a) = adapter(ActivationLayout::Nchw, WeightsLayout::Oihw, ActivationLayout::Nchw);
        let mut dst = vec![0.0f32; g.blocked_input_len()];
        let err = a.pack_input(&[0.0f32; 3], &mut dst).unwrap_err();
        assert!(matches!(err, GeometryError::BufferLength { tensor: "input", .. }));

        let mut bias = vec![1.0f32; 4];
        a.pack_bias(&[0.5, 0.25, 0.125], &mut bias).unwrap();
        assert_eq!(bias, vec![0.5, 0.25, 0.125, 0.0]);
    }
}
