// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Winograd transforms `F(m x m, K x K)`.
//!
//! With input tile `d` (`A x A`), filter `g` (`K x K`) and `m = A - K + 1`:
//!
//! ```text
//!   V = BT · d · BTᵀ        input transform
//!   U = G  · g · Gᵀ         weights transform
//!   M = Σ_c U ⊙ V           block multiply-accumulate (per point)
//!   Y = AT · M · ATᵀ        output transform
//! ```
//!
//! Transformed tiles are stored point-major with `pt = wa * A + ha`, where
//! `ha` indexes the row axis and `wa` the column axis, so the `A` points of
//! one column `wa` are contiguous. Every point holds `lanes` channel values.

use crate::KernelError;
use conv_geometry::Element;

/// Largest supported tile edge.
pub const MAX_TILE_EDGE: usize = 8;

/// Largest supported lane count per point.
pub const MAX_LANES: usize = 16;

const TILE_SCRATCH: usize = MAX_TILE_EDGE * MAX_TILE_EDGE;

/// Transform capability for one `(A, K)` pair.
///
/// Strided arguments address point `p` at `slice[p * stride..][..lanes]`.
pub trait WinogradKernel<T: Element>: Send + Sync {
    /// Input tile edge `A`.
    fn tile_edge(&self) -> usize;

    /// Kernel edge `K`.
    fn kernel_size(&self) -> usize;

    /// Output tile edge `m = A - K + 1`.
    fn output_tile(&self) -> usize {
        self.tile_edge() - self.kernel_size() + 1
    }

    /// Transforms a gathered `[A][A][lanes]` tile into all `A²` points.
    fn transform_input(&self, tile: &[T], lanes: usize, dst: &mut [T], stride: usize);

    /// Transforms only column `wa`, writing its `A` points (`ha` order).
    fn transform_input_column(
        &self,
        tile: &[T],
        lanes: usize,
        wa: usize,
        dst: &mut [T],
        stride: usize,
    );

    /// Transforms a `[K][K][block]` filter into `A²` points of `block` values.
    fn transform_weights(&self, weights: &[T], block: usize, dst: &mut [T], stride: usize);

    /// First output pass over one column: `P[r] = Σ_i AT[r][i] · M[i]`.
    ///
    /// Reads the `A` points of the column from `src`; writes `m` rows of
    /// `lanes` values to `dst`.
    fn transform_output_rows(&self, src: &[T], stride: usize, lanes: usize, dst: &mut [T]);

    /// Second output pass: `Y[r][c] = Σ_j AT[c][j] · P_j[r]`.
    ///
    /// `P_j` (the rows result of column `j`) starts at `src[j * stride]`.
    /// Writes a `[m][m][lanes]` tile to `dst`.
    fn transform_output_cols(&self, src: &[T], stride: usize, lanes: usize, dst: &mut [T]);

    /// Full output transform of `A²` strided points into `[m][m][lanes]`.
    fn transform_output(&self, src: &[T], stride: usize, lanes: usize, dst: &mut [T]) {
        let a = self.tile_edge();
        let m = self.output_tile();
        let mut rows = [T::zero(); MAX_TILE_EDGE * MAX_TILE_EDGE * MAX_LANES];
        let block = m * lanes;
        for wa in 0..a {
            self.transform_output_rows(
                &src[wa * a * stride..],
                stride,
                lanes,
                &mut rows[wa * block..(wa + 1) * block],
            );
        }
        self.transform_output_cols(&rows[..a * block], block, lanes, dst);
    }
}

/// Transform kernel defined by its three matrices.
#[derive(Debug, Clone)]
pub struct MatrixKernel<T> {
    name: &'static str,
    edge: usize,
    kernel: usize,
    out: usize,
    /// `A x A`, row-major.
    bt: Vec<T>,
    /// `A x K`, row-major.
    g: Vec<T>,
    /// `m x A`, row-major.
    at: Vec<T>,
}

impl<T: Element> MatrixKernel<T> {
    /// Builds a kernel from `f64` matrices, checking their dimensions.
    pub fn from_matrices(
        name: &'static str,
        edge: usize,
        kernel: usize,
        bt: &[f64],
        g: &[f64],
        at: &[f64],
    ) -> Result<Self, KernelError> {
        if edge > MAX_TILE_EDGE {
            return Err(KernelError::TileTooLarge {
                tile_edge: edge,
                max: MAX_TILE_EDGE,
            });
        }
        let out = edge + 1 - kernel;
        for (matrix, values, expected) in [
            ("BT", bt, edge * edge),
            ("G", g, edge * kernel),
            ("AT", at, out * edge),
        ] {
            if values.len() != expected {
                return Err(KernelError::MalformedMatrix {
                    matrix,
                    expected,
                    actual: values.len(),
                });
            }
        }
        let cast = |v: &[f64]| v.iter().map(|&x| T::lit(x)).collect::<Vec<T>>();
        Ok(Self {
            name,
            edge,
            kernel,
            out,
            bt: cast(bt),
            g: cast(g),
            at: cast(at),
        })
    }

    /// `F(2x2, 3x3)`: 4-wide input tiles.
    pub fn f2x2_3x3() -> Self {
        #[rustfmt::skip]
        const BT: [f64; 16] = [
            1.0,  0.0, -1.0,  0.0,
            0.0,  1.0,  1.0,  0.0,
            0.0, -1.0,  1.0,  0.0,
            0.0,  1.0,  0.0, -1.0,
        ];
        #[rustfmt::skip]
        const G: [f64; 12] = [
            1.0,  0.0, 0.0,
            0.5,  0.5, 0.5,
            0.5, -0.5, 0.5,
            0.0,  0.0, 1.0,
        ];
        #[rustfmt::skip]
        const AT: [f64; 8] = [
            1.0, 1.0,  1.0,  0.0,
            0.0, 1.0, -1.0, -1.0,
        ];
        Self::constant("F(2x2,3x3)", 4, 3, &BT, &G, &AT)
    }

    /// `F(3x3, 3x3)`: 5-wide input tiles, points `0, 1, -1, 2, ∞`.
    pub fn f3x3_3x3() -> Self {
        #[rustfmt::skip]
        const BT: [f64; 25] = [
            2.0, -1.0, -2.0,  1.0, 0.0,
            0.0, -2.0, -1.0,  1.0, 0.0,
            0.0,  2.0, -3.0,  1.0, 0.0,
            0.0, -1.0,  0.0,  1.0, 0.0,
            0.0,  2.0, -1.0, -2.0, 1.0,
        ];
        #[rustfmt::skip]
        const G: [f64; 15] = [
             1.0 / 2.0,  0.0,        0.0,
            -1.0 / 2.0, -1.0 / 2.0, -1.0 / 2.0,
            -1.0 / 6.0,  1.0 / 6.0, -1.0 / 6.0,
             1.0 / 6.0,  1.0 / 3.0,  2.0 / 3.0,
             0.0,        0.0,        1.0,
        ];
        #[rustfmt::skip]
        const AT: [f64; 15] = [
            1.0, 1.0,  1.0, 1.0, 0.0,
            0.0, 1.0, -1.0, 2.0, 0.0,
            0.0, 1.0,  1.0, 4.0, 1.0,
        ];
        Self::constant("F(3x3,3x3)", 5, 3, &BT, &G, &AT)
    }

    /// `F(4x4, 3x3)`: 6-wide input tiles.
    pub fn f4x4_3x3() -> Self {
        #[rustfmt::skip]
        const BT: [f64; 36] = [
            4.0,  0.0, -5.0,  0.0, 1.0, 0.0,
            0.0, -4.0, -4.0,  1.0, 1.0, 0.0,
            0.0,  4.0, -4.0, -1.0, 1.0, 0.0,
            0.0, -2.0, -1.0,  2.0, 1.0, 0.0,
            0.0,  2.0, -1.0, -2.0, 1.0, 0.0,
            0.0,  4.0,  0.0, -5.0, 0.0, 1.0,
        ];
        #[rustfmt::skip]
        const G: [f64; 18] = [
             1.0 / 4.0,   0.0,        0.0,
            -1.0 / 6.0,  -1.0 / 6.0, -1.0 / 6.0,
            -1.0 / 6.0,   1.0 / 6.0, -1.0 / 6.0,
             1.0 / 24.0,  1.0 / 12.0, 1.0 / 6.0,
             1.0 / 24.0, -1.0 / 12.0, 1.0 / 6.0,
             0.0,         0.0,        1.0,
        ];
        #[rustfmt::skip]
        const AT: [f64; 24] = [
            1.0, 1.0,  1.0, 1.0,  1.0, 0.0,
            0.0, 1.0, -1.0, 2.0, -2.0, 0.0,
            0.0, 1.0,  1.0, 4.0,  4.0, 0.0,
            0.0, 1.0, -1.0, 8.0, -8.0, 1.0,
        ];
        Self::constant("F(4x4,3x3)", 6, 3, &BT, &G, &AT)
    }

    /// `F(5x5, 3x3)`: 7-wide input tiles, points `0, 1, -1, 2, -2, 1/2, ∞`.
    pub fn f5x5_3x3() -> Self {
        #[rustfmt::skip]
        const BT: [f64; 49] = [
            -2.0,  4.0,  5.0 / 2.0, -5.0,       -1.0 / 2.0,  1.0,       0.0,
             0.0,  2.0, -2.0,       -9.0 / 2.0,  1.0 / 2.0,  1.0,       0.0,
             0.0, -2.0,  6.0,       -7.0 / 2.0, -3.0 / 2.0,  1.0,       0.0,
             0.0,  1.0, -3.0 / 2.0, -2.0,        3.0 / 2.0,  1.0,       0.0,
             0.0, -1.0,  5.0 / 2.0,  0.0,       -5.0 / 2.0,  1.0,       0.0,
             0.0,  4.0,  0.0,       -5.0,        0.0,        1.0,       0.0,
             0.0, -2.0,  4.0,        5.0 / 2.0, -5.0,       -1.0 / 2.0, 1.0,
        ];
        #[rustfmt::skip]
        const G: [f64; 21] = [
            -1.0 / 2.0,   0.0,         0.0,
            -1.0 / 3.0,  -1.0 / 3.0,  -1.0 / 3.0,
             1.0 / 9.0,  -1.0 / 9.0,   1.0 / 9.0,
             1.0 / 36.0,  1.0 / 18.0,  1.0 / 9.0,
            -1.0 / 60.0,  1.0 / 30.0, -1.0 / 15.0,
            32.0 / 45.0, 16.0 / 45.0,  8.0 / 45.0,
             0.0,         0.0,         1.0,
        ];
        #[rustfmt::skip]
        const AT: [f64; 35] = [
            1.0, 1.0,  1.0,  1.0,  1.0, 1.0,        0.0,
            0.0, 1.0, -1.0,  2.0, -2.0, 1.0 / 2.0,  0.0,
            0.0, 1.0,  1.0,  4.0,  4.0, 1.0 / 4.0,  0.0,
            0.0, 1.0, -1.0,  8.0, -8.0, 1.0 / 8.0,  0.0,
            0.0, 1.0,  1.0, 16.0, 16.0, 1.0 / 16.0, 1.0,
        ];
        Self::constant("F(5x5,3x3)", 7, 3, &BT, &G, &AT)
    }

    // Built-in matrices have fixed, known-good dimensions.
    fn constant(
        name: &'static str,
        edge: usize,
        kernel: usize,
        bt: &[f64],
        g: &[f64],
        at: &[f64],
    ) -> Self {
        let cast = |v: &[f64]| v.iter().map(|&x| T::lit(x)).collect::<Vec<T>>();
        Self {
            name,
            edge,
            kernel,
            out: edge + 1 - kernel,
            bt: cast(bt),
            g: cast(g),
            at: cast(at),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T: Element> WinogradKernel<T> for MatrixKernel<T> {
    fn tile_edge(&self) -> usize {
        self.edge
    }

    fn kernel_size(&self) -> usize {
        self.kernel
    }

    fn output_tile(&self) -> usize {
        self.out
    }

    fn transform_input(&self, tile: &[T], lanes: usize, dst: &mut [T], stride: usize) {
        let a = self.edge;
        let mut rows = [T::zero(); TILE_SCRATCH];
        for l in 0..lanes {
            // rows[i][w] = Σ_h BT[i][h] · d[h][w]
            for i in 0..a {
                for w in 0..a {
                    let mut s = T::zero();
                    for h in 0..a {
                        s = s + self.bt[i * a + h] * tile[(h * a + w) * lanes + l];
                    }
                    rows[i * a + w] = s;
                }
            }
            // V[i][j] = Σ_w rows[i][w] · BT[j][w]
            for j in 0..a {
                for i in 0..a {
                    let mut s = T::zero();
                    for w in 0..a {
                        s = s + rows[i * a + w] * self.bt[j * a + w];
                    }
                    dst[(j * a + i) * stride + l] = s;
                }
            }
        }
    }

    fn transform_input_column(
        &self,
        tile: &[T],
        lanes: usize,
        wa: usize,
        dst: &mut [T],
        stride: usize,
    ) {
        let a = self.edge;
        let mut col = [T::zero(); MAX_TILE_EDGE];
        for l in 0..lanes {
            for (h, c) in col.iter_mut().enumerate().take(a) {
                let mut s = T::zero();
                for w in 0..a {
                    s = s + tile[(h * a + w) * lanes + l] * self.bt[wa * a + w];
                }
                *c = s;
            }
            for i in 0..a {
                let mut s = T::zero();
                for h in 0..a {
                    s = s + self.bt[i * a + h] * col[h];
                }
                dst[i * stride + l] = s;
            }
        }
    }

    fn transform_weights(&self, weights: &[T], block: usize, dst: &mut [T], stride: usize) {
        let (a, k) = (self.edge, self.kernel);
        let mut rows = [T::zero(); TILE_SCRATCH];
        for b in 0..block {
            // rows[i][kw] = Σ_kh G[i][kh] · g[kh][kw]
            for i in 0..a {
                for kw in 0..k {
                    let mut s = T::zero();
                    for kh in 0..k {
                        s = s + self.g[i * k + kh] * weights[(kh * k + kw) * block + b];
                    }
                    rows[i * k + kw] = s;
                }
            }
            for j in 0..a {
                for i in 0..a {
                    let mut s = T::zero();
                    for kw in 0..k {
                        s = s + rows[i * k + kw] * self.g[j * k + kw];
                    }
                    dst[(j * a + i) * stride + b] = s;
                }
            }
        }
    }

    fn transform_output_rows(&self, src: &[T], stride: usize, lanes: usize, dst: &mut [T]) {
        let a = self.edge;
        for r in 0..self.out {
            for l in 0..lanes {
                let mut s = T::zero();
                for i in 0..a {
                    s = s + self.at[r * a + i] * src[i * stride + l];
                }
                dst[r * lanes + l] = s;
            }
        }
    }

    fn transform_output_cols(&self, src: &[T], stride: usize, lanes: usize, dst: &mut [T]) {
        let (a, m) = (self.edge, self.out);
        for r in 0..m {
            for c in 0..m {
                for l in 0..lanes {
                    let mut s = T::zero();
                    for j in 0..a {
                        s = s + self.at[c * a + j] * src[j * stride + r * lanes + l];
                    }
                    dst[(r * m + c) * lanes + l] = s;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample(len: usize, seed: u32) -> Vec<f64> {
        (0..len)
            .map(|i| (((i as u32).wrapping_mul(2654435761).wrapping_add(seed) % 97) as f64) / 48.0 - 1.0)
            .collect()
    }

    /// Runs one tile through all three transforms with a single lane and
    /// compares against direct correlation.
    fn check_single_tile(kernel: &MatrixKernel<f64>) {
        let a = kernel.tile_edge();
        let k = kernel.kernel_size();
        let m = kernel.output_tile();
        let d = sample(a * a, 3);
        let g = sample(k * k, 11);

        let mut v = vec![0.0; a * a];
        let mut u = vec![0.0; a * a];
        kernel.transform_input(&d, 1, &mut v, 1);
        kernel.transform_weights(&g, 1, &mut u, 1);
        let prod: Vec<f64> = v.iter().zip(&u).map(|(x, y)| x * y).collect();
        let mut y = vec![0.0; m * m];
        kernel.transform_output(&prod, 1, 1, &mut y);

        for r in 0..m {
            for c in 0..m {
                let mut expect = 0.0;
                for kh in 0..k {
                    for kw in 0..k {
                        expect += g[kh * k + kw] * d[(r + kh) * a + c + kw];
                    }
                }
                assert!(
                    (y[r * m + c] - expect).abs() < 1e-9,
                    "{} at ({r},{c}): {} vs {expect}",
                    kernel.name(),
                    y[r * m + c]
                );
            }
        }
    }

    #[test]
    fn test_f2x2_3x3_matches_direct() {
        check_single_tile(&MatrixKernel::f2x2_3x3());
    }

    #[test]
    fn test_f3x3_3x3_matches_direct() {
        check_single_tile(&MatrixKernel::f3x3_3x3());
    }

    #[test]
    fn test_f4x4_3x3_matches_direct() {
        check_single_tile(&MatrixKernel::f4x4_3x3());
    }

    #[test]
    fn test_f5x5_3x3_matches_direct() {
        check_single_tile(&MatrixKernel::f5x5_3x3());
    }

    #[test]
    fn test_odd_edge_column_transform_matches_full() {
        let kernel = MatrixKernel::<f64>::f5x5_3x3();
        let lanes = 2;
        let d = sample(49 * lanes, 9);
        let mut full = vec![0.0; 49 * lanes];
        kernel.transform_input(&d, lanes, &mut full, lanes);
        for wa in 0..7 {
            let mut col = vec![0.0; 7 * lanes];
            kernel.transform_input_column(&d, lanes, wa, &mut col, lanes);
            assert_eq!(&full[wa * 7 * lanes..(wa + 1) * 7 * lanes], &col[..]);
        }
    }

    #[test]
    fn test_column_transform_matches_full() {
        let kernel = MatrixKernel::<f64>::f4x4_3x3();
        let lanes = 3;
        let d = sample(36 * lanes, 5);
        let mut full = vec![0.0; 36 * lanes];
        kernel.transform_input(&d, lanes, &mut full, lanes);
        for wa in 0..6 {
            let mut col = vec![0.0; 6 * lanes];
            kernel.transform_input_column(&d, lanes, wa, &mut col, lanes);
            assert_eq!(&full[wa * 6 * lanes..(wa + 1) * 6 * lanes], &col[..]);
        }
    }

    #[test]
    fn test_lanes_are_independent() {
        let kernel = MatrixKernel::<f32>::f2x2_3x3();
        let lanes = 4;
        let d: Vec<f32> = (0..16 * lanes).map(|i| (i % lanes) as f32).collect();
        let mut v = vec![0.0f32; 16 * lanes];
        kernel.transform_input(&d, lanes, &mut v, lanes);
        // Lane 0 of the input is all zeros.
        assert!((0..16).all(|p| v[p * lanes] == 0.0));
    }

    #[test]
    fn test_malformed_matrix_rejected() {
        let err = MatrixKernel::<f32>::from_matrices("bad", 4, 3, &[0.0; 15], &[0.0; 12], &[0.0; 8])
            .unwrap_err();
        assert!(matches!(err, KernelError::MalformedMatrix { matrix: "BT", .. }));
        let err = MatrixKernel::<f32>::from_matrices("big", 10, 3, &[], &[], &[]).unwrap_err();
        assert!(matches!(err, KernelError::TileTooLarge { tile_edge: 10, .. }));
    }

    proptest! {
        #[test]
        fn prop_lanes_match_direct_correlation(
            d in prop::collection::vec(-2.0f64..2.0, 49 * 2),
            g in prop::collection::vec(-2.0f64..2.0, 9 * 2),
            edge in prop::sample::select(vec![4usize, 5, 6, 7]),
        ) {
            // Two lanes, interleaved as [point][lane].
            let kernel = match edge {
                4 => MatrixKernel::<f64>::f2x2_3x3(),
                5 => MatrixKernel::f3x3_3x3(),
                6 => MatrixKernel::f4x4_3x3(),
                _ => MatrixKernel::f5x5_3x3(),
            };
            let (a, m) = (kernel.tile_edge(), kernel.output_tile());
            let lanes = 2;
            let mut v = vec![0.0; a * a * lanes];
            let mut u = vec![0.0; a * a];
            let mut y = vec![0.0; m * m * lanes];
            kernel.transform_input(&d[..a * a * lanes], lanes, &mut v, lanes);
            let mut prod = vec![0.0; a * a * lanes];
            for l in 0..lanes {
                let gl: Vec<f64> = (0..9).map(|i| g[i * lanes + l]).collect();
                kernel.transform_weights(&gl, 1, &mut u, 1);
                for p in 0..a * a {
                    prod[p * lanes + l] = v[p * lanes + l] * u[p];
                }
            }
            kernel.transform_output(&prod, lanes, lanes, &mut y);
            for l in 0..lanes {
                for r in 0..m {
                    for c in 0..m {
                        let mut expect = 0.0;
                        for kh in 0..3 {
                            for kw in 0..3 {
                                expect += g[(kh * 3 + kw) * lanes + l] * d[((r + kh) * a + c + kw) * lanes + l];
                            }
                        }
                        let got = y[(r * m + c) * lanes + l];
                        prop_assert!((got - expect).abs() < 1e-8 * (1.0 + expect.abs()), "{} vs {}", got, expect);
                    }
                }
            }
        }
    }
}
