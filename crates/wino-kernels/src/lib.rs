// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # wino-kernels
//!
//! Numeric building blocks for the convolution pipelines.
//!
//! This crate provides:
//! - [`WinogradKernel`]: the transform capability (input, weights and
//!   output transforms) for one `(tile edge, kernel size)` pair, with
//!   [`MatrixKernel`] implementing `F(m x m, 3x3)` for `m` from 2 to 5.
//! - [`KernelRegistry`]: kernels registered once and looked up when an
//!   engine is initialised.
//! - [`GemmPlan`] / [`BlockGemm`]: the transformed-domain block
//!   multiply-accumulate, with a separate tail variant for a partial last
//!   channel block.
//! - [`gather`]: interior and border staging of input windows.
//! - [`Epilogue`]: bias, sum and ReLU fused into the output store.
//! - [`DirectConv`] and [`reference_conv_nchw`]: direct convolution.
//!
//! All kernels work on caller-provided buffers and never allocate.

mod direct;
mod epilogue;
mod error;
mod gemm;
mod registry;
mod staging;
mod transform;

pub use direct::{reference_conv_nchw, DirectConv};
pub use epilogue::Epilogue;
pub use error::KernelError;
pub use gemm::{BlockGemm, GemmPlan};
pub use registry::{KernelHandle, KernelRegistry};
pub use staging::{gather, gather_border, gather_interior, Plane};
pub use transform::{MatrixKernel, WinogradKernel, MAX_LANES, MAX_TILE_EDGE};
