// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Kernel registration table, built once and queried at initialisation.

use crate::{KernelError, MatrixKernel, WinogradKernel};
use conv_geometry::Element;
use std::sync::Arc;

/// Shared handle to a registered kernel.
pub type KernelHandle<T> = Arc<dyn WinogradKernel<T>>;

/// Winograd kernels keyed by `(tile_edge, kernel_size)`.
pub struct KernelRegistry<T: Element> {
    kernels: Vec<KernelHandle<T>>,
}

impl<T: Element> KernelRegistry<T> {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            kernels: Vec::new(),
        }
    }

    /// Registry with the 3x3 kernels for tile edges 4 through 7.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(MatrixKernel::<T>::f2x2_3x3()));
        registry.register(Arc::new(MatrixKernel::<T>::f3x3_3x3()));
        registry.register(Arc::new(MatrixKernel::<T>::f4x4_3x3()));
        registry.register(Arc::new(MatrixKernel::<T>::f5x5_3x3()));
        registry
    }

    /// Adds a kernel, replacing any earlier one with the same key.
    pub fn register(&mut self, kernel: KernelHandle<T>) {
        let key = (kernel.tile_edge(), kernel.kernel_size());
        self.kernels
            .retain(|k| (k.tile_edge(), k.kernel_size()) != key);
        tracing::debug!(tile_edge = key.0, kernel = key.1, "winograd kernel registered");
        self.kernels.push(kernel);
    }

    pub fn lookup(&self, tile_edge: usize, kernel: usize) -> Result<KernelHandle<T>, KernelError> {
        self.kernels
            .iter()
            .find(|k| k.tile_edge() == tile_edge && k.kernel_size() == kernel)
            .cloned()
            .ok_or(KernelError::Unimplemented { tile_edge, kernel })
    }

    /// Registered `(tile_edge, kernel_size)` pairs.
    pub fn supported(&self) -> Vec<(usize, usize)> {
        let mut keys: Vec<_> = self
            .kernels
            .iter()
            .map(|k| (k.tile_edge(), k.kernel_size()))
            .collect();
        keys.sort_unstable();
        keys
    }
}

impl<T: Element> Default for KernelRegistry<T> {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl<T: Element> std::fmt::Debug for KernelRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelRegistry")
            .field("supported", &self.supported())
            .finish()
    }
}
