// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Cache-line aligned element buffers.

use std::mem;

/// Alignment of every scratch buffer, in bytes.
pub const CACHE_LINE: usize = 64;

/// A zero-initialised buffer of `len` elements starting on a cache line.
///
/// Backed by a `Vec` over-allocated by one cache line; the visible slice
/// starts at the first aligned element.
pub struct AlignedBuffer<T> {
    storage: Vec<T>,
    offset: usize,
    len: usize,
}

impl<T: Copy + Default> AlignedBuffer<T> {
    pub fn zeroed(len: usize) -> Self {
        let slack = CACHE_LINE / mem::size_of::<T>().max(1);
        let storage = vec![T::default(); len + slack];
        let offset = match storage.as_ptr().align_offset(CACHE_LINE) {
            o if o <= slack => o,
            _ => 0,
        };
        Self {
            storage,
            offset,
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of the visible slice in bytes.
    pub fn size_bytes(&self) -> usize {
        self.len * mem::size_of::<T>()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.storage[self.offset..self.offset + self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.storage[self.offset..self.offset + self.len]
    }

    /// Resets every element to `T::default()`.
    pub fn clear(&mut self) {
        self.as_mut_slice().fill(T::default());
    }
}

impl<T> std::fmt::Debug for AlignedBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBuffer")
            .field("len", &self.len)
            .field("offset", &self.offset)
            .finish()
    }
}
