// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Scratch arena statistics.
//!
//! [`ArenaStats`] counts how often a generation was rebuilt versus reused.
//! Repeated runs of an unchanged problem must show growing `reuses` and a
//! constant `allocations` count.

/// Cumulative statistics about scratch usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ArenaStats {
    /// Generations built (first build plus every rebuild).
    pub generations: u64,
    /// `ensure` calls satisfied by the live generation.
    pub reuses: u64,
    /// Individual buffers allocated.
    pub allocations: u64,
    /// Individual buffers released.
    pub releases: u64,
    /// Requests rejected by the scratch budget.
    pub budget_rejections: u64,
    /// Bytes held by the live generation.
    pub live_bytes: usize,
    /// High-water mark of `live_bytes`.
    pub peak_bytes: usize,
    /// Bytes allocated over the arena's lifetime.
    pub cumulative_bytes: u64,
}

impl ArenaStats {
    pub(crate) fn record_reuse(&mut self) {
        self.reuses += 1;
    }

    pub(crate) fn record_generation(&mut self, buffers: usize, bytes: usize) {
        self.generations += 1;
        self.allocations += buffers as u64;
        self.cumulative_bytes += bytes as u64;
        self.live_bytes = bytes;
        self.peak_bytes = self.peak_bytes.max(bytes);
    }

    pub(crate) fn record_release(&mut self, buffers: usize) {
        self.releases += buffers as u64;
        self.live_bytes = 0;
    }

    pub(crate) fn record_budget_rejection(&mut self) {
        self.budget_rejections += 1;
    }

    /// Fraction of `ensure` calls that reused the live generation.
    pub fn reuse_ratio(&self) -> f64 {
        let total = self.reuses + self.generations;
        if total == 0 {
            return 0.0;
        }
        self.reuses as f64 / total as f64
    }

    /// Returns a human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "Scratch: {} generations, {} reuses ({:.0}% reuse), {} buffers allocated, \
             {} released, live {:.2} MB, peak {:.2} MB, {} budget rejections",
            self.generations,
            self.reuses,
            self.reuse_ratio() * 100.0,
            self.allocations,
            self.releases,
            self.live_bytes as f64 / (1024.0 * 1024.0),
            self.peak_bytes as f64 / (1024.0 * 1024.0),
            self.budget_rejections,
        )
    }
}
