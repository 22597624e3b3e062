// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Run metrics.
//!
//! [`RunMetrics`] describes one `run` call; [`EngineMetrics`] accumulates
//! them over the engine's lifetime. These are the numbers the CLI uses to
//! compare strategies.

use std::time::Duration;

/// Metrics for a single `run` call.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunMetrics {
    /// Strategy label, e.g. `a061/tile-output-fused-private-input`.
    pub strategy: String,
    /// Wall-clock time of the whole call.
    pub total_duration: Duration,
    /// Time spent converting between external and blocked layouts.
    pub repack_duration: Duration,
    /// Time spent transforming (or blocking) weights; zero in steady state.
    pub weights_duration: Duration,
    /// Time spent in the compute stages.
    pub compute_duration: Duration,
    /// Whether weights were transformed during this call.
    pub weights_transformed: bool,
    /// Whether the scratch generation was reused as-is.
    pub scratch_reused: bool,
    pub tiles: usize,
    /// Multiply-accumulates of the equivalent direct convolution.
    pub macs: u64,
}

impl RunMetrics {
    /// Direct-equivalent GMAC/s over the compute stages.
    pub fn gmacs_per_second(&self) -> f64 {
        let secs = self.compute_duration.as_secs_f64();
        if secs > 0.0 {
            self.macs as f64 / secs / 1e9
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: total {:.3}ms (repack {:.3}ms, weights {:.3}ms{}, compute {:.3}ms) | {} tiles | {:.2} GMAC/s",
            self.strategy,
            self.total_duration.as_secs_f64() * 1e3,
            self.repack_duration.as_secs_f64() * 1e3,
            self.weights_duration.as_secs_f64() * 1e3,
            if self.weights_transformed { "" } else { " cached" },
            self.compute_duration.as_secs_f64() * 1e3,
            self.tiles,
            self.gmacs_per_second(),
        )
    }
}

/// Cumulative metrics across runs.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct EngineMetrics {
    pub runs: usize,
    pub weights_transforms: usize,
    pub total_duration: Duration,
    pub total_compute_duration: Duration,
    pub total_macs: u64,
    /// Most recent run.
    pub last: Option<RunMetrics>,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one run.
    pub fn record(&mut self, run: &RunMetrics) {
        self.runs += 1;
        if run.weights_transformed {
            self.weights_transforms += 1;
        }
        self.total_duration += run.total_duration;
        self.total_compute_duration += run.compute_duration;
        self.total_macs += run.macs;
        self.last = Some(run.clone());
    }

    /// Mean wall-clock time per run.
    pub fn mean_duration(&self) -> Duration {
        if self.runs == 0 {
            Duration::ZERO
        } else {
            self.total_duration / self.runs as u32
        }
    }

    pub fn gmacs_per_second(&self) -> f64 {
        let secs = self.total_compute_duration.as_secs_f64();
        if secs > 0.0 {
            self.total_macs as f64 / secs / 1e9
        } else {
            0.0
        }
    }

    /// Returns a human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "{} runs ({} weight transforms) | mean {:.3}ms | {:.2} GMAC/s",
            self.runs,
            self.weights_transforms,
            self.mean_duration().as_secs_f64() * 1e3,
            self.gmacs_per_second(),
        )
    }
}
