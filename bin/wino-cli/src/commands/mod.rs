// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Subcommands and the arguments they share.

pub mod bench;
pub mod plan;
pub mod run;

use clap::Args;
use conv_engine::{Algorithm, EngineConfig};
use conv_geometry::{Padding, ProblemShape};
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Initialises `tracing-subscriber` from the `-v` count.
///
/// `RUST_LOG` takes precedence when set.
pub fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose > 1)
        .init();
}

/// Convolution problem dimensions.
#[derive(Args, Debug, Clone)]
pub struct ProblemArgs {
    #[arg(short = 'n', long, default_value_t = 1)]
    pub batch: usize,

    #[arg(long, default_value_t = 64)]
    pub in_channels: usize,

    #[arg(long, default_value_t = 64)]
    pub out_channels: usize,

    #[arg(long, default_value_t = 56)]
    pub height: usize,

    #[arg(long, default_value_t = 56)]
    pub width: usize,

    /// Square kernel edge.
    #[arg(short, long, default_value_t = 3)]
    pub kernel: usize,

    #[arg(long, default_value_t = 1)]
    pub stride: usize,

    #[arg(long, default_value_t = 1)]
    pub dilation: usize,

    /// Padding on every edge (defaults to kernel / 2).
    #[arg(long)]
    pub padding: Option<usize>,
}

impl ProblemArgs {
    pub fn shape(&self) -> ProblemShape {
        let shape = ProblemShape::conv2d(
            self.batch,
            self.in_channels,
            self.out_channels,
            self.height,
            self.width,
            self.kernel,
        )
        .with_stride(self.stride, self.stride)
        .with_dilation(self.dilation, self.dilation);
        match self.padding {
            Some(p) => shape.with_padding(Padding::uniform(p)),
            None => shape,
        }
    }
}

/// Engine settings that override the configuration file.
#[derive(Args, Debug, Clone, Default)]
pub struct OverrideArgs {
    /// Strategy code such as "a061", or "auto".
    #[arg(short, long)]
    pub mode: Option<String>,

    /// "winograd" or "direct".
    #[arg(long)]
    pub algorithm: Option<String>,

    #[arg(short, long)]
    pub threads: Option<usize>,

    #[arg(long)]
    pub teams: Option<usize>,

    /// Winograd tile edge, 4 to 7 (0 picks one).
    #[arg(long)]
    pub tile_edge: Option<usize>,

    /// Channel lanes per block: 4, 8 or 16.
    #[arg(long)]
    pub vector_width: Option<usize>,

    #[arg(long)]
    pub tile_block: Option<usize>,

    #[arg(long)]
    pub oc_partitions: Option<usize>,

    #[arg(long)]
    pub ic_partitions: Option<usize>,

    /// Scratch ceiling, e.g. "256M".
    #[arg(long)]
    pub scratch_budget: Option<String>,
}

/// Loads the configuration file (or defaults) and applies the overrides.
pub fn load_config(path: Option<&Path>, overrides: &OverrideArgs) -> anyhow::Result<EngineConfig> {
    let mut config = match path {
        Some(p) => EngineConfig::from_file(p)
            .map_err(|e| anyhow::anyhow!("failed to load config '{}': {e}", p.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(mode) = &overrides.mode {
        config.execution_mode = mode.clone();
    }
    if let Some(algorithm) = &overrides.algorithm {
        config.algorithm = match algorithm.as_str() {
            "winograd" => Algorithm::Winograd,
            "direct" => Algorithm::Direct,
            other => anyhow::bail!("unknown algorithm '{other}' (expected winograd or direct)"),
        };
    }
    let set = |field: &mut usize, value: Option<usize>| {
        if let Some(v) = value {
            *field = v;
        }
    };
    set(&mut config.threads, overrides.threads);
    set(&mut config.teams, overrides.teams);
    set(&mut config.tile_edge, overrides.tile_edge);
    set(&mut config.vector_width, overrides.vector_width);
    set(&mut config.tile_block, overrides.tile_block);
    set(&mut config.oc_partitions, overrides.oc_partitions);
    set(&mut config.ic_partitions, overrides.ic_partitions);
    if let Some(budget) = &overrides.scratch_budget {
        config.scratch_budget = Some(budget.clone());
    }
    Ok(config)
}

/// Deterministic pseudo-random values in `[-1, 1)`.
pub fn synthetic(len: usize, seed: u64) -> Vec<f32> {
    let mut state = seed ^ 0x9e37_79b9_7f4a_7c15;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 40) as f32 / (1u64 << 24) as f32 * 2.0 - 1.0
        })
        .collect()
}

/// Largest relative difference between two buffers.
pub fn max_relative_error(got: &[f32], expected: &[f32]) -> f32 {
    got.iter()
        .zip(expected)
        .map(|(a, b)| (a - b).abs() / (1.0 + b.abs()))
        .fold(0.0, f32::max)
}

pub fn banner(title: &str) {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║ {:<52} ║", title);
    println!("╚══════════════════════════════════════════════════════╝");
    println!();
}
