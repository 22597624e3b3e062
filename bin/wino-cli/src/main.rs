// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # wino
//!
//! Command-line interface for the Winograd convolution engine.
//!
//! ## Usage
//! ```bash
//! # Run a synthetic 64-channel 56x56 problem ten times and verify it
//! wino run --in-channels 64 --out-channels 64 --height 56 --width 56 --runs 10 --verify
//!
//! # Show what the selector picks for two teams
//! wino plan --in-channels 64 --out-channels 128 --teams 2 --json
//!
//! # Compare strategies on one problem
//! wino bench --in-channels 64 --out-channels 64 --modes a000,a040,a061,a0e1
//! ```

mod commands;

use clap::{Parser, Subcommand};
use commands::{OverrideArgs, ProblemArgs};

#[derive(Parser)]
#[command(
    name = "wino",
    about = "Multi-threaded Winograd convolution engine",
    version,
    author
)]
struct Cli {
    /// Path to a TOML engine configuration (command-line overrides win).
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine on a synthetic problem and print metrics.
    Run {
        #[command(flatten)]
        problem: ProblemArgs,

        #[command(flatten)]
        overrides: OverrideArgs,

        /// Number of runs after the first.
        #[arg(short, long, default_value_t = 10)]
        runs: usize,

        /// Check the output against the reference sliding-window convolution.
        #[arg(long)]
        verify: bool,
    },

    /// Print geometry, selected strategy and buffer plan without running.
    Plan {
        #[command(flatten)]
        problem: ProblemArgs,

        #[command(flatten)]
        overrides: OverrideArgs,

        /// Emit the plan as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Sweep strategy codes over one problem and print a comparison table.
    Bench {
        #[command(flatten)]
        problem: ProblemArgs,

        #[command(flatten)]
        overrides: OverrideArgs,

        /// Comma-separated strategy codes to sweep.
        #[arg(long, default_value = "a000,a010,a040,a060,a061,a072,a0e0,a0e1,a201,a241,a448")]
        modes: String,

        /// Timed runs per strategy.
        #[arg(short, long, default_value_t = 5)]
        runs: usize,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    commands::init_tracing(cli.verbose);

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Run {
            problem,
            overrides,
            runs,
            verify,
        } => commands::run::execute(config, problem, overrides, runs, verify),
        Commands::Plan {
            problem,
            overrides,
            json,
        } => commands::plan::execute(config, problem, overrides, json),
        Commands::Bench {
            problem,
            overrides,
            modes,
            runs,
        } => commands::bench::execute(config, problem, overrides, modes, runs),
    }
}
