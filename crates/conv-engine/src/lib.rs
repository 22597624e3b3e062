// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # conv-engine
//!
//! Multi-threaded 2-D convolution engine built on the Winograd transform,
//! with a direct fallback for shapes the transform cannot handle.
//!
//! The engine takes:
//! - A [`ProblemShape`](conv_geometry::ProblemShape) and an [`EngineConfig`].
//! - Geometry and layouts from `conv-geometry`.
//! - An execution strategy and buffer plan from `strategy-planner`.
//! - Transform kernels from `wino-kernels`.
//! - Scratch memory from `scratch-arena`.
//!
//! It binds them once, then executes any number of runs without
//! allocating, reusing the transformed weights while the caller's weights
//! buffer stays the same.
//!
//! # Type-State Lifecycle
//! ```text
//! ConvEngine<Idle> → ConvEngine<Planned<T>> → ConvEngine<Ready<T>> → ConvEngine<Idle>
//! ```
//! Transitions are compile-time checked.
//!
//! # Threading
//! Each ready engine owns a `rayon` thread pool sized by the strategy's
//! thread layout. Work inside a stage is split statically, so a given
//! configuration always assigns the same tiles to the same worker slot.

mod config;
mod direct;
mod engine;
mod error;
mod metrics;
mod pipeline;
mod plan;

pub use config::{Algorithm, EngineConfig};
pub use engine::{ConvEngine, EngineState, Idle, PipelineState, Planned, Ready};
pub use error::ConvError;
pub use metrics::{EngineMetrics, RunMetrics};
pub use plan::{ConvPlan, WINOGRAD_KERNEL};
