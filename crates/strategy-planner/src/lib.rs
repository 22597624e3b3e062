// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # strategy-planner
//!
//! Decides *how* a convolution runs: which loop fusion and thread teaming
//! to use, how many workers, and how large each scratch buffer must be.
//!
//! # Strategies
//!
//! A strategy is a 16-bit code `0xa000 | teaming << 8 | fusion << 4 | duplication`.
//!
//! | Code | Pipeline | Notes |
//! |---|---|---|
//! | a000 | flat | each stage sweeps all tiles |
//! | a010 | flat, per input partition | accumulates over `ic4` partitions |
//! | a040 | tile fused | default for a single team |
//! | a060 / a061 | tile + output fused | `oc4` partitions, shared / private input |
//! | a072 | input + tile + output fused | `ic4` partitions, shared output |
//! | a0e0 / a0e1 | row fused | output transform split in two passes |
//! | a201 | output-channel teams, flat | private input per team |
//! | a241 | output-channel teams, tile fused | default for several teams |
//! | a448 | tile teams | transformed weights copied per team |
//!
//! `a020`, `a021`, `a048` and `a069` are legal codes without a pipeline and
//! are rejected as unimplemented.
//!
//! # Example
//! ```
//! use conv_geometry::{BlockGeometry, ProblemShape};
//! use strategy_planner::{BufferPlan, ExecutionHints, RepackNeeds, StrategySelector};
//!
//! let shape = ProblemShape::conv2d(1, 16, 32, 14, 14, 3);
//! let geom = BlockGeometry::derive(&shape, 4, 16, 4).unwrap();
//! let sel = StrategySelector::new(4).select(&geom, &ExecutionHints::default()).unwrap();
//! assert_eq!(sel.strategy.code.to_string(), "a040");
//!
//! let plan = BufferPlan::for_strategy(&geom, &sel.strategy, RepackNeeds::default()).unwrap();
//! println!("{}", plan.summary());
//! ```

mod error;
pub mod plan;
pub mod selector;
pub mod strategy;
pub mod teams;

pub use error::PlannerError;
pub use plan::{weight_copies, BufferPlan, BufferRole, RepackNeeds, WorkingSet};
pub use selector::{
    ExecutionHints, ExecutionStrategy, FallbackReason, Selection, StrategySelector,
    MAC_PER_READ_LARGE_TILE_LIMIT,
};
pub use strategy::{
    lookup, Duplication, Fusion, Pipeline, StrategyCode, StrategyEntry, StrategyKey, Teaming,
    STRATEGY_TABLE,
};
pub use teams::{static_partition, ThreadLayout, MAX_THREAD_TEAMS};
