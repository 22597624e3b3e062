// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # scratch-arena
//!
//! Scratch memory for the convolution pipelines, allocated once per
//! *generation* and reused until the generation changes.
//!
//! # Key Components
//!
//! - [`ScratchArena`]: owns one set of role-keyed buffers. A generation is
//!   identified by a caller-computed fingerprint (problem shape plus
//!   execution strategy). [`ScratchArena::ensure`] is a no-op when the
//!   fingerprint and the requested sizes are unchanged; otherwise the old
//!   set is released as a unit before the new one is allocated.
//! - [`AlignedBuffer`]: a zero-initialised buffer whose first element sits
//!   on a 64-byte cache-line boundary.
//! - [`ScratchBudget`]: an optional byte ceiling with human-readable
//!   parsing (`"256M"`, `"1G"`).
//! - [`ArenaStats`]: generation, reuse and allocation counters.
//!
//! # Lifecycle
//!
//! ```text
//! ensure(fp, requests)
//!       │
//!       ├── fp unchanged ─────────────► Reused     (no allocation)
//!       │
//!       └── fp changed / first call
//!              │ budget check
//!              ▼
//!          release old set ──► allocate new set ──► Rebuilt
//! ```
//!
//! # Example
//! ```
//! use scratch_arena::{ArenaOutcome, ScratchArena};
//!
//! let mut arena: ScratchArena<&'static str, f32> = ScratchArena::new(None);
//! let first = arena.ensure(7, &[("input", 256), ("output", 64)]).unwrap();
//! assert!(matches!(first, ArenaOutcome::Rebuilt { .. }));
//!
//! let again = arena.ensure(7, &[("input", 256), ("output", 64)]).unwrap();
//! assert_eq!(again, ArenaOutcome::Reused);
//! assert_eq!(arena.stats().allocations, 2);
//! ```

mod arena;
mod budget;
mod buffer;
mod error;
mod stats;

pub use arena::{ArenaOutcome, ArenaSlices, ScratchArena};
pub use budget::ScratchBudget;
pub use buffer::{AlignedBuffer, CACHE_LINE};
pub use error::ArenaError;
pub use stats::ArenaStats;
