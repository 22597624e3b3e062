// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for scratch allocation.

/// Errors that can occur while building a scratch generation.
#[derive(Debug, thiserror::Error)]
pub enum ArenaError {
    /// The requested generation does not fit in the scratch budget.
    #[error("scratch plan needs {requested_bytes} bytes, budget is {budget_bytes}")]
    OverBudget {
        requested_bytes: usize,
        budget_bytes: usize,
    },

    /// A budget string could not be parsed.
    #[error("invalid scratch budget '{0}': expected a number followed by an optional suffix (K, M, G)")]
    InvalidBudget(String),

    /// The same buffer role was requested twice in one generation.
    #[error("buffer role {0} requested more than once")]
    DuplicateRole(String),

    /// The byte size of a request overflows `usize`.
    #[error("scratch request for {role} overflows: {elements} elements")]
    SizeOverflow { role: String, elements: usize },
}
