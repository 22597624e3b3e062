// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for strategy selection and buffer planning.

/// Errors that can occur while choosing a strategy or sizing its buffers.
#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    /// The requested code is not an entry of the strategy table.
    #[error("unknown execution strategy '{0}'")]
    UnknownStrategy(String),

    /// The strategy is a legal table entry but has no pipeline.
    #[error("execution strategy {code} is not implemented: {detail}")]
    Unimplemented { code: String, detail: String },

    /// A channel partition count does not divide the channel block count.
    #[error("{axis} partitions ({partitions}) must divide the {axis} channel block count ({blocks})")]
    PartitionMismatch {
        axis: &'static str,
        partitions: usize,
        blocks: usize,
    },

    /// Partitioning a channel axis whose last block is narrower than a vector.
    #[error(
        "{axis} channels are not a multiple of the vector width {vector_width} \
         (last block has {remainder} lanes) and cannot be split into {partitions} partitions"
    )]
    RemainderUnsupported {
        axis: &'static str,
        partitions: usize,
        remainder: usize,
        vector_width: usize,
    },

    /// A thread or partition count is zero or otherwise unusable.
    #[error("invalid hint {name} = {value}: {detail}")]
    InvalidHint {
        name: &'static str,
        value: usize,
        detail: String,
    },

    /// A buffer plan failed its internal consistency check.
    #[error("inconsistent buffer plan for {strategy}: {detail}")]
    InvalidPlan { strategy: String, detail: String },
}
