// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Static work partitioning.
//!
//! Work is never stolen or queued: every loop is cut into contiguous ranges
//! up front, one per thread (or per team), and each range is owned by
//! exactly one worker for the whole stage.

use std::ops::Range;

/// Upper bound on the number of thread teams.
pub const MAX_THREAD_TEAMS: usize = 16;

/// Splits `tasks` into `parts` contiguous ranges whose lengths differ by at
/// most one. The first `tasks % parts` ranges get the extra task. Ranges
/// may be empty when `parts > tasks`.
///
/// # Examples
/// ```
/// use strategy_planner::static_partition;
///
/// assert_eq!(static_partition(10, 3), vec![0..4, 4..7, 7..10]);
/// assert_eq!(static_partition(2, 3), vec![0..1, 1..2, 2..2]);
/// ```
pub fn static_partition(tasks: usize, parts: usize) -> Vec<Range<usize>> {
    let parts = parts.max(1);
    let base = tasks / parts;
    let rem = tasks % parts;
    let mut start = 0;
    (0..parts)
        .map(|p| {
            let len = base + usize::from(p < rem);
            let range = start..start + len;
            start += len;
            range
        })
        .collect()
}

/// Thread and team counts after resolving hints against the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ThreadLayout {
    pub teams: usize,
    pub threads_per_team: usize,
}

impl ThreadLayout {
    pub fn single(threads: usize) -> Self {
        Self {
            teams: 1,
            threads_per_team: threads.max(1),
        }
    }

    /// Total worker threads across all teams.
    pub fn total_threads(&self) -> usize {
        self.teams * self.threads_per_team
    }

    /// Team owning worker `slot`.
    #[inline]
    pub fn team_of(&self, slot: usize) -> usize {
        slot / self.threads_per_team
    }

    /// Index of worker `slot` within its team.
    #[inline]
    pub fn rank_in_team(&self, slot: usize) -> usize {
        slot % self.threads_per_team
    }
}
