// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Pipeline driver: executes one strategy over the arena buffers.
//!
//! Every pipeline is a sequence of parallel stages on the engine's thread
//! pool. A stage hands each worker slot an explicit list of work items
//! (or a private scratch slice plus the items it owns) and returns once all
//! slots are done, which is the barrier between stages. Work is assigned
//! with [`static_partition`], so the split is the same on every run.

mod flat;
mod fused;
mod row;
mod sink;
mod stages;

pub(crate) use sink::OutputSink;
pub(crate) use stages::{transform_weights, Context};

use crate::ConvError;
use conv_geometry::Element;
use rayon::prelude::*;
use stages::{split_groups, TILE_SCRATCH};
use std::ops::Range;
use strategy_planner::{static_partition, ExecutionStrategy, Pipeline, Teaming, ThreadLayout};

/// Mutable scratch for one run. `partial` is empty unless the strategy is
/// row-fused.
pub(crate) struct Scratch<'a, T> {
    pub tinput: &'a mut [T],
    pub toutput: &'a mut [T],
    pub partial: &'a mut [T],
}

/// Runs the compute stages of a Winograd strategy.
pub(crate) fn execute<T: Element>(
    ctx: &Context<'_, T>,
    scratch: Scratch<'_, T>,
    sink: &OutputSink<'_, T>,
) -> Result<(), ConvError> {
    match ctx.strategy.pipeline {
        Pipeline::Flat | Pipeline::FlatPerInputPartition | Pipeline::OutputChannelTeamsFlat => {
            flat::run(ctx, scratch, sink)
        }
        Pipeline::TileFused
        | Pipeline::TileOutputFusedPrivateInput
        | Pipeline::TileTeams
        | Pipeline::OutputChannelTeams => fused::private_input(ctx, scratch, sink),
        Pipeline::TileOutputFused => fused::shared_input(ctx, scratch, sink),
        Pipeline::InputPartitionTileFused => fused::input_partitioned(ctx, scratch, sink),
        Pipeline::RowFused => row::shared_input(ctx, scratch, sink),
        Pipeline::RowFusedPrivateInput => row::private_input(ctx, scratch, sink),
        Pipeline::Direct => {
            return Err(ConvError::Configuration(
                "direct strategy has no transformed pipeline".into(),
            ))
        }
    }
    Ok(())
}

/// Splits `items` into `slots` contiguous runs.
pub(crate) fn distribute<I>(items: Vec<I>, slots: usize) -> Vec<Vec<I>> {
    let ranges = static_partition(items.len(), slots);
    let mut items = items.into_iter();
    ranges
        .into_iter()
        .map(|r| items.by_ref().take(r.len()).collect())
        .collect()
}

/// Distributes each team's items over that team's threads; the result is
/// indexed by worker slot.
pub(crate) fn distribute_teams<I>(per_team: Vec<Vec<I>>, layout: ThreadLayout) -> Vec<Vec<I>> {
    per_team
        .into_iter()
        .flat_map(|items| distribute(items, layout.threads_per_team))
        .collect()
}

/// Tile blocks owned by worker `slot`: its team's tile range (all blocks
/// unless the strategy teams along tiles), split over the team's threads.
pub(crate) fn slot_groups(s: &ExecutionStrategy, slot: usize, groups: usize) -> Range<usize> {
    let layout = s.layout;
    let (team, rank) = (layout.team_of(slot), layout.rank_in_team(slot));
    let span = match s.key.teaming {
        Teaming::Tile => s.team_tile_ranges.get(team).cloned().unwrap_or(0..0),
        _ => 0..groups,
    };
    let mine = static_partition(span.len(), layout.threads_per_team)
        .get(rank)
        .cloned()
        .unwrap_or(0..0);
    span.start + mine.start..span.start + mine.end
}

/// Full input transform into `tinput` (`[group][ic/V][pt][Tz][V]`), split
/// over `slots` workers by (tile block, input block).
pub(crate) fn input_pass<T: Element>(ctx: &Context<'_, T>, tinput: &mut [T], slots: usize) {
    let geom = ctx.geom;
    let per_tile = geom.points() * geom.padded_ic;
    let mut items = Vec::new();
    for (g, block) in split_groups(tinput, geom, per_tile).into_iter().enumerate() {
        let len = ctx.block_len(geom.tile_block_len(g));
        for (ib, chunk) in block.chunks_mut(len).enumerate() {
            items.push((g, ib, chunk));
        }
    }
    distribute(items, slots).into_par_iter().for_each(|items| {
        let mut staging = [T::zero(); TILE_SCRATCH];
        for (g, ib, dst) in items {
            ctx.input_block(g, ib, dst, &mut staging);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distribute_is_contiguous() {
        let parts = distribute((0..7).collect(), 3);
        assert_eq!(parts, vec![vec![0, 1, 2], vec![3, 4], vec![5, 6]]);
        let parts = distribute(vec!['a'], 3);
        assert_eq!(parts, vec![vec!['a'], vec![], vec![]]);
    }

    #[test]
    fn test_distribute_teams_by_slot() {
        let layout = ThreadLayout {
            teams: 2,
            threads_per_team: 2,
        };
        let slots = distribute_teams(vec![vec![1, 2, 3], vec![10]], layout);
        assert_eq!(slots, vec![vec![1, 2], vec![3], vec![10], vec![]]);
    }
}
