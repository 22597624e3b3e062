// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Strategy selection.
//!
//! [`StrategySelector::select`] turns block geometry and caller hints into
//! one immutable [`ExecutionStrategy`]:
//!
//! ```text
//!  hints.teams / hints.threads ──► ThreadLayout   (oversubscribed? → 1 team, all threads)
//!  hints.mode (or auto)        ──► table lookup   (unknown → error, no pipeline → unimplemented)
//!  OC teaming, oc_blocks % teams ≠ 0            ──► a000 on 1 team   (recorded fallback)
//!  channel partitions                           ──► divisibility and remainder checks
//! ```
//!
//! Every fallback is returned alongside the strategy and logged at `warn`,
//! so two calls with the same inputs always report the same outcome.

use crate::strategy::{lookup, Duplication, Fusion, Pipeline, StrategyCode, StrategyKey, Teaming};
use crate::teams::{static_partition, ThreadLayout, MAX_THREAD_TEAMS};
use crate::PlannerError;
use conv_geometry::{BlockGeometry, ProblemShape};
use std::fmt;
use std::ops::Range;

/// `mac_per_read` above which the larger tile edge is preferred.
pub const MAC_PER_READ_LARGE_TILE_LIMIT: f64 = 25.0;

/// Caller preferences. Zero means "choose automatically" for the counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ExecutionHints {
    pub threads: usize,
    pub teams: usize,
    pub tile_edge: usize,
    pub tile_block: usize,
    /// A specific strategy, or `None` for automatic selection.
    pub mode: Option<StrategyCode>,
    pub oc_partitions: usize,
    pub ic_partitions: usize,
}

impl Default for ExecutionHints {
    fn default() -> Self {
        Self {
            threads: 0,
            teams: 0,
            tile_edge: 0,
            tile_block: 1,
            mode: None,
            oc_partitions: 1,
            ic_partitions: 1,
        }
    }
}

/// Why the selected strategy differs from the request.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FallbackReason {
    /// `teams × threads` exceeded the hardware or too many teams were asked for.
    ThreadOversubscription {
        teams: usize,
        threads: usize,
        hardware: usize,
    },
    /// Output-channel teaming needs the block count divisible by the team count.
    TeamDivisibility {
        requested: StrategyCode,
        oc_blocks: usize,
        teams: usize,
    },
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::ThreadOversubscription {
                teams,
                threads,
                hardware,
            } => write!(
                f,
                "{teams} teams x {threads} threads exceeds {hardware} hardware threads \
                 (or the {MAX_THREAD_TEAMS}-team limit); using 1 team of {hardware}"
            ),
            FallbackReason::TeamDivisibility {
                requested,
                oc_blocks,
                teams,
            } => write!(
                f,
                "{requested}: {oc_blocks} output-channel blocks not divisible by {teams} teams; \
                 using a000 on a single team"
            ),
        }
    }
}

/// The resolved, immutable execution strategy.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ExecutionStrategy {
    pub key: StrategyKey,
    pub code: StrategyCode,
    pub pipeline: Pipeline,
    pub layout: ThreadLayout,
    /// Output-channel partitions (`oc4`); equals the team count under OC teaming.
    pub oc_partitions: usize,
    /// Input-channel partitions (`ic4`).
    pub ic_partitions: usize,
    /// Output-channel blocks per partition (`oc3`).
    pub oc_blocks_per_partition: usize,
    /// Input-channel blocks per partition (`ic3`).
    pub ic_blocks_per_partition: usize,
    /// Tile-block ranges owned by each team (a single range without tile teaming).
    pub team_tile_ranges: Vec<Range<usize>>,
}

impl ExecutionStrategy {
    pub fn total_threads(&self) -> usize {
        self.layout.total_threads()
    }

    pub fn teams(&self) -> usize {
        self.layout.teams
    }

    /// Output-channel blocks of partition `p`.
    pub fn oc_partition(&self, p: usize) -> Range<usize> {
        let n = self.oc_blocks_per_partition;
        p * n..(p + 1) * n
    }

    /// Input-channel blocks of partition `p`.
    pub fn ic_partition(&self, p: usize) -> Range<usize> {
        let n = self.ic_blocks_per_partition;
        p * n..(p + 1) * n
    }

    /// Short label: the pipeline for direct, the code otherwise.
    pub fn label(&self) -> String {
        match self.pipeline {
            Pipeline::Direct => "direct".to_string(),
            _ => self.code.to_string(),
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} ({}) teams={} threads/team={} oc4={} (oc3={}) ic4={} (ic3={})",
            self.label(),
            self.pipeline,
            self.layout.teams,
            self.layout.threads_per_team,
            self.oc_partitions,
            self.oc_blocks_per_partition,
            self.ic_partitions,
            self.ic_blocks_per_partition,
        )
    }
}

/// A selected strategy plus any fallbacks applied on the way.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Selection {
    pub strategy: ExecutionStrategy,
    pub fallbacks: Vec<FallbackReason>,
}

impl Selection {
    pub fn fell_back(&self) -> bool {
        !self.fallbacks.is_empty()
    }
}

/// Chooses strategies for a fixed hardware thread count.
#[derive(Debug, Clone, Copy)]
pub struct StrategySelector {
    hardware_threads: usize,
}

impl StrategySelector {
    pub fn new(hardware_threads: usize) -> Self {
        Self {
            hardware_threads: hardware_threads.max(1),
        }
    }

    /// Uses the thread count reported by the OS.
    pub fn detect() -> Self {
        let hw = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::new(hw)
    }

    pub fn hardware_threads(&self) -> usize {
        self.hardware_threads
    }

    /// Picks the tile edge from the multiply-accumulate per reload ratio.
    ///
    /// `t = n·⌈oh/4⌉·⌈ow/4⌉`, `mac_per_read = t·OC / (t + OC)`; above
    /// [`MAC_PER_READ_LARGE_TILE_LIMIT`] the 6-wide tile wins, else 4.
    pub fn select_tile_edge(shape: &ProblemShape, vector_width: usize) -> usize {
        let t = (shape.batch * shape.out_height.div_ceil(4) * shape.out_width.div_ceil(4)) as f64;
        let oc = (shape.out_channels.div_ceil(vector_width.max(1)) * vector_width) as f64;
        let mac_per_read = t * oc / (t + oc);
        if mac_per_read > MAC_PER_READ_LARGE_TILE_LIMIT {
            6
        } else {
            4
        }
    }

    fn resolve_layout(&self, hints: &ExecutionHints) -> (ThreadLayout, Option<FallbackReason>) {
        let hw = self.hardware_threads;
        let teams = hints.teams.max(1);
        let threads = match hints.threads {
            0 => (hw / teams).max(1),
            n => n,
        };
        if teams > MAX_THREAD_TEAMS || teams * threads > hw {
            let reason = FallbackReason::ThreadOversubscription {
                teams,
                threads,
                hardware: hw,
            };
            tracing::warn!(%reason, "thread layout fallback");
            return (ThreadLayout::single(hw), Some(reason));
        }
        (
            ThreadLayout {
                teams,
                threads_per_team: threads,
            },
            None,
        )
    }

    /// Selects the strategy for a Winograd geometry.
    pub fn select(
        &self,
        geom: &BlockGeometry,
        hints: &ExecutionHints,
    ) -> Result<Selection, PlannerError> {
        let mut fallbacks = Vec::new();
        let (mut layout, thread_fallback) = self.resolve_layout(hints);
        fallbacks.extend(thread_fallback);

        let requested = hints.mode.unwrap_or(if layout.teams > 1 {
            StrategyCode(0xa241)
        } else {
            StrategyCode(0xa040)
        });
        let (mut key, mut pipeline) = lookup(requested)?;

        match key.teaming {
            Teaming::None => layout = ThreadLayout::single(layout.total_threads()),
            Teaming::OutputChannel if geom.oc_blocks % layout.teams != 0 => {
                let reason = FallbackReason::TeamDivisibility {
                    requested,
                    oc_blocks: geom.oc_blocks,
                    teams: layout.teams,
                };
                tracing::warn!(%reason, "strategy fallback");
                fallbacks.push(reason);
                key = StrategyKey::FLAT;
                pipeline = Pipeline::Flat;
                layout = ThreadLayout::single(layout.total_threads());
            }
            _ => {}
        }

        let oc_partitions = match key.teaming {
            Teaming::OutputChannel => layout.teams,
            _ if key.fusion.splits_output_channels() => hints.oc_partitions.max(1),
            _ => 1,
        };
        let ic_partitions = if key.fusion.splits_input_channels() {
            hints.ic_partitions.max(1)
        } else {
            1
        };
        check_partitions(geom, oc_partitions, ic_partitions)?;

        let tile_groups = geom.tile_groups;
        let team_tile_ranges = match key.teaming {
            Teaming::Tile => static_partition(tile_groups, layout.teams),
            _ => vec![0..tile_groups],
        };

        let strategy = ExecutionStrategy {
            key,
            code: key.code(),
            pipeline,
            layout,
            oc_partitions,
            ic_partitions,
            oc_blocks_per_partition: geom.oc_blocks / oc_partitions,
            ic_blocks_per_partition: geom.ic_blocks / ic_partitions,
            team_tile_ranges,
        };
        tracing::info!(
            strategy = %strategy.code,
            pipeline = %strategy.pipeline,
            teams = strategy.layout.teams,
            threads_per_team = strategy.layout.threads_per_team,
            fallbacks = fallbacks.len(),
            "execution strategy selected"
        );
        Ok(Selection {
            strategy,
            fallbacks,
        })
    }

    /// Selects the direct pipeline: a single team of all resolved threads.
    pub fn select_direct(&self, geom: &BlockGeometry, hints: &ExecutionHints) -> Selection {
        let (layout, fallback) = self.resolve_layout(hints);
        let key = StrategyKey::new(Teaming::None, Fusion::None, Duplication::None);
        let strategy = ExecutionStrategy {
            key,
            code: key.code(),
            pipeline: Pipeline::Direct,
            layout: ThreadLayout::single(layout.total_threads()),
            oc_partitions: 1,
            ic_partitions: 1,
            oc_blocks_per_partition: geom.oc_blocks,
            ic_blocks_per_partition: geom.ic_blocks,
            team_tile_ranges: vec![0..geom.tile_groups],
        };
        tracing::info!(threads = strategy.total_threads(), "direct strategy selected");
        Selection {
            strategy,
            fallbacks: fallback.into_iter().collect(),
        }
    }
}

fn check_partitions(
    geom: &BlockGeometry,
    oc_partitions: usize,
    ic_partitions: usize,
) -> Result<(), PlannerError> {
    if geom.oc_blocks % oc_partitions != 0 {
        return Err(PlannerError::PartitionMismatch {
            axis: "output",
            partitions: oc_partitions,
            blocks: geom.oc_blocks,
        });
    }
    if geom.ic_blocks % ic_partitions != 0 {
        return Err(PlannerError::PartitionMismatch {
            axis: "input",
            partitions: ic_partitions,
            blocks: geom.ic_blocks,
        });
    }
    if ic_partitions > 1 && geom.ic_remainder != geom.vector_width {
        return Err(PlannerError::RemainderUnsupported {
            axis: "input",
            partitions: ic_partitions,
            remainder: geom.ic_remainder,
            vector_width: geom.vector_width,
        });
    }
    if oc_partitions > 1 && geom.oc_remainder != geom.vector_width {
        return Err(PlannerError::RemainderUnsupported {
            axis: "output",
            partitions: oc_partitions,
            remainder: geom.oc_remainder,
            vector_width: geom.vector_width,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geom(ic: usize, oc: usize, v: usize) -> BlockGeometry {
        let shape = ProblemShape::conv2d(1, ic, oc, 8, 8, 3);
        BlockGeometry::derive(&shape, 4, v, 2).unwrap()
    }

    fn hints(mode: &str) -> ExecutionHints {
        ExecutionHints {
            mode: Some(mode.parse().unwrap()),
            ..ExecutionHints::default()
        }
    }

    #[test]
    fn test_auto_single_team_is_tile_fused() {
        let sel = StrategySelector::new(8)
            .select(&geom(16, 16, 16), &ExecutionHints::default())
            .unwrap();
        assert_eq!(sel.strategy.code, StrategyCode(0xa040));
        assert_eq!(sel.strategy.total_threads(), 8);
        assert!(!sel.fell_back());
    }

    #[test]
    fn test_auto_teams_is_oc_teams() {
        let h = ExecutionHints {
            teams: 2,
            threads: 2,
            ..ExecutionHints::default()
        };
        let sel = StrategySelector::new(8).select(&geom(4, 16, 4), &h).unwrap();
        assert_eq!(sel.strategy.pipeline, Pipeline::OutputChannelTeams);
        assert_eq!(sel.strategy.oc_partitions, 2);
        assert_eq!(sel.strategy.oc_blocks_per_partition, 2);
        assert_eq!(sel.strategy.layout.total_threads(), 4);
    }

    #[test]
    fn test_oversubscription_fallback() {
        let h = ExecutionHints {
            teams: 4,
            threads: 4,
            ..ExecutionHints::default()
        };
        let sel = StrategySelector::new(8).select(&geom(4, 4, 4), &h).unwrap();
        assert!(matches!(
            sel.fallbacks[0],
            FallbackReason::ThreadOversubscription { teams: 4, threads: 4, hardware: 8 }
        ));
        assert_eq!(sel.strategy.layout, ThreadLayout::single(8));
    }

    #[test]
    fn test_team_divisibility_fallback_is_deterministic() {
        let h = ExecutionHints {
            teams: 2,
            threads: 1,
            mode: Some(StrategyCode(0xa241)),
            ..ExecutionHints::default()
        };
        let g = geom(4, 12, 4); // 3 output blocks
        let selector = StrategySelector::new(4);
        let a = selector.select(&g, &h).unwrap();
        let b = selector.select(&g, &h).unwrap();
        assert_eq!(a.strategy, b.strategy);
        assert_eq!(a.strategy.code, StrategyCode(0xa000));
        assert_eq!(a.strategy.layout, ThreadLayout::single(2));
        assert_eq!(
            a.fallbacks,
            vec![FallbackReason::TeamDivisibility {
                requested: StrategyCode(0xa241),
                oc_blocks: 3,
                teams: 2
            }]
        );
    }

    #[test]
    fn test_unteamed_strategy_merges_teams() {
        let h = ExecutionHints {
            teams: 2,
            threads: 3,
            mode: Some(StrategyCode(0xa061)),
            ..ExecutionHints::default()
        };
        let sel = StrategySelector::new(8).select(&geom(4, 4, 4), &h).unwrap();
        assert_eq!(sel.strategy.layout, ThreadLayout::single(6));
    }

    #[test]
    fn test_tile_teams_split_groups() {
        let h = ExecutionHints {
            teams: 3,
            threads: 1,
            mode: Some(StrategyCode(0xa448)),
            ..ExecutionHints::default()
        };
        let g = geom(4, 4, 4); // 16 tiles, T = 2 → 8 groups
        let sel = StrategySelector::new(4).select(&g, &h).unwrap();
        assert_eq!(sel.strategy.team_tile_ranges, vec![0..3, 3..6, 6..8]);
    }

    #[test]
    fn test_partition_mismatch() {
        let h = ExecutionHints {
            oc_partitions: 3,
            ..hints("a061")
        };
        let err = StrategySelector::new(4).select(&geom(4, 8, 4), &h).unwrap_err();
        assert!(matches!(
            err,
            PlannerError::PartitionMismatch { axis: "output", partitions: 3, blocks: 2 }
        ));
    }

    #[test]
    fn test_partitions_ignored_without_fusion() {
        let h = ExecutionHints {
            oc_partitions: 3,
            ic_partitions: 5,
            ..hints("a040")
        };
        let sel = StrategySelector::new(4).select(&geom(4, 8, 4), &h).unwrap();
        assert_eq!((sel.strategy.oc_partitions, sel.strategy.ic_partitions), (1, 1));
    }

    #[test]
    fn test_input_remainder_with_partitions_fails() {
        let h = ExecutionHints {
            ic_partitions: 2,
            ..hints("a010")
        };
        let err = StrategySelector::new(4).select(&geom(5, 4, 4), &h).unwrap_err();
        assert!(matches!(
            err,
            PlannerError::RemainderUnsupported { axis: "input", remainder: 1, .. }
        ));
    }

    #[test]
    fn test_output_remainder_with_teams_fails() {
        let h = ExecutionHints {
            teams: 2,
            threads: 1,
            ..hints("a241")
        };
        let err = StrategySelector::new(4).select(&geom(4, 7, 4), &h).unwrap_err();
        assert!(matches!(
            err,
            PlannerError::RemainderUnsupported { axis: "output", remainder: 3, .. }
        ));
    }

    #[test]
    fn test_unimplemented_mode() {
        let err = StrategySelector::new(4)
            .select(&geom(4, 4, 4), &hints("a048"))
            .unwrap_err();
        assert!(matches!(err, PlannerError::Unimplemented { .. }));
    }

    #[test]
    fn test_tile_edge_heuristic() {
        let small = ProblemShape::conv2d(1, 16, 16, 8, 8, 3);
        assert_eq!(StrategySelector::select_tile_edge(&small, 16), 4);
        let large = ProblemShape::conv2d(8, 64, 256, 56, 56, 3);
        assert_eq!(StrategySelector::select_tile_edge(&large, 16), 6);
    }

    #[test]
    fn test_direct_selection() {
        let g = geom(4, 4, 4);
        let sel = StrategySelector::new(3).select_direct(&g, &ExecutionHints::default());
        assert_eq!(sel.strategy.pipeline, Pipeline::Direct);
        assert_eq!(sel.strategy.label(), "direct");
        assert_eq!(sel.strategy.total_threads(), 3);
    }
}
