// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Scratch buffer plans.
//!
//! A [`BufferPlan`] lists the element count of every scratch buffer a
//! strategy needs. Sizes are closed-form in the block geometry:
//!
//! | strategy | transformed weights | transformed input | transformed output | partial output |
//! |---|---|---|---|---|
//! | a000 | A²·IC·OC | A²·IC·t | A²·OC·t | |
//! | a010 | A²·IC·OC | A²·(IC/ic4)·t | A²·OC·t | |
//! | a040 | A²·IC·OC | A²·IC·T·thr | A²·OC·T·thr | |
//! | a060 | A²·IC·OC | A²·IC·t | A²·(OC/oc4)·T·thr | |
//! | a061 | A²·IC·OC | A²·IC·T·thr | A²·(OC/oc4)·T·thr | |
//! | a072 | A²·IC·OC | A²·(IC/ic4)·T·thr | A²·OC·t | |
//! | a0e0 | A²·IC·OC | A²·IC·t | A·(OC/oc4)·T·thr | A·m·OC·t |
//! | a0e1 | A²·IC·OC | A·IC·T·thr | A·(OC/oc4)·T·thr | A·m·OC·t |
//! | a201 | A²·IC·OC | A²·IC·t·teams | A²·OC·t | |
//! | a241 | A²·IC·OC | A²·IC·T·thr | A²·(OC/teams)·T·thr | |
//! | a448 | A²·IC·OC·teams | A²·IC·T·thr | A²·OC·T·thr | |
//!
//! `thr` is the total worker count. Blocked copies of input, weights,
//! output and bias are added when the caller's layouts need repacking.

use crate::selector::ExecutionStrategy;
use crate::strategy::Pipeline;
use crate::PlannerError;
use conv_geometry::BlockGeometry;
use std::fmt;

/// Scratch buffers a pipeline can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferRole {
    TransformedWeights,
    TransformedInput,
    TransformedOutput,
    /// Row-fused accumulator holding one output-transform axis.
    PartialOutput,
    BlockedInput,
    BlockedWeights,
    BlockedOutput,
    BlockedBias,
}

impl BufferRole {
    pub fn as_str(self) -> &'static str {
        match self {
            BufferRole::TransformedWeights => "tweights",
            BufferRole::TransformedInput => "tinput",
            BufferRole::TransformedOutput => "toutput",
            BufferRole::PartialOutput => "toutputa",
            BufferRole::BlockedInput => "binput",
            BufferRole::BlockedWeights => "bweights",
            BufferRole::BlockedOutput => "boutput",
            BufferRole::BlockedBias => "bbias",
        }
    }
}

impl fmt::Display for BufferRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which caller tensors must be copied into blocked scratch buffers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize)]
pub struct RepackNeeds {
    pub input: bool,
    pub weights: bool,
    pub output: bool,
    pub bias: bool,
}

/// Estimated cache working sets, in elements, for diagnostics only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct WorkingSet {
    pub l1: usize,
    pub l2: usize,
}

/// Element counts for every scratch buffer of one strategy.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BufferPlan {
    pub strategy: String,
    pub buffers: Vec<(BufferRole, usize)>,
    pub working_set: WorkingSet,
}

impl BufferPlan {
    /// Sizes the buffers of a Winograd strategy.
    pub fn for_strategy(
        geom: &BlockGeometry,
        strategy: &ExecutionStrategy,
        repack: RepackNeeds,
    ) -> Result<Self, PlannerError> {
        let a = geom.tile_edge;
        let aa = a * a;
        let m = geom.out_tile;
        let ic = geom.padded_ic;
        let oc = geom.padded_oc;
        let t = geom.tiles;
        let tb = geom.tile_block;
        let thr = strategy.total_threads();
        let teams = strategy.teams();
        let oc4 = strategy.oc_partitions;
        let ic4 = strategy.ic_partitions;
        let tw = aa * ic * oc;

        // (tweights, tinput, toutput, toutputa)
        let (tweights, tinput, toutput, partial) = match strategy.pipeline {
            Pipeline::Flat => (tw, aa * ic * t, aa * oc * t, 0),
            Pipeline::FlatPerInputPartition => (tw, aa * (ic / ic4) * t, aa * oc * t, 0),
            Pipeline::TileFused => (tw, aa * ic * tb * thr, aa * oc * tb * thr, 0),
            Pipeline::TileOutputFused => (tw, aa * ic * t, aa * (oc / oc4) * tb * thr, 0),
            Pipeline::TileOutputFusedPrivateInput => {
                (tw, aa * ic * tb * thr, aa * (oc / oc4) * tb * thr, 0)
            }
            Pipeline::InputPartitionTileFused => (tw, aa * (ic / ic4) * tb * thr, aa * oc * t, 0),
            Pipeline::RowFused => (tw, aa * ic * t, a * (oc / oc4) * tb * thr, a * m * oc * t),
            Pipeline::RowFusedPrivateInput => (
                tw,
                a * ic * tb * thr,
                a * (oc / oc4) * tb * thr,
                a * m * oc * t,
            ),
            Pipeline::OutputChannelTeamsFlat => (tw, aa * ic * t * teams, aa * oc * t, 0),
            Pipeline::OutputChannelTeams => (tw, aa * ic * tb * thr, aa * (oc / teams) * tb * thr, 0),
            Pipeline::TileTeams => (tw * teams, aa * ic * tb * thr, aa * oc * tb * thr, 0),
            Pipeline::Direct => {
                return Err(PlannerError::InvalidPlan {
                    strategy: strategy.label(),
                    detail: "direct strategies have no transformed buffers".into(),
                })
            }
        };

        let mut buffers = vec![
            (BufferRole::TransformedWeights, tweights),
            (BufferRole::TransformedInput, tinput),
            (BufferRole::TransformedOutput, toutput),
        ];
        if partial > 0 {
            buffers.push((BufferRole::PartialOutput, partial));
        }
        push_repack(&mut buffers, geom, repack);

        let plan = Self {
            strategy: strategy.label(),
            buffers,
            working_set: working_set(geom, strategy, tweights),
        };
        plan.validate(geom, strategy)?;
        tracing::debug!(plan = %plan.summary(), "buffer plan");
        Ok(plan)
    }

    /// Buffers for the direct pipeline: only the blocked repack copies.
    pub fn direct(geom: &BlockGeometry, strategy: &ExecutionStrategy, repack: RepackNeeds) -> Self {
        let mut buffers = Vec::new();
        push_repack(&mut buffers, geom, repack);
        Self {
            strategy: strategy.label(),
            buffers,
            working_set: WorkingSet::default(),
        }
    }

    /// `(role, elements)` pairs for the scratch arena.
    pub fn requests(&self) -> &[(BufferRole, usize)] {
        &self.buffers
    }

    pub fn len_of(&self, role: BufferRole) -> usize {
        self.buffers
            .iter()
            .find(|(r, _)| *r == role)
            .map_or(0, |(_, n)| *n)
    }

    pub fn total_elements(&self) -> usize {
        self.buffers.iter().map(|(_, n)| n).sum()
    }

    pub fn total_bytes(&self, element_bytes: usize) -> usize {
        self.total_elements() * element_bytes
    }

    /// Checks that every per-worker and per-team buffer divides evenly.
    pub fn validate(
        &self,
        geom: &BlockGeometry,
        strategy: &ExecutionStrategy,
    ) -> Result<(), PlannerError> {
        let fail = |detail: String| PlannerError::InvalidPlan {
            strategy: self.strategy.clone(),
            detail,
        };
        let tw = self.len_of(BufferRole::TransformedWeights);
        let copies = weight_copies(strategy);
        let one_copy = geom.points() * geom.padded_ic * geom.padded_oc;
        if tw != one_copy * copies {
            return Err(fail(format!(
                "tweights holds {tw} elements, expected {copies} copies of {one_copy}"
            )));
        }
        for role in [BufferRole::TransformedInput, BufferRole::TransformedOutput] {
            let n = self.len_of(role);
            if n == 0 {
                return Err(fail(format!("{role} is empty")));
            }
            if n % strategy.total_threads() != 0 && n % geom.tiles != 0 {
                return Err(fail(format!(
                    "{role} ({n}) divides neither per worker nor per tile"
                )));
            }
        }
        Ok(())
    }

    pub fn summary(&self) -> String {
        let parts: Vec<String> = self
            .buffers
            .iter()
            .map(|(role, n)| format!("{role}={n}"))
            .collect();
        format!(
            "{}: {} | total {} elements | working set l1={} l2={}",
            self.strategy,
            parts.join(" "),
            self.total_elements(),
            self.working_set.l1,
            self.working_set.l2,
        )
    }
}

/// Copies of the transformed weights a strategy keeps.
pub fn weight_copies(strategy: &ExecutionStrategy) -> usize {
    match strategy.pipeline {
        Pipeline::TileTeams => strategy.teams(),
        _ => 1,
    }
}

fn push_repack(buffers: &mut Vec<(BufferRole, usize)>, geom: &BlockGeometry, repack: RepackNeeds) {
    if repack.input {
        buffers.push((BufferRole::BlockedInput, geom.blocked_input_len()));
    }
    if repack.weights {
        buffers.push((BufferRole::BlockedWeights, geom.blocked_weights_len()));
    }
    if repack.output {
        buffers.push((BufferRole::BlockedOutput, geom.blocked_output_len()));
    }
    if repack.bias {
        buffers.push((BufferRole::BlockedBias, geom.padded_oc));
    }
}

fn working_set(geom: &BlockGeometry, strategy: &ExecutionStrategy, tweights: usize) -> WorkingSet {
    let v = geom.vector_width;
    let a = geom.tile_edge;
    let aa = a * a;
    let ic = geom.padded_ic;
    let oc = geom.padded_oc;
    let tb = geom.tile_block;
    let oc4 = strategy.oc_partitions;
    let ic4 = strategy.ic_partitions;
    let oc3 = strategy.oc_blocks_per_partition.max(1);

    let l1 = v * v + tb * v * 2;
    let l2 = match strategy.pipeline {
        Pipeline::Flat | Pipeline::FlatPerInputPartition => ic * oc / oc3 + tb * (ic + oc / oc3),
        Pipeline::TileFused => tweights + aa * tb * (ic + oc),
        Pipeline::TileOutputFused
        | Pipeline::TileOutputFusedPrivateInput
        | Pipeline::OutputChannelTeams => tweights / oc4 + aa * tb * (ic + oc / oc4),
        Pipeline::InputPartitionTileFused => {
            tweights / ic4 / oc4 + aa * tb * (ic / ic4 + oc / oc4)
        }
        Pipeline::RowFused | Pipeline::RowFusedPrivateInput => {
            tweights / oc4 / a + a * tb * (ic + oc / oc4)
        }
        Pipeline::OutputChannelTeamsFlat => ic * oc / oc3 / oc4 + tb * (ic + oc / oc3 / oc4),
        Pipeline::TileTeams => tweights / strategy.teams() + aa * tb * (ic + oc),
        Pipeline::Direct => 0,
    };
    WorkingSet { l1, l2 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ExecutionHints, StrategyCode, StrategySelector};
    use conv_geometry::ProblemShape;

    fn setup(mode: u16, teams: usize, threads: usize) -> (BlockGeometry, ExecutionStrategy) {
        let shape = ProblemShape::conv2d(2, 8, 16, 9, 9, 3);
        let g = BlockGeometry::derive(&shape, 6, 4, 3).unwrap();
        let h = ExecutionHints {
            teams,
            threads,
            mode: Some(StrategyCode(mode)),
            oc_partitions: 2,
            ic_partitions: 2,
            ..ExecutionHints::default()
        };
        let s = StrategySelector::new(8).select(&g, &h).unwrap().strategy;
        (g, s)
    }

    #[test]
    fn test_flat_sizes() {
        let (g, s) = setup(0xa000, 1, 4);
        let p = BufferPlan::for_strategy(&g, &s, RepackNeeds::default()).unwrap();
        // A = 6, IC = 8, OC = 16, t = 2 * 3 * 3 = 18
        assert_eq!(p.len_of(BufferRole::TransformedWeights), 36 * 8 * 16);
        assert_eq!(p.len_of(BufferRole::TransformedInput), 36 * 8 * 18);
        assert_eq!(p.len_of(BufferRole::TransformedOutput), 36 * 16 * 18);
        assert_eq!(p.len_of(BufferRole::PartialOutput), 0);
    }

    #[test]
    fn test_per_thread_sizes() {
        let (g, s) = setup(0xa061, 1, 4);
        assert_eq!(s.oc_partitions, 2);
        let p = BufferPlan::for_strategy(&g, &s, RepackNeeds::default()).unwrap();
        assert_eq!(p.len_of(BufferRole::TransformedInput), 36 * 8 * 3 * 4);
        assert_eq!(p.len_of(BufferRole::TransformedOutput), 36 * 8 * 3 * 4);
    }

    #[test]
    fn test_row_fused_sizes() {
        let (g, s) = setup(0xa0e1, 1, 2);
        let p = BufferPlan::for_strategy(&g, &s, RepackNeeds::default()).unwrap();
        assert_eq!(p.len_of(BufferRole::TransformedInput), 6 * 8 * 3 * 2);
        assert_eq!(p.len_of(BufferRole::TransformedOutput), 6 * 8 * 3 * 2);
        assert_eq!(p.len_of(BufferRole::PartialOutput), 6 * 4 * 16 * 18);
    }

    #[test]
    fn test_team_sizes() {
        let (g, s) = setup(0xa448, 2, 2);
        let p = BufferPlan::for_strategy(&g, &s, RepackNeeds::default()).unwrap();
        assert_eq!(p.len_of(BufferRole::TransformedWeights), 2 * 36 * 8 * 16);
        assert_eq!(weight_copies(&s), 2);

        let (g, s) = setup(0xa241, 2, 2);
        let p = BufferPlan::for_strategy(&g, &s, RepackNeeds::default()).unwrap();
        assert_eq!(p.len_of(BufferRole::TransformedOutput), 36 * 8 * 3 * 4);

        let (g, s) = setup(0xa201, 2, 2);
        let p = BufferPlan::for_strategy(&g, &s, RepackNeeds::default()).unwrap();
        assert_eq!(p.len_of(BufferRole::TransformedInput), 36 * 8 * 18 * 2);
    }

    #[test]
    fn test_repack_buffers() {
        let (g, s) = setup(0xa040, 1, 1);
        let repack = RepackNeeds {
            input: true,
            weights: true,
            output: false,
            bias: true,
        };
        let p = BufferPlan::for_strategy(&g, &s, repack).unwrap();
        assert_eq!(p.len_of(BufferRole::BlockedInput), 2 * 8 * 81);
        assert_eq!(p.len_of(BufferRole::BlockedWeights), 16 * 8 * 9);
        assert_eq!(p.len_of(BufferRole::BlockedOutput), 0);
        assert_eq!(p.len_of(BufferRole::BlockedBias), 16);
        assert!(p.summary().contains("binput="));
    }

    #[test]
    fn test_direct_plan() {
        let shape = ProblemShape::conv2d(1, 3, 5, 6, 6, 3);
        let g = BlockGeometry::for_direct(&shape, 4, 1).unwrap();
        let s = StrategySelector::new(2)
            .select_direct(&g, &ExecutionHints::default())
            .strategy;
        let p = BufferPlan::direct(&g, &s, RepackNeeds { input: true, ..RepackNeeds::default() });
        assert_eq!(p.requests(), &[(BufferRole::BlockedInput, 4 * 36)]);
        assert!(BufferPlan::for_strategy(&g, &s, RepackNeeds::default()).is_err());
    }

    #[test]
    fn test_working_set_reported() {
        let (g, s) = setup(0xa040, 1, 1);
        let p = BufferPlan::for_strategy(&g, &s, RepackNeeds::default()).unwrap();
        assert!(p.working_set.l2 > p.len_of(BufferRole::TransformedWeights));
        assert_eq!(p.working_set.l1, 16 + 3 * 4 * 2);
    }
}
