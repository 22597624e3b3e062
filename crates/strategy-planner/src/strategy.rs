// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The enumerated strategy space.
//!
//! A strategy is a point on three independent axes:
//!
//! | axis | values |
//! |---|---|
//! | [`Teaming`] | none, by tile, by output channel |
//! | [`Fusion`] | which loops (input channel, tile, output channel, transform row) run fused |
//! | [`Duplication`] | which buffer is replicated per team or thread |
//!
//! Only the combinations listed in [`STRATEGY_TABLE`] are legal. Each legal
//! entry names the [`Pipeline`] that executes it, or `None` when the
//! combination is recognised but has no implementation.
//!
//! Strategies also have a short hexadecimal code (`a061`, `a241`, ...)
//! composed from the axes, used in configuration files and on the CLI.

use crate::PlannerError;
use std::fmt;
use std::str::FromStr;

/// How threads are grouped into teams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Teaming {
    None,
    /// Teams own disjoint ranges of tile blocks.
    Tile,
    /// Teams own disjoint ranges of output-channel blocks.
    OutputChannel,
}

/// Which loops of the transform / multiply / transform pipeline are fused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fusion {
    /// Three full-tensor passes.
    None,
    /// Full-tensor passes repeated per input-channel partition.
    InputChannel,
    /// Output-channel partitions only.
    Output,
    /// Per tile block.
    Tile,
    /// Per tile block and output-channel partition.
    TileOutput,
    /// Per input-channel partition, tile block and output-channel partition.
    InputTileOutput,
    /// Per tile block, output-channel partition and transform row.
    TileOutputRow,
}

/// Which buffer is replicated to avoid sharing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Duplication {
    None,
    /// Transformed input is private per thread or team.
    Input,
    /// Transformed output is accumulated in a full-size buffer.
    Output,
    /// Transformed weights are copied per team.
    Weights,
    /// Both input and weights.
    InputWeights,
}

impl Teaming {
    fn bits(self) -> u16 {
        match self {
            Teaming::None => 0x0,
            Teaming::OutputChannel => 0x2,
            Teaming::Tile => 0x4,
        }
    }

    fn from_bits(bits: u16) -> Option<Self> {
        match bits {
            0x0 => Some(Teaming::None),
            0x2 => Some(Teaming::OutputChannel),
            0x4 => Some(Teaming::Tile),
            _ => None,
        }
    }
}

impl Fusion {
    fn bits(self) -> u16 {
        match self {
            Fusion::None => 0x0,
            Fusion::InputChannel => 0x1,
            Fusion::Output => 0x2,
            Fusion::Tile => 0x4,
            Fusion::TileOutput => 0x6,
            Fusion::InputTileOutput => 0x7,
            Fusion::TileOutputRow => 0xe,
        }
    }

    fn from_bits(bits: u16) -> Option<Self> {
        match bits {
            0x0 => Some(Fusion::None),
            0x1 => Some(Fusion::InputChannel),
            0x2 => Some(Fusion::Output),
            0x4 => Some(Fusion::Tile),
            0x6 => Some(Fusion::TileOutput),
            0x7 => Some(Fusion::InputTileOutput),
            0xe => Some(Fusion::TileOutputRow),
            _ => None,
        }
    }

    /// Loops over input-channel partitions.
    pub fn splits_input_channels(self) -> bool {
        self.bits() & 0x1 != 0
    }

    /// Loops over output-channel partitions.
    pub fn splits_output_channels(self) -> bool {
        self.bits() & 0x2 != 0
    }
}

impl Duplication {
    fn bits(self) -> u16 {
        match self {
            Duplication::None => 0x0,
            Duplication::Input => 0x1,
            Duplication::Output => 0x2,
            Duplication::Weights => 0x8,
            Duplication::InputWeights => 0x9,
        }
    }

    fn from_bits(bits: u16) -> Option<Self> {
        match bits {
            0x0 => Some(Duplication::None),
            0x1 => Some(Duplication::Input),
            0x2 => Some(Duplication::Output),
            0x8 => Some(Duplication::Weights),
            0x9 => Some(Duplication::InputWeights),
            _ => None,
        }
    }
}

/// A point in the three-axis strategy space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct StrategyKey {
    pub teaming: Teaming,
    pub fusion: Fusion,
    pub duplication: Duplication,
}

impl StrategyKey {
    pub const fn new(teaming: Teaming, fusion: Fusion, duplication: Duplication) -> Self {
        Self {
            teaming,
            fusion,
            duplication,
        }
    }

    /// Single team, three unfused passes, nothing duplicated.
    pub const FLAT: StrategyKey = StrategyKey::new(Teaming::None, Fusion::None, Duplication::None);

    pub fn code(&self) -> StrategyCode {
        StrategyCode(
            0xa000 | self.teaming.bits() << 8 | self.fusion.bits() << 4 | self.duplication.bits(),
        )
    }
}

/// Compact hexadecimal form of a [`StrategyKey`], e.g. `a061`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrategyCode(pub u16);

impl StrategyCode {
    /// Decomposes the code into its three axes.
    pub fn key(self) -> Option<StrategyKey> {
        if self.0 & 0xf000 != 0xa000 {
            return None;
        }
        Some(StrategyKey {
            teaming: Teaming::from_bits((self.0 >> 8) & 0xf)?,
            fusion: Fusion::from_bits((self.0 >> 4) & 0xf)?,
            duplication: Duplication::from_bits(self.0 & 0xf)?,
        })
    }
}

impl fmt::Display for StrategyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}", self.0)
    }
}

impl FromStr for StrategyCode {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if digits.len() != 4 {
            return Err(PlannerError::UnknownStrategy(s.to_string()));
        }
        u16::from_str_radix(digits, 16)
            .map(StrategyCode)
            .map_err(|_| PlannerError::UnknownStrategy(s.to_string()))
    }
}

impl serde::Serialize for StrategyCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for StrategyCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The loop nest that executes a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Pipeline {
    /// Three full-tensor passes separated by barriers.
    Flat,
    /// [`Pipeline::Flat`] repeated per input-channel partition, accumulating.
    FlatPerInputPartition,
    /// Transform, multiply and transform back one tile block at a time.
    TileFused,
    /// Shared full-tensor input transform, then per (tile block, output partition).
    TileOutputFused,
    /// Per (tile block, output partition) with a private input transform.
    TileOutputFusedPrivateInput,
    /// Shared input transform, then per transform row with an assembly pass.
    RowFused,
    /// Per transform row with a private, row-sized input transform.
    RowFusedPrivateInput,
    /// Per input partition, tile-fused, into a full-size output accumulator.
    InputPartitionTileFused,
    /// Teams own tile ranges and private weight copies.
    TileTeams,
    /// Teams own output-channel ranges, tile-fused with private input.
    OutputChannelTeams,
    /// Teams own output-channel ranges, flat with a per-team input copy.
    OutputChannelTeamsFlat,
    /// Direct (untransformed) convolution.
    Direct,
}

impl Pipeline {
    pub fn as_str(self) -> &'static str {
        match self {
            Pipeline::Flat => "flat",
            Pipeline::FlatPerInputPartition => "flat-ic-partitioned",
            Pipeline::TileFused => "tile-fused",
            Pipeline::TileOutputFused => "tile-output-fused",
            Pipeline::TileOutputFusedPrivateInput => "tile-output-fused-private-input",
            Pipeline::RowFused => "row-fused",
            Pipeline::RowFusedPrivateInput => "row-fused-private-input",
            Pipeline::InputPartitionTileFused => "ic-partition-tile-fused",
            Pipeline::TileTeams => "tile-teams",
            Pipeline::OutputChannelTeams => "oc-teams",
            Pipeline::OutputChannelTeamsFlat => "oc-teams-flat",
            Pipeline::Direct => "direct",
        }
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One legal entry of the strategy table.
#[derive(Debug, Clone, Copy)]
pub struct StrategyEntry {
    pub key: StrategyKey,
    pub pipeline: Option<Pipeline>,
}

const fn entry(
    teaming: Teaming,
    fusion: Fusion,
    duplication: Duplication,
    pipeline: Option<Pipeline>,
) -> StrategyEntry {
    StrategyEntry {
        key: StrategyKey::new(teaming, fusion, duplication),
        pipeline,
    }
}

/// Every legal strategy.
pub const STRATEGY_TABLE: &[StrategyEntry] = &[
    // a000
    entry(Teaming::None, Fusion::None, Duplication::None, Some(Pipeline::Flat)),
    // a010
    entry(Teaming::None, Fusion::InputChannel, Duplication::None, Some(Pipeline::FlatPerInputPartition)),
    // a020, a021
    entry(Teaming::None, Fusion::Output, Duplication::None, None),
    entry(Teaming::None, Fusion::Output, Duplication::Input, None),
    // a040, a048
    entry(Teaming::None, Fusion::Tile, Duplication::None, Some(Pipeline::TileFused)),
    entry(Teaming::None, Fusion::Tile, Duplication::Weights, None),
    // a060, a061, a069
    entry(Teaming::None, Fusion::TileOutput, Duplication::None, Some(Pipeline::TileOutputFused)),
    entry(Teaming::None, Fusion::TileOutput, Duplication::Input, Some(Pipeline::TileOutputFusedPrivateInput)),
    entry(Teaming::None, Fusion::TileOutput, Duplication::InputWeights, None),
    // a072
    entry(Teaming::None, Fusion::InputTileOutput, Duplication::Output, Some(Pipeline::InputPartitionTileFused)),
    // a0e0, a0e1
    entry(Teaming::None, Fusion::TileOutputRow, Duplication::None, Some(Pipeline::RowFused)),
    entry(Teaming::None, Fusion::TileOutputRow, Duplication::Input, Some(Pipeline::RowFusedPrivateInput)),
    // a201, a241
    entry(Teaming::OutputChannel, Fusion::None, Duplication::Input, Some(Pipeline::OutputChannelTeamsFlat)),
    entry(Teaming::OutputChannel, Fusion::Tile, Duplication::Input, Some(Pipeline::OutputChannelTeams)),
    // a448
    entry(Teaming::Tile, Fusion::Tile, Duplication::Weights, Some(Pipeline::TileTeams)),
];

/// Looks up a strategy code in the table.
///
/// Codes outside the table are configuration errors; table entries without
/// a pipeline are reported as unimplemented.
pub fn lookup(code: StrategyCode) -> Result<(StrategyKey, Pipeline), PlannerError> {
    let key = code
        .key()
        .ok_or_else(|| PlannerError::UnknownStrategy(code.to_string()))?;
    let entry = STRATEGY_TABLE
        .iter()
        .find(|e| e.key == key)
        .ok_or_else(|| PlannerError::UnknownStrategy(code.to_string()))?;
    let pipeline = entry.pipeline.ok_or_else(|| PlannerError::Unimplemented {
        code: code.to_string(),
        detail: format!(
            "no pipeline for teaming {:?}, fusion {:?}, duplication {:?}",
            key.teaming, key.fusion, key.duplication
        ),
    })?;
    Ok((key, pipeline))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip_through_keys() {
        for entry in STRATEGY_TABLE {
            let code = entry.key.code();
            assert_eq!(code.key(), Some(entry.key));
        }
    }

    #[test]
    fn test_known_codes() {
        let cases = [
            ("a000", Pipeline::Flat),
            ("a010", Pipeline::FlatPerInputPartition),
            ("a040", Pipeline::TileFused),
            ("a060", Pipeline::TileOutputFused),
            ("a061", Pipeline::TileOutputFusedPrivateInput),
            ("a072", Pipeline::InputPartitionTileFused),
            ("a0e0", Pipeline::RowFused),
            ("a0e1", Pipeline::RowFusedPrivateInput),
            ("a201", Pipeline::OutputChannelTeamsFlat),
            ("a241", Pipeline::OutputChannelTeams),
            ("a448", Pipeline::TileTeams),
        ];
        for (text, pipeline) in cases {
            let code: StrategyCode = text.parse().unwrap();
            assert_eq!(code.to_string(), text);
            assert_eq!(lookup(code).unwrap().1, pipeline, "{text}");
        }
    }

    #[test]
    fn test_unimplemented_entries() {
        for text in ["a048", "a069", "a020", "a021"] {
            let code: StrategyCode = text.parse().unwrap();
            assert!(
                matches!(lookup(code), Err(PlannerError::Unimplemented { .. })),
                "{text}"
            );
        }
    }

    #[test]
    fn test_unknown_codes() {
        for text in ["a444", "b000", "a0f0", "0xa00"] {
            let parsed = text.parse::<StrategyCode>();
            let result = parsed.and_then(lookup);
            assert!(matches!(result, Err(PlannerError::UnknownStrategy(_))), "{text}");
        }
        assert!("zzzz".parse::<StrategyCode>().is_err());
    }

    #[test]
    fn test_hex_prefix() {
        let code: StrategyCode = "0xA241".parse().unwrap();
        assert_eq!(code, StrategyCode(0xa241));
    }

    #[test]
    fn test_fusion_axes() {
        assert!(Fusion::InputTileOutput.splits_input_channels());
        assert!(Fusion::InputTileOutput.splits_output_channels());
        assert!(Fusion::TileOutputRow.splits_output_channels());
        assert!(!Fusion::TileOutputRow.splits_input_channels());
        assert!(!Fusion::Tile.splits_output_channels());
    }

    #[test]
    fn test_code_serde() {
        let json = serde_json::to_string(&StrategyCode(0xa0e1)).unwrap();
        assert_eq!(json, "\"a0e1\"");
        let back: StrategyCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, StrategyCode(0xa0e1));
    }
}
