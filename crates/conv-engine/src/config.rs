// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Engine configuration loaded from TOML files or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! algorithm = "winograd"
//! tile_edge = 0            # 0 = choose from the problem
//! vector_width = 16
//! tile_block = 8
//! threads = 0              # 0 = hardware threads / teams
//! teams = 1
//! execution_mode = "a061"  # or "auto"
//! oc_partitions = 2
//! inference_accumulation = true
//! input_format = "nchw"
//! weights_format = "oihw"
//! output_format = "nchw"
//! with_bias = true
//! with_relu = true
//! scratch_budget = "256M"
//! ```

use crate::ConvError;
use conv_geometry::{ActivationLayout, WeightsLayout};
use scratch_arena::ScratchBudget;
use std::path::Path;
use strategy_planner::{ExecutionHints, StrategyCode};
use wino_kernels::Epilogue;

/// Convolution algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    #[default]
    Winograd,
    Direct,
}

impl Algorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Algorithm::Winograd => "winograd",
            Algorithm::Direct => "direct",
        }
    }
}

/// Configuration for one convolution engine.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub algorithm: Algorithm,
    /// Transformed tile edge `A` (4 to 7); 0 picks one from the problem.
    pub tile_edge: usize,
    /// Channel block width `V`: 4, 8 or 16.
    pub vector_width: usize,
    /// Tiles per tile block (`T`).
    pub tile_block: usize,
    /// Threads per team; 0 uses hardware threads divided by teams.
    pub threads: usize,
    /// Thread teams; 0 means one.
    pub teams: usize,
    /// `"auto"` or a four-digit strategy code such as `"a061"`.
    pub execution_mode: String,
    pub oc_partitions: usize,
    pub ic_partitions: usize,
    /// Keep transformed weights across runs while the weights buffer is unchanged.
    pub inference_accumulation: bool,
    pub input_format: ActivationLayout,
    pub weights_format: WeightsLayout,
    pub output_format: ActivationLayout,
    pub with_bias: bool,
    pub with_relu: bool,
    /// Add the previous contents of the output buffer.
    pub with_sum: bool,
    /// Ceiling for scratch memory (human-readable, e.g. `"256M"`).
    pub scratch_budget: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Winograd,
            tile_edge: 0,
            vector_width: 16,
            tile_block: 8,
            threads: 0,
            teams: 1,
            execution_mode: "auto".to_string(),
            oc_partitions: 1,
            ic_partitions: 1,
            inference_accumulation: true,
            input_format: ActivationLayout::Nchw,
            weights_format: WeightsLayout::Oihw,
            output_format: ActivationLayout::Nchw,
            with_bias: false,
            with_relu: false,
            with_sum: false,
            scratch_budget: None,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConvError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConvError::ConfigFile(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConvError> {
        toml::from_str(toml_str)
            .map_err(|e| ConvError::ConfigFile(format!("TOML parse error: {e}")))
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, ConvError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConvError::ConfigFile(format!("TOML serialise error: {e}")))
    }

    /// Parses `execution_mode`; `None` means automatic selection.
    pub fn strategy_code(&self) -> Result<Option<StrategyCode>, ConvError> {
        match self.execution_mode.trim() {
            "" | "auto" => Ok(None),
            code => code
                .parse::<StrategyCode>()
                .map(Some)
                .map_err(|e| ConvError::Configuration(format!("execution_mode: {e}"))),
        }
    }

    /// Hints for the strategy selector.
    pub fn hints(&self) -> Result<ExecutionHints, ConvError> {
        Ok(ExecutionHints {
            threads: self.threads,
            teams: self.teams,
            tile_edge: self.tile_edge,
            tile_block: self.tile_block,
            mode: self.strategy_code()?,
            oc_partitions: self.oc_partitions,
            ic_partitions: self.ic_partitions,
        })
    }

    /// Parses the scratch budget, if one is set.
    pub fn parse_budget(&self) -> Result<Option<ScratchBudget>, ConvError> {
        self.scratch_budget
            .as_deref()
            .map(|s| {
                ScratchBudget::parse(s)
                    .map_err(|e| ConvError::Configuration(format!("invalid scratch budget: {e}")))
            })
            .transpose()
    }

    pub fn epilogue(&self) -> Epilogue {
        Epilogue {
            bias: self.with_bias,
            sum: self.with_sum,
            relu: self.with_relu,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let c = EngineConfig::default();
        assert_eq!(c.algorithm, Algorithm::Winograd);
        assert_eq!(c.vector_width, 16);
        assert!(c.inference_accumulation);
        assert_eq!(c.strategy_code().unwrap(), None);
        assert_eq!(c.parse_budget().unwrap(), None);
    }

    #[test]
    fn test_from_toml() {
        let toml = r#"
algorithm = "direct"
vector_width = 8
execution_mode = "a061"
oc_partitions = 2
input_format = "nhwc"
weights_format = "hwio"
with_relu = true
scratch_budget = "64M"
"#;
        let c = EngineConfig::from_toml(toml).unwrap();
        assert_eq!(c.algorithm, Algorithm::Direct);
        assert_eq!(c.vector_width, 8);
        assert_eq!(c.input_format, ActivationLayout::Nhwc);
        assert_eq!(c.weights_format, WeightsLayout::Hwio);
        assert_eq!(c.output_format, ActivationLayout::Nchw);
        assert!(c.with_relu && !c.with_bias);
        let hints = c.hints().unwrap();
        assert_eq!(hints.mode, Some(StrategyCode(0xa061)));
        assert_eq!(hints.oc_partitions, 2);
        assert_eq!(
            c.parse_budget().unwrap().map(|b| b.as_bytes()),
            Some(64 * 1024 * 1024)
        );
    }

    #[test]
    fn test_roundtrip() {
        let c = EngineConfig {
            execution_mode: "a0e1".into(),
            with_sum: true,
            ..Default::default()
        };
        let back = EngineConfig::from_toml(&c.to_toml().unwrap()).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_bad_values() {
        let c = EngineConfig {
            execution_mode: "fast".into(),
            ..Default::default()
        };
        assert!(matches!(c.hints(), Err(ConvError::Configuration(_))));

        let c = EngineConfig {
            scratch_budget: Some("lots".into()),
            ..Default::default()
        };
        assert!(matches!(c.parse_budget(), Err(ConvError::Configuration(_))));

        assert!(matches!(
            EngineConfig::from_toml("algorithm = \"fft\""),
            Err(ConvError::ConfigFile(_))
        ));
    }
}
