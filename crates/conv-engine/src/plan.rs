// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Everything derived from (configuration, problem shape) before any
//! memory is touched: geometry, strategy, buffer plan and kernel.

use crate::{Algorithm, ConvError, EngineConfig};
use conv_geometry::{BlockGeometry, Element, FormatAdapter, ProblemShape};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use strategy_planner::{
    BufferPlan, ExecutionStrategy, RepackNeeds, Selection, StrategySelector,
};
use wino_kernels::{Epilogue, KernelHandle, KernelRegistry};

/// Kernel edge the transformed algorithm supports.
pub const WINOGRAD_KERNEL: usize = 3;

/// A fully derived execution plan for one problem shape.
pub struct ConvPlan<T: Element> {
    pub(crate) shape: ProblemShape,
    pub(crate) algorithm: Algorithm,
    pub(crate) geometry: BlockGeometry,
    pub(crate) selection: Selection,
    pub(crate) buffers: BufferPlan,
    pub(crate) adapter: FormatAdapter,
    pub(crate) epilogue: Epilogue,
    /// `None` for the direct algorithm.
    pub(crate) kernel: Option<KernelHandle<T>>,
    pub(crate) fingerprint: u64,
}

impl<T: Element> ConvPlan<T> {
    /// Derives the plan with the default kernel registry.
    pub fn build(
        config: &EngineConfig,
        shape: &ProblemShape,
        hardware_threads: usize,
    ) -> Result<Self, ConvError> {
        Self::build_with(config, shape, hardware_threads, &KernelRegistry::with_defaults())
    }

    /// Derives the plan, looking kernels up in `registry`.
    ///
    /// Fails with [`ConvError::Unimplemented`] when the transformed
    /// algorithm cannot handle the shape or no kernel is registered for the
    /// tile edge, and with [`ConvError::Configuration`] for anything the
    /// shape, hints or scratch budget rule out.
    pub fn build_with(
        config: &EngineConfig,
        shape: &ProblemShape,
        hardware_threads: usize,
        registry: &KernelRegistry<T>,
    ) -> Result<Self, ConvError> {
        shape.validate()?;
        let hints = config.hints()?;
        let selector = StrategySelector::new(hardware_threads);
        let repack = |geom: &BlockGeometry| {
            let adapter = FormatAdapter::new(
                geom,
                config.input_format,
                config.weights_format,
                config.output_format,
            );
            let needs = RepackNeeds {
                input: adapter.input_needs_repack(),
                weights: adapter.weights_needs_repack(),
                output: adapter.output_needs_repack(),
                bias: config.with_bias,
            };
            (adapter, needs)
        };

        let (geometry, selection, buffers, adapter, kernel) = match config.algorithm {
            Algorithm::Winograd => {
                check_winograd(shape)?;
                let tile_edge = match hints.tile_edge {
                    0 => StrategySelector::select_tile_edge(shape, config.vector_width),
                    edge => edge,
                };
                let kernel = registry.lookup(tile_edge, WINOGRAD_KERNEL)?;
                let geometry =
                    BlockGeometry::derive(shape, tile_edge, config.vector_width, config.tile_block)?;
                let selection = selector.select(&geometry, &hints)?;
                let (adapter, needs) = repack(&geometry);
                let buffers = BufferPlan::for_strategy(&geometry, &selection.strategy, needs)?;
                (geometry, selection, buffers, adapter, Some(kernel))
            }
            Algorithm::Direct => {
                let geometry = BlockGeometry::for_direct(shape, config.vector_width, config.tile_block)?;
                let selection = selector.select_direct(&geometry, &hints);
                let (adapter, needs) = repack(&geometry);
                let buffers = BufferPlan::direct(&geometry, &selection.strategy, needs);
                (geometry, selection, buffers, adapter, None)
            }
        };
        tracing::info!(geometry = %geometry.summary(), "geometry derived");
        tracing::info!(plan = %buffers.summary(), "buffer plan");

        if let Some(budget) = config.parse_budget()? {
            let bytes = buffers.total_bytes(T::PRECISION.size_bytes());
            if !budget.admits(bytes) {
                return Err(ConvError::Configuration(format!(
                    "buffer plan needs {bytes} bytes, over the scratch budget of {budget}"
                )));
            }
        }

        let fingerprint = fingerprint::<T>(&geometry, &selection.strategy, &buffers);
        Ok(Self {
            shape: *shape,
            algorithm: config.algorithm,
            geometry,
            selection,
            buffers,
            adapter,
            epilogue: config.epilogue(),
            kernel,
            fingerprint,
        })
    }

    pub fn shape(&self) -> &ProblemShape {
        &self.shape
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn geometry(&self) -> &BlockGeometry {
        &self.geometry
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn strategy(&self) -> &ExecutionStrategy {
        &self.selection.strategy
    }

    pub fn buffers(&self) -> &BufferPlan {
        &self.buffers
    }

    pub fn adapter(&self) -> &FormatAdapter {
        &self.adapter
    }

    /// Identity of the (shape, strategy) scratch generation.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Multi-line description for the CLI.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "problem   {}\nalgorithm {}\ngeometry  {}\nstrategy  {}\nbuffers   {}",
            self.shape,
            self.algorithm.as_str(),
            self.geometry.summary(),
            self.selection.strategy.summary(),
            self.buffers.summary(),
        );
        for reason in &self.selection.fallbacks {
            out.push_str(&format!("\nfallback  {reason}"));
        }
        out
    }
}

impl<T: Element> std::fmt::Debug for ConvPlan<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvPlan")
            .field("shape", &self.shape)
            .field("algorithm", &self.algorithm)
            .field("strategy", &self.selection.strategy.label())
            .field("fallbacks", &self.selection.fallbacks)
            .field("buffers", &self.buffers.buffers)
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

/// Transformed convolution needs a 3x3 kernel, unit stride and dilation,
/// and padding smaller than the kernel.
fn check_winograd(shape: &ProblemShape) -> Result<(), ConvError> {
    let (kh, kw) = (shape.kernel_height, shape.kernel_width);
    if kh != WINOGRAD_KERNEL || kw != WINOGRAD_KERNEL {
        return Err(ConvError::Unimplemented(format!(
            "winograd needs a {WINOGRAD_KERNEL}x{WINOGRAD_KERNEL} kernel, got {kh}x{kw}"
        )));
    }
    if !shape.is_unit_stride() {
        return Err(ConvError::Unimplemented(format!(
            "winograd needs unit stride and dilation, got stride {}x{} dilation {}x{}",
            shape.stride_h, shape.stride_w, shape.dilation_h, shape.dilation_w
        )));
    }
    let p = shape.padding;
    if [p.top, p.bottom].iter().any(|&x| x >= kh) || [p.left, p.right].iter().any(|&x| x >= kw) {
        return Err(ConvError::Unimplemented(format!(
            "winograd needs padding below the kernel size, got {p:?}"
        )));
    }
    Ok(())
}

fn fingerprint<T: Element>(
    geom: &BlockGeometry,
    strategy: &ExecutionStrategy,
    buffers: &BufferPlan,
) -> u64 {
    let mut h = DefaultHasher::new();
    T::PRECISION.hash(&mut h);
    geom.hash(&mut h);
    strategy.code.hash(&mut h);
    strategy.pipeline.hash(&mut h);
    strategy.layout.teams.hash(&mut h);
    strategy.layout.threads_per_team.hash(&mut h);
    strategy.oc_partitions.hash(&mut h);
    strategy.ic_partitions.hash(&mut h);
    buffers.requests().hash(&mut h);
    h.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use conv_geometry::Padding;

    fn config(mode: &str) -> EngineConfig {
        EngineConfig {
            vector_width: 4,
            tile_block: 2,
            threads: 2,
            execution_mode: mode.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_build_winograd() {
        let shape = ProblemShape::conv2d(1, 8, 8, 8, 8, 3);
        let plan = ConvPlan::<f32>::build(&config("a061"), &shape, 4).unwrap();
        assert_eq!(plan.geometry().tile_edge, 4);
        assert_eq!(plan.strategy().code.to_string(), "a061");
        assert!(plan.buffers().len_of(strategy_planner::BufferRole::BlockedInput) > 0);
        assert!(plan.summary().contains("a061"));
    }

    #[test]
    fn test_unsupported_shapes() {
        let strided = ProblemShape::conv2d(1, 4, 4, 8, 8, 3).with_stride(2, 2);
        let err = ConvPlan::<f32>::build(&config("auto"), &strided, 4).unwrap_err();
        assert!(matches!(err, ConvError::Unimplemented(_)));

        let five = ProblemShape::conv2d(1, 4, 4, 8, 8, 5);
        assert!(matches!(
            ConvPlan::<f32>::build(&config("auto"), &five, 4),
            Err(ConvError::Unimplemented(_))
        ));

        let padded = ProblemShape::conv2d(1, 4, 4, 8, 8, 3).with_padding(Padding::uniform(3));
        assert!(matches!(
            ConvPlan::<f32>::build(&config("auto"), &padded, 4),
            Err(ConvError::Unimplemented(_))
        ));

        let edge8 = EngineConfig {
            tile_edge: 8,
            ..config("auto")
        };
        let shape = ProblemShape::conv2d(1, 4, 4, 8, 8, 3);
        assert!(matches!(
            ConvPlan::<f32>::build(&edge8, &shape, 4),
            Err(ConvError::Unimplemented(_))
        ));
        assert!(matches!(
            ConvPlan::<f32>::build(&config("a048"), &shape, 4),
            Err(ConvError::Unimplemented(_))
        ));
    }

    #[test]
    fn test_direct_accepts_strides() {
        let shape = ProblemShape::conv2d(1, 4, 4, 9, 9, 5).with_stride(2, 2);
        let cfg = EngineConfig {
            algorithm: Algorithm::Direct,
            ..config("auto")
        };
        let plan = ConvPlan::<f64>::build(&cfg, &shape, 4).unwrap();
        assert!(plan.kernel.is_none());
        assert_eq!(plan.strategy().label(), "direct");
    }

    #[test]
    fn test_scratch_budget() {
        let shape = ProblemShape::conv2d(1, 16, 16, 32, 32, 3);
        let cfg = EngineConfig {
            scratch_budget: Some("1K".into()),
            ..config("a000")
        };
        assert!(matches!(
            ConvPlan::<f32>::build(&cfg, &shape, 4),
            Err(ConvError::Configuration(_))
        ));
    }

    #[test]
    fn test_fingerprint_tracks_shape_and_strategy() {
        let a = ProblemShape::conv2d(1, 8, 8, 8, 8, 3);
        let b = ProblemShape::conv2d(1, 8, 8, 12, 12, 3);
        let fa = ConvPlan::<f32>::build(&config("a040"), &a, 4).unwrap().fingerprint();
        let fa2 = ConvPlan::<f32>::build(&config("a040"), &a, 4).unwrap().fingerprint();
        let fb = ConvPlan::<f32>::build(&config("a040"), &b, 4).unwrap().fingerprint();
        let fc = ConvPlan::<f32>::build(&config("a000"), &a, 4).unwrap().fingerprint();
        assert_eq!(fa, fa2);
        assert_ne!(fa, fb);
        assert_ne!(fa, fc);
    }
}
