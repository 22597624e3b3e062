// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The convolution engine with a type-state enforced lifecycle.
//!
//! ```text
//! ConvEngine<Idle>
//!     │  .plan::<T>(shape)     derive geometry, strategy, buffer plan
//!     ▼
//! ConvEngine<Planned<T>>
//!     │  .prepare()            thread pool + scratch arena
//!     ▼
//! ConvEngine<Ready<T>>
//!     │  .run(..)  .reshape(..)  .invalidate_weights()
//!     │  .teardown()
//!     ▼
//! ConvEngine<Idle>
//! ```
//!
//! Inside `Ready`, the weights cache moves through [`PipelineState`]:
//! `Uninitialized` (next run transforms the weights), `WeightsReady`
//! (transformed, compute pending) and `Steady` (cached weights reused).

use crate::direct::DirectPass;
use crate::pipeline::{self, transform_weights, Context, OutputSink, Scratch};
use crate::{ConvError, ConvPlan, EngineConfig, EngineMetrics, RunMetrics};
use conv_geometry::{BlockGeometry, Element, ProblemShape, TileMapper};
use scratch_arena::{ArenaOutcome, ArenaSlices, ArenaStats, ScratchArena};
use std::fmt;
use std::time::{Duration, Instant};
use strategy_planner::{weight_copies, BufferPlan, BufferRole, ExecutionStrategy, Selection, StrategySelector};

// ── Type-state markers ─────────────────────────────────────────

/// No problem is bound to the engine.
#[derive(Debug)]
pub struct Idle;

/// A plan has been derived; nothing is allocated yet.
#[derive(Debug)]
pub struct Planned<T: Element> {
    plan: ConvPlan<T>,
}

/// Thread pool and scratch are live; the engine can run.
#[derive(Debug)]
pub struct Ready<T: Element> {
    plan: ConvPlan<T>,
    pool: rayon::ThreadPool,
    arena: ScratchArena<BufferRole, T>,
    pipeline: PipelineState,
    /// Address and length of the weights the cache was built from.
    weights_key: Option<(usize, usize)>,
    metrics: EngineMetrics,
}

/// Marker trait for engine states.
pub trait EngineState: fmt::Debug {}
impl EngineState for Idle {}
impl<T: Element> EngineState for Planned<T> {}
impl<T: Element> EngineState for Ready<T> {}

/// State of the transformed-weights cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// The next run transforms the weights.
    Uninitialized,
    /// Weights are transformed for the current run.
    WeightsReady,
    /// Cached weights are reused until invalidated.
    Steady,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PipelineState::Uninitialized => "uninitialized",
            PipelineState::WeightsReady => "weights-ready",
            PipelineState::Steady => "steady",
        })
    }
}

// ── Engine ─────────────────────────────────────────────────────

/// A 2-D convolution engine bound to one problem shape at a time.
///
/// `S` is a type-state marker: `.run()` exists only on a `Ready` engine.
///
/// # Example
/// ```
/// use conv_engine::{ConvEngine, EngineConfig};
/// use conv_geometry::ProblemShape;
///
/// # fn main() -> Result<(), conv_engine::ConvError> {
/// let shape = ProblemShape::conv2d(1, 4, 4, 8, 8, 3);
/// let config = EngineConfig { vector_width: 4, threads: 1, ..Default::default() };
/// let mut engine = ConvEngine::new(config).plan::<f32>(&shape)?.prepare()?;
///
/// let input = vec![1.0f32; shape.input_len()];
/// let weights = vec![0.5f32; shape.weights_len()];
/// let mut output = vec![0.0f32; shape.output_len()];
/// let metrics = engine.run(&input, &weights, None, &mut output)?;
/// assert!(metrics.weights_transformed);
/// # Ok(())
/// # }
/// ```
pub struct ConvEngine<S: EngineState = Idle> {
    config: EngineConfig,
    hardware_threads: usize,
    state: S,
}

impl<S: EngineState> ConvEngine<S> {
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Hardware thread count used to validate thread layouts.
    pub fn hardware_threads(&self) -> usize {
        self.hardware_threads
    }
}

impl<S: EngineState> fmt::Debug for ConvEngine<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConvEngine")
            .field("state", &std::any::type_name::<S>())
            .field("algorithm", &self.config.algorithm)
            .field("execution_mode", &self.config.execution_mode)
            .finish()
    }
}

// ── Idle → Planned ─────────────────────────────────────────────

impl ConvEngine<Idle> {
    /// Creates an engine using the thread count reported by the OS.
    pub fn new(config: EngineConfig) -> Self {
        let hw = StrategySelector::detect().hardware_threads();
        Self::with_hardware_threads(config, hw)
    }

    /// Creates an engine that validates thread layouts against `hardware_threads`.
    pub fn with_hardware_threads(config: EngineConfig, hardware_threads: usize) -> Self {
        tracing::info!(
            algorithm = config.algorithm.as_str(),
            mode = %config.execution_mode,
            hardware_threads,
            "engine created"
        );
        Self {
            config,
            hardware_threads: hardware_threads.max(1),
            state: Idle,
        }
    }

    /// Derives geometry, strategy and buffer plan for `shape`.
    /// Transitions to the `Planned` state.
    pub fn plan<T: Element>(self, shape: &ProblemShape) -> Result<ConvEngine<Planned<T>>, ConvError> {
        let plan = ConvPlan::build(&self.config, shape, self.hardware_threads)?;
        Ok(ConvEngine {
            config: self.config,
            hardware_threads: self.hardware_threads,
            state: Planned { plan },
        })
    }

    /// Convenience: plans and prepares in one step.
    pub fn initialize<T: Element>(
        config: EngineConfig,
        shape: &ProblemShape,
    ) -> Result<ConvEngine<Ready<T>>, ConvError> {
        ConvEngine::new(config).plan(shape)?.prepare()
    }
}

// ── Planned → Ready ────────────────────────────────────────────

impl<T: Element> ConvEngine<Planned<T>> {
    pub fn plan(&self) -> &ConvPlan<T> {
        &self.state.plan
    }

    /// Builds the thread pool and allocates every planned buffer.
    /// Transitions to the `Ready` state.
    pub fn prepare(self) -> Result<ConvEngine<Ready<T>>, ConvError> {
        let plan = self.state.plan;
        let pool = build_pool(plan.strategy().total_threads())?;
        let mut arena = ScratchArena::new(self.config.parse_budget()?);
        arena.ensure(plan.fingerprint(), plan.buffers().requests())?;
        tracing::info!(
            strategy = %plan.strategy().label(),
            threads = pool.current_num_threads(),
            scratch_bytes = arena.live_bytes(),
            "engine ready"
        );
        Ok(ConvEngine {
            config: self.config,
            hardware_threads: self.hardware_threads,
            state: Ready {
                plan,
                pool,
                arena,
                pipeline: PipelineState::Uninitialized,
                weights_key: None,
                metrics: EngineMetrics::new(),
            },
        })
    }
}

// ── Ready ──────────────────────────────────────────────────────

impl<T: Element> ConvEngine<Ready<T>> {
    pub fn plan(&self) -> &ConvPlan<T> {
        &self.state.plan
    }

    pub fn geometry(&self) -> &BlockGeometry {
        self.state.plan.geometry()
    }

    pub fn selection(&self) -> &Selection {
        self.state.plan.selection()
    }

    pub fn strategy(&self) -> &ExecutionStrategy {
        self.state.plan.strategy()
    }

    pub fn buffer_plan(&self) -> &BufferPlan {
        self.state.plan.buffers()
    }

    pub fn pipeline_state(&self) -> PipelineState {
        self.state.pipeline
    }

    pub fn arena_stats(&self) -> &ArenaStats {
        self.state.arena.stats()
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.state.metrics
    }

    /// Forces the next run to re-transform the weights.
    pub fn invalidate_weights(&mut self) {
        self.state.pipeline = PipelineState::Uninitialized;
        self.state.weights_key = None;
        tracing::debug!("weights invalidated");
    }

    /// Runs one convolution.
    ///
    /// Tensors are in the layouts chosen in the configuration. `bias` is
    /// required when `with_bias` is set and ignored otherwise. With
    /// `with_sum`, `output` is read as the addend before being overwritten.
    ///
    /// # Errors
    /// [`ConvError::ShapeMismatch`] if a buffer length disagrees with the
    /// planned shape; nothing is computed in that case.
    pub fn run(
        &mut self,
        input: &[T],
        weights: &[T],
        bias: Option<&[T]>,
        output: &mut [T],
    ) -> Result<RunMetrics, ConvError> {
        let start = Instant::now();
        let accumulate = self.config.inference_accumulation;
        let with_bias = self.config.with_bias;
        let Ready {
            plan,
            pool,
            arena,
            pipeline,
            weights_key,
            metrics,
        } = &mut self.state;

        let adapter = plan.adapter();
        check_len("input", adapter.external_input_len(), input.len())?;
        check_len("weights", adapter.external_weights_len(), weights.len())?;
        check_len("output", adapter.external_output_len(), output.len())?;
        let bias = if with_bias {
            let b = bias.unwrap_or(&[]);
            check_len("bias", plan.shape().out_channels, b.len())?;
            Some(b)
        } else {
            None
        };

        let outcome = arena.ensure(plan.fingerprint(), plan.buffers().requests())?;
        let key = (weights.as_ptr() as usize, weights.len());
        let transform = *pipeline == PipelineState::Uninitialized
            || *weights_key != Some(key)
            || matches!(outcome, ArenaOutcome::Rebuilt { .. });

        let io = RunIo {
            input,
            weights,
            bias,
            output,
        };
        let slices = arena.split_mut();
        let result = pool.install(|| execute(plan, slices, io, transform));
        let timings = match result {
            Ok(t) => t,
            Err(e) => {
                *pipeline = PipelineState::Uninitialized;
                *weights_key = None;
                return Err(e);
            }
        };
        if transform {
            *pipeline = PipelineState::WeightsReady;
            tracing::debug!(state = %pipeline, "weights transformed");
        }

        if accumulate {
            *pipeline = PipelineState::Steady;
            *weights_key = Some(key);
        } else {
            *pipeline = PipelineState::Uninitialized;
            *weights_key = None;
        }

        let run = RunMetrics {
            strategy: plan.strategy().label(),
            total_duration: start.elapsed(),
            repack_duration: timings.repack,
            weights_duration: timings.weights,
            compute_duration: timings.compute,
            weights_transformed: transform,
            scratch_reused: outcome == ArenaOutcome::Reused,
            tiles: plan.geometry().tiles,
            macs: plan.shape().direct_macs(),
        };
        metrics.record(&run);
        tracing::debug!(run = %run.summary(), state = %pipeline, "run complete");
        Ok(run)
    }

    /// Rebinds the engine to a new shape.
    ///
    /// Geometry, strategy and buffer plan are derived again. The scratch
    /// generation is kept when nothing about it changed; otherwise it is
    /// rebuilt and the weights cache is invalidated.
    pub fn reshape(&mut self, shape: &ProblemShape) -> Result<ArenaOutcome, ConvError> {
        let plan = ConvPlan::build(&self.config, shape, self.hardware_threads)?;
        let state = &mut self.state;
        let threads = plan.strategy().total_threads();
        let pool = if threads != state.pool.current_num_threads() {
            Some(build_pool(threads)?)
        } else {
            None
        };
        // A failed ensure leaves the live generation untouched, so nothing
        // is committed before it succeeds.
        let outcome = state.arena.ensure(plan.fingerprint(), plan.buffers().requests())?;
        if let Some(pool) = pool {
            state.pool = pool;
        }
        if plan.fingerprint() != state.plan.fingerprint() || outcome != ArenaOutcome::Reused {
            state.pipeline = PipelineState::Uninitialized;
            state.weights_key = None;
        }
        tracing::info!(
            shape = %plan.shape(),
            strategy = %plan.strategy().label(),
            reused = outcome == ArenaOutcome::Reused,
            "engine reshaped"
        );
        state.plan = plan;
        Ok(outcome)
    }

    /// Releases the scratch arena and the thread pool.
    pub fn teardown(self) -> ConvEngine<Idle> {
        let Ready {
            mut arena, metrics, ..
        } = self.state;
        let released = arena.release();
        tracing::info!(released_bytes = released, runs = metrics.runs, "engine torn down");
        ConvEngine {
            config: self.config,
            hardware_threads: self.hardware_threads,
            state: Idle,
        }
    }
}

// ── Run internals ──────────────────────────────────────────────

struct RunIo<'a, T> {
    input: &'a [T],
    weights: &'a [T],
    bias: Option<&'a [T]>,
    output: &'a mut [T],
}

#[derive(Debug, Default)]
struct Timings {
    repack: Duration,
    weights: Duration,
    compute: Duration,
}

fn check_len(tensor: &'static str, expected: usize, actual: usize) -> Result<(), ConvError> {
    if expected == actual {
        Ok(())
    } else {
        Err(ConvError::ShapeMismatch {
            tensor,
            expected,
            actual,
        })
    }
}

fn build_pool(threads: usize) -> Result<rayon::ThreadPool, ConvError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("wino-worker-{i}"))
        .build()
        .map_err(|e| ConvError::Configuration(format!("cannot build thread pool: {e}")))
}

/// Repack, weights transform, compute and unpack for one run. Runs on the
/// engine's thread pool.
fn execute<T: Element>(
    plan: &ConvPlan<T>,
    mut slices: ArenaSlices<'_, BufferRole, T>,
    io: RunIo<'_, T>,
    transform: bool,
) -> Result<Timings, ConvError> {
    let geom = plan.geometry();
    let adapter = plan.adapter();
    let mut timings = Timings::default();

    let clock = Instant::now();
    let input: &[T] = if adapter.input_needs_repack() {
        let blocked = slices.take(BufferRole::BlockedInput);
        adapter.pack_input(io.input, blocked)?;
        blocked
    } else {
        io.input
    };
    let bias: &[T] = match io.bias {
        Some(b) => {
            let blocked = slices.take(BufferRole::BlockedBias);
            adapter.pack_bias(b, blocked)?;
            blocked
        }
        None => &[],
    };
    let output = io.output;
    let repacked_output = adapter.output_needs_repack();
    let blocked_output = slices.take(BufferRole::BlockedOutput);
    if repacked_output && plan.epilogue.sum {
        adapter.pack_output(output, blocked_output)?;
    }
    timings.repack = clock.elapsed();

    let clock = Instant::now();
    let weights: &[T] = if adapter.weights_needs_repack() {
        let blocked = slices.take(BufferRole::BlockedWeights);
        if transform {
            adapter.pack_weights(io.weights, blocked)?;
        }
        blocked
    } else {
        io.weights
    };
    let tweights = slices.take(BufferRole::TransformedWeights);
    if transform {
        if let Some(kernel) = &plan.kernel {
            transform_weights(geom, kernel.as_ref(), weights, tweights, weight_copies(plan.strategy()));
        }
        tracing::info!(strategy = %plan.strategy().label(), "weights transformed");
    }
    timings.weights = clock.elapsed();

    let clock = Instant::now();
    let target: &mut [T] = if repacked_output {
        &mut *blocked_output
    } else {
        &mut *output
    };
    match &plan.kernel {
        Some(kernel) => {
            let ctx = Context {
                geom,
                strategy: plan.strategy(),
                kernel: kernel.as_ref(),
                mapper: TileMapper::new(geom),
                epilogue: plan.epilogue,
                input,
                tweights,
                bias,
            };
            let scratch = Scratch {
                tinput: slices.take(BufferRole::TransformedInput),
                toutput: slices.take(BufferRole::TransformedOutput),
                partial: slices.take(BufferRole::PartialOutput),
            };
            let sink = OutputSink::new(target, geom);
            pipeline::execute(&ctx, scratch, &sink)?;
        }
        None => {
            let pass = DirectPass {
                geom,
                epilogue: plan.epilogue,
                input,
                weights,
                bias,
            };
            pass.run(target, plan.strategy().total_threads());
        }
    }
    timings.compute = clock.elapsed();

    if repacked_output {
        let clock = Instant::now();
        adapter.unpack_output(blocked_output, output)?;
        timings.repack += clock.elapsed();
    }
    Ok(timings)
}
