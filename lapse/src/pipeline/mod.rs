//! Batch processing of whole sequences.
//!
//! Both stages run one independent unit of work per frame (smoothing) or per
//! frame pair (flow). Units run in parallel with at most
//! [`PipelineConfig::max_concurrent`] in flight, and each unit loads only the
//! frames it needs. A failing unit is recorded in the [`BatchReport`] and the
//! batch moves on; it never aborts the remaining units.

mod progress;


use std::ops::Range;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::common::par_map_limited;
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::flow::estimate;
use crate::frame::FlowField;
use crate::io::{
    FrameDirectory, FrameSink, FrameSource, OutputDirectory, SmoothedDirectory, SubSequence,
};
use crate::smoothing::smooth;

pub use progress::{PipelineProgress, ProgressCallback, Stage};

/// Smoothed frames logged at info level every this many units.
const SMOOTHING_LOG_INTERVAL: usize = 100;
/// Flow pairs logged at info level every this many units.
const FLOW_LOG_INTERVAL: usize = 10;

/// Sub-directory of the output directory holding smoothed frames.
pub const SMOOTH_DIR: &str = "smooth";
/// Sub-directory of the output directory holding flow bundles.
pub const FLOW_DIR: &str = "flow";

/// A unit of work that failed, by absolute frame index.
#[derive(Debug)]
pub struct UnitFailure {
    pub index: usize,
    pub error: Error,
}

/// Outcome of one batch stage.
#[derive(Debug)]
pub struct BatchReport {
    pub stage: Stage,
    /// Indices whose result was saved, ascending.
    pub completed: Vec<usize>,
    /// Failed units, ascending by index.
    pub failures: Vec<UnitFailure>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn total(&self) -> usize {
        self.completed.len() + self.failures.len()
    }

    /// Indices of the failed units.
    pub fn failed_indices(&self) -> Vec<usize> {
        self.failures.iter().map(|f| f.index).collect()
    }
}

/// Reports of a full smoothing + flow run.
#[derive(Debug)]
pub struct PipelineReport {
    pub smoothing: BatchReport,
    pub flow: BatchReport,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        self.smoothing.is_success() && self.flow.is_success()
    }
}

/// Smooths every frame in the configured range and saves it under its
/// absolute index.
///
/// The smoothing window is relative to the selected range: its first and
/// last frames are passed through unchanged.
///
/// # Panics
///
/// Panics if `config` fails [`PipelineConfig::validate`].
pub fn smooth_sequence<S, K>(
    source: &S,
    sink: &K,
    config: &PipelineConfig,
    progress: &ProgressCallback,
) -> BatchReport
where
    S: FrameSource + ?Sized,
    K: FrameSink + ?Sized,
{
    config.validate();

    let range = config.frame_range(source.len());
    let start = range.start;
    let window = SubSequence::new(source, start, range.len());

    run_stage(Stage::Smoothing, range, config.max_concurrent, progress, |index| {
        let frame = smooth(&window, index - start, &config.smoothing)?;
        sink.save_frame(index, &frame)?;
        tracing::debug!(index, "Smoothed frame");
        Ok(())
    })
}

/// Estimates flow for every pair `(k, k + jump)` in the configured range and
/// saves it under `k`.
///
/// A pair whose frames cannot be loaded is recorded as failed and skipped;
/// nothing is computed or saved for it.
///
/// # Panics
///
/// Panics if `config` fails [`PipelineConfig::validate`].
pub fn estimate_sequence<S, K>(
    source: &S,
    sink: &K,
    config: &PipelineConfig,
    progress: &ProgressCallback,
) -> BatchReport
where
    S: FrameSource + ?Sized,
    K: FrameSink + ?Sized,
{
    config.validate();

    let jump = config.jump();
    let pairs = config.pair_range(source.len());

    run_stage(Stage::Flow, pairs, config.max_concurrent, progress, |index| {
        let frame_a = source.load_frame(index)?;
        let frame_b = source.load_frame(index + jump)?;
        let field = estimate(&frame_a, &frame_b, &config.flow)?;
        sink.save_flow_field(index, &field)?;
        log_flow_unit(index, &field, config.flow.threshold);
        Ok(())
    })
}

/// Smooths `raw` into `smoothed_dir`, then estimates flow between the saved
/// smoothed frames into `flow_dir`. Both directories are created if needed.
///
/// The flow stage reads only frames smoothed by this call; a pair touching a
/// frame that failed to smooth fails with [`Error::NotFound`], even when
/// `smoothed_dir` still holds that frame from an earlier run.
///
/// # Panics
///
/// Panics if `config` fails [`PipelineConfig::validate`].
pub fn run<S>(
    raw: &S,
    smoothed_dir: &Path,
    flow_dir: &Path,
    config: &PipelineConfig,
    progress: &ProgressCallback,
) -> Result<PipelineReport>
where
    S: FrameSource + ?Sized,
{
    let smoothed_out = OutputDirectory::create(smoothed_dir)?;
    let flow_out = OutputDirectory::create(flow_dir)?;

    let smoothing = smooth_sequence(raw, &smoothed_out, config, progress);

    let smoothed = SmoothedDirectory::with_indices(smoothed_dir, raw.len(), &smoothing.completed);
    let flow = estimate_sequence(&smoothed, &flow_out, config, progress);

    Ok(PipelineReport { smoothing, flow })
}

/// [`run`] over a directory of raw frames, writing `out_dir/smooth` and
/// `out_dir/flow`.
pub fn run_directories(
    raw_dir: &Path,
    out_dir: &Path,
    config: &PipelineConfig,
    progress: &ProgressCallback,
) -> Result<PipelineReport> {
    let raw = FrameDirectory::open(raw_dir)?;
    run(
        &raw,
        &out_dir.join(SMOOTH_DIR),
        &out_dir.join(FLOW_DIR),
        config,
        progress,
    )
}

/// Runs `unit` for every index of `indices` and collects the outcome.
fn run_stage<F>(
    stage: Stage,
    indices: Range<usize>,
    max_concurrent: usize,
    progress: &ProgressCallback,
    unit: F,
) -> BatchReport
where
    F: Fn(usize) -> Result<()> + Sync,
{
    let indices: Vec<usize> = indices.collect();
    let total = indices.len();
    let log_interval = match stage {
        Stage::Smoothing => SMOOTHING_LOG_INTERVAL,
        Stage::Flow => FLOW_LOG_INTERVAL,
    };

    tracing::info!(%stage, total, max_concurrent, "Starting batch stage");

    let finished = AtomicUsize::new(0);
    let outcomes = par_map_limited(&indices, max_concurrent, |&index| {
        let result = unit(index);

        if let Err(error) = &result {
            tracing::warn!(%stage, index, %error, "Unit failed, continuing with the next one");
        }

        let current = finished.fetch_add(1, Ordering::Relaxed) + 1;
        if current % log_interval == 0 {
            tracing::info!(%stage, current, total, "Batch progress");
        }
        progress.report(current, total, stage);

        (index, result)
    });

    let mut report = BatchReport {
        stage,
        completed: Vec::with_capacity(total),
        failures: Vec::new(),
    };
    for (index, result) in outcomes {
        match result {
            Ok(()) => report.completed.push(index),
            Err(error) => report.failures.push(UnitFailure { index, error }),
        }
    }

    tracing::info!(
        %stage,
        completed = report.completed.len(),
        failed = report.failures.len(),
        "Batch stage finished"
    );

    report
}

fn log_flow_unit(index: usize, field: &FlowField, threshold: f32) {
    tracing::debug!(
        index,
        reliable = field.reliable_count(threshold),
        mean_speed = field.mean_speed(threshold),
        "Estimated flow"
    );
}
