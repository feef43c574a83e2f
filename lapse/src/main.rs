//! Lapse CLI - smoothing and optical flow for time-lapse sequences.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use lapse::pipeline::{FLOW_DIR, SMOOTH_DIR};
use lapse::{
    estimate_sequence, run_directories, smooth_sequence, BatchReport, FrameDirectory,
    FrameSource, OutputDirectory, PipelineConfig, ProgressCallback, SmoothedDirectory,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "lapse")]
#[command(about = "Temporal smoothing and Lucas-Kanade optical flow for time-lapse sequences")]
#[command(version)]
struct Cli {
    /// Pipeline configuration file (.yaml, .yml or .json); flags override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Base log level, overridden by RUST_LOG
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Directory for rolling log files
    #[arg(long, global = true, default_value = "logs")]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Smooth a directory of raw frames
    Smooth {
        /// Directory of raw TIFF/PNG frames, ordered by file name
        raw_dir: PathBuf,

        /// Output directory for smooth_NNNNNN.tiff frames
        out_dir: PathBuf,

        #[command(flatten)]
        options: PipelineArgs,
    },

    /// Estimate flow between frames of a smoothed directory
    Flow {
        /// Directory of smoothed frames
        smooth_dir: PathBuf,

        /// Output directory for flow_NNNNNN.tiff bundles
        out_dir: PathBuf,

        #[command(flatten)]
        options: PipelineArgs,
    },

    /// Smooth, then estimate flow (writes OUT_DIR/smooth and OUT_DIR/flow)
    Run {
        /// Directory of raw TIFF/PNG frames, ordered by file name
        raw_dir: PathBuf,

        /// Output directory
        out_dir: PathBuf,

        #[command(flatten)]
        options: PipelineArgs,
    },
}

#[derive(Args, Debug, Default)]
struct PipelineArgs {
    /// First frame index to process
    #[arg(long)]
    start: Option<usize>,

    /// One past the last frame index to process
    #[arg(long)]
    end: Option<usize>,

    /// Frame stride for smoothing neighbors and flow pairs
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    jump: Option<u32>,

    /// Standard deviation of the Gaussian window, in pixels
    #[arg(long, value_parser = parse_positive)]
    sigma: Option<f32>,

    /// Minimum reliability for a velocity to be kept
    #[arg(long, value_parser = parse_non_negative)]
    threshold: Option<f32>,

    /// Maximum number of frames or pairs processed at once
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    max_concurrent: Option<u32>,
}

impl PipelineArgs {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(start) = self.start {
            config.start = start;
        }
        if let Some(end) = self.end {
            config.end = Some(end);
        }
        if let Some(jump) = self.jump {
            config.smoothing.jump = jump as usize;
        }
        if let Some(sigma) = self.sigma {
            config.flow.sigma = sigma;
        }
        if let Some(threshold) = self.threshold {
            config.flow.threshold = threshold;
        }
        if let Some(max_concurrent) = self.max_concurrent {
            config.max_concurrent = max_concurrent as usize;
        }
    }
}

fn parse_positive(s: &str) -> Result<f32, String> {
    match s.parse::<f32>() {
        Ok(v) if v.is_finite() && v > 0.0 => Ok(v),
        Ok(_) => Err("must be a positive number".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

fn parse_non_negative(s: &str) -> Result<f32, String> {
    match s.parse::<f32>() {
        Ok(v) if v >= 0.0 => Ok(v),
        Ok(_) => Err("must be a non-negative number".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    common::log_setup::setup_logging(&cli.log_level, &cli.log_dir);

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    let reports = match &cli.command {
        Commands::Smooth {
            raw_dir,
            out_dir,
            options,
        } => {
            options.apply(&mut config);
            check_config(&config)?;
            info!(raw = %raw_dir.display(), out = %out_dir.display(), "Smoothing");

            let raw = FrameDirectory::open(raw_dir)?;
            let out = OutputDirectory::create(out_dir)?;
            vec![smooth_sequence(&raw, &out, &config, &ProgressCallback::default())]
        }
        Commands::Flow {
            smooth_dir,
            out_dir,
            options,
        } => {
            options.apply(&mut config);
            check_config(&config)?;
            info!(smoothed = %smooth_dir.display(), out = %out_dir.display(), "Estimating flow");

            let out = OutputDirectory::create(out_dir)?;
            vec![estimate_from_dir(smooth_dir, &out, &config)?]
        }
        Commands::Run {
            raw_dir,
            out_dir,
            options,
        } => {
            options.apply(&mut config);
            check_config(&config)?;
            info!(
                raw = %raw_dir.display(),
                smoothed = %out_dir.join(SMOOTH_DIR).display(),
                flow = %out_dir.join(FLOW_DIR).display(),
                "Running full pipeline"
            );

            let report = run_directories(raw_dir, out_dir, &config, &ProgressCallback::default())?;
            vec![report.smoothing, report.flow]
        }
    };

    let failed: usize = reports.iter().map(|r| r.failures.len()).sum();
    for report in &reports {
        summarize(report);
    }
    if failed > 0 {
        bail!("{failed} unit(s) failed; see the log for details");
    }

    Ok(())
}

/// Rejects inconsistent values coming from the config file before any work starts.
fn check_config(config: &PipelineConfig) -> anyhow::Result<()> {
    if let Some(end) = config.end {
        if end < config.start {
            bail!("end ({end}) must not precede start ({})", config.start);
        }
    }
    if config.max_concurrent == 0 {
        bail!("max_concurrent must be at least 1");
    }
    if config.smoothing.jump == 0 {
        bail!("jump must be at least 1");
    }
    if !config.flow.sigma.is_finite() || config.flow.sigma <= 0.0 {
        bail!("sigma must be positive");
    }
    if config.flow.threshold.is_nan() || config.flow.threshold < 0.0 {
        bail!("threshold must be non-negative");
    }
    if !config.flow.truncate.is_finite() || config.flow.truncate <= 0.0 {
        bail!("truncate must be positive");
    }
    check_weights("kernel", &config.smoothing.kernel)?;
    check_weights("edge_kernel", &config.smoothing.edge_kernel)?;
    Ok(())
}

fn check_weights(name: &str, weights: &[f64]) -> anyhow::Result<()> {
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        bail!("{name} weights must be finite and non-negative");
    }
    if weights.iter().sum::<f64>() <= 0.0 {
        bail!("{name} weights must have a positive sum");
    }
    Ok(())
}

/// Reads `smooth_NNNNNN.tiff` frames by index, or any frame files in name
/// order when the directory holds none.
fn estimate_from_dir(
    dir: &Path,
    out: &OutputDirectory,
    config: &PipelineConfig,
) -> anyhow::Result<BatchReport> {
    let smoothed = SmoothedDirectory::open(dir)?;
    if !smoothed.is_empty() {
        return Ok(estimate_sequence(
            &smoothed,
            out,
            config,
            &ProgressCallback::default(),
        ));
    }

    let frames = FrameDirectory::open(dir)?;
    Ok(estimate_sequence(
        &frames,
        out,
        config,
        &ProgressCallback::default(),
    ))
}

fn summarize(report: &BatchReport) {
    info!(
        stage = %report.stage,
        completed = report.completed.len(),
        failed = report.failures.len(),
        "Stage summary"
    );
    for failure in &report.failures {
        tracing::error!(stage = %report.stage, index = failure.index, error = %failure.error, "Failed unit");
    }
}
