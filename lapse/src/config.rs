//! Pipeline configuration.
//!
//! `SmoothingConfig` and `FlowConfig` carry the parameters of the two stages;
//! `PipelineConfig` adds the frame range and the batch concurrency limit and
//! can be stored as YAML or JSON.

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use common::{FileExtensionError, FileFormat, SerdeFormatError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Five-tap temporal kernel applied at offsets `-2..=2` (Simoncelli weights).
pub const DEFAULT_KERNEL: [f64; 5] = [0.036, 0.249, 0.431, 0.249, 0.036];

/// Three-tap kernel used one stride away from either end of the sequence.
pub const DEFAULT_EDGE_KERNEL: [f64; 3] = [0.225, 0.55, 0.225];

/// Parameters of the temporal smoothing stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Weights for frames at offsets `{-2, -1, 0, 1, 2} * jump`.
    pub kernel: [f64; 5],
    /// Weights for frames at offsets `{-1, 0, 1} * jump`.
    pub edge_kernel: [f64; 3],
    /// Frame-index stride between neighbors.
    pub jump: usize,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            kernel: DEFAULT_KERNEL,
            edge_kernel: DEFAULT_EDGE_KERNEL,
            jump: 1,
        }
    }
}

impl SmoothingConfig {
    pub fn with_jump(jump: usize) -> Self {
        Self {
            jump,
            ..Default::default()
        }
    }

    /// # Panics
    ///
    /// Panics on a zero stride or a kernel with negative weights or a
    /// non-positive sum.
    pub fn validate(&self) {
        assert!(self.jump > 0, "Jump must be at least 1");
        validate_weights(&self.kernel, "Kernel");
        validate_weights(&self.edge_kernel, "Edge kernel");
    }
}

fn validate_weights(weights: &[f64], name: &str) {
    assert!(
        weights.iter().all(|w| w.is_finite() && *w >= 0.0),
        "{name} weights must be finite and non-negative"
    );
    assert!(
        weights.iter().sum::<f64>() > 0.0,
        "{name} weights must have a positive sum"
    );
}

/// Parameters of the Lucas-Kanade flow stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Standard deviation of the Gaussian window, in pixels.
    pub sigma: f32,
    /// Velocities are zeroed where reliability is at or below this value.
    pub threshold: f32,
    /// Gaussian kernel radius in standard deviations.
    pub truncate: f32,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            sigma: 1.0,
            threshold: 0.01,
            truncate: 4.0,
        }
    }
}

impl FlowConfig {
    pub fn new(sigma: f32, threshold: f32) -> Self {
        Self {
            sigma,
            threshold,
            ..Default::default()
        }
    }

    /// Kernel radius in pixels: `round(truncate * sigma)`.
    pub fn kernel_radius(&self) -> usize {
        (self.truncate * self.sigma + 0.5) as usize
    }

    /// # Panics
    ///
    /// Panics if `sigma` or `truncate` is not positive or `threshold` is negative.
    pub fn validate(&self) {
        assert!(
            self.sigma.is_finite() && self.sigma > 0.0,
            "Sigma must be positive"
        );
        assert!(self.threshold >= 0.0, "Threshold must be non-negative");
        assert!(
            self.truncate.is_finite() && self.truncate > 0.0,
            "Truncate must be positive"
        );
    }
}

/// Full batch configuration.
///
/// # Examples
///
/// ```ignore
/// use lapse::{FlowConfig, PipelineConfig};
///
/// let config = PipelineConfig {
///     start: 10,
///     end: Some(200),
///     flow: FlowConfig::new(2.0, 0.05),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// First frame index of the processed range.
    pub start: usize,
    /// One past the last frame index; `None` means the whole sequence.
    pub end: Option<usize>,
    pub smoothing: SmoothingConfig,
    pub flow: FlowConfig,
    /// Maximum number of frames (smoothing) or pairs (flow) in flight.
    pub max_concurrent: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            start: 0,
            end: None,
            smoothing: SmoothingConfig::default(),
            flow: FlowConfig::default(),
            max_concurrent: rayon::current_num_threads(),
        }
    }
}

impl PipelineConfig {
    /// Stride used both for smoothing neighbors and for pairing frames.
    pub fn jump(&self) -> usize {
        self.smoothing.jump
    }

    /// Frame indices covered for a sequence of `len` frames.
    pub fn frame_range(&self, len: usize) -> Range<usize> {
        let end = self.end.unwrap_or(len).min(len);
        self.start.min(end)..end
    }

    /// First frames of each flow pair `(k, k + jump)` inside the range.
    pub fn pair_range(&self, len: usize) -> Range<usize> {
        let range = self.frame_range(len);
        range.start..range.end.saturating_sub(self.jump()).max(range.start)
    }

    /// # Panics
    ///
    /// Panics if any stage parameter is invalid, `max_concurrent` is 0 or
    /// `end` precedes `start`.
    pub fn validate(&self) {
        self.smoothing.validate();
        self.flow.validate();
        assert!(self.max_concurrent > 0, "Max concurrent must be at least 1");
        if let Some(end) = self.end {
            assert!(end >= self.start, "End must not precede start");
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigFileError> {
        let format = format_for(path)?;
        let text = fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(common::deserialize(&text, format)?)
    }

    pub fn to_file(&self, path: &Path) -> Result<(), ConfigFileError> {
        let format = format_for(path)?;
        let text = common::serialize(self, format)?;
        fs::write(path, text).map_err(|source| ConfigFileError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn format_for(path: &Path) -> Result<FileFormat, ConfigFileError> {
    let name = path.to_string_lossy();
    Ok(FileFormat::from_file_name(&name)?)
}

/// Errors reading or writing a configuration file.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("Failed to access config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Format(#[from] FileExtensionError),

    #[error(transparent)]
    Serde(#[from] SerdeFormatError),
}
