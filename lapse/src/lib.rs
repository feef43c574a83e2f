//! Lapse - temporal smoothing and optical flow for time-lapse sequences.
//!
//! This library prepares noisy time-lapse frames (e.g. live-cell microscopy)
//! and measures motion between them:
//! - Temporal smoothing with a 5-tap kernel that narrows near sequence ends
//! - Dense Lucas-Kanade optical flow with an eigenvalue reliability mask
//! - Batch runs over frame directories with bounded parallelism
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use lapse::{estimate, smooth, FlowConfig, FrameDirectory, SmoothingConfig};
//!
//! let frames = FrameDirectory::open("raw/".as_ref())?;
//!
//! let a = smooth(&frames, 4, &SmoothingConfig::default())?;
//! let b = smooth(&frames, 5, &SmoothingConfig::default())?;
//!
//! let flow = estimate(&a, &b, &FlowConfig::default())?;
//! println!("{} reliable pixels", flow.reliable_count(0.01));
//! ```

pub(crate) mod common;
pub mod config;
mod error;
pub mod flow;
mod frame;
pub mod io;
pub mod pipeline;
pub mod smoothing;

// ============================================================================
// Core types
// ============================================================================

pub use error::{Error, Result};
pub use frame::{FlowField, Frame, FrameShape};

// ============================================================================
// Configuration
// ============================================================================

pub use config::{
    ConfigFileError, FlowConfig, PipelineConfig, SmoothingConfig, DEFAULT_EDGE_KERNEL,
    DEFAULT_KERNEL,
};

// ============================================================================
// Algorithms
// ============================================================================

pub use flow::estimate;
pub use smoothing::{smooth, Window};

// ============================================================================
// Storage
// ============================================================================

pub use io::{
    load_flow_field, load_frame, FrameDirectory, FrameSink, FrameSource, MemorySink,
    OutputDirectory, SmoothedDirectory, SubSequence,
};

// ============================================================================
// Batch processing
// ============================================================================

pub use pipeline::{
    estimate_sequence, run, run_directories, smooth_sequence, BatchReport, PipelineProgress,
    PipelineReport, ProgressCallback, Stage, UnitFailure,
};
