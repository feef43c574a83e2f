//! Progress reporting for batch runs.

use std::fmt;
use std::sync::Arc;

/// Progress of one batch stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineProgress {
    /// Units finished so far, including failed ones (1-based).
    pub current: usize,
    /// Total number of units in the stage.
    pub total: usize,
    pub stage: Stage,
}

/// Batch stage a unit of work belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// One unit per smoothed frame.
    Smoothing,
    /// One unit per frame pair.
    Flow,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Smoothing => write!(f, "smoothing"),
            Stage::Flow => write!(f, "flow"),
        }
    }
}

/// Optional progress callback, invoked from worker threads.
///
/// `ProgressCallback::default()` reports nothing.
#[derive(Clone, Default)]
pub struct ProgressCallback(Option<Arc<dyn Fn(PipelineProgress) + Send + Sync>>);

impl ProgressCallback {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(PipelineProgress) + Send + Sync + 'static,
    {
        Self(Some(Arc::new(f)))
    }

    pub(crate) fn report(&self, current: usize, total: usize, stage: Stage) {
        if let Some(f) = self.0.as_ref() {
            f(PipelineProgress {
                current,
                total,
                stage,
            });
        }
    }
}

impl fmt::Debug for ProgressCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            None => write!(f, "ProgressCallback::None"),
            Some(_) => write!(f, "ProgressCallback::Some(...)"),
        }
    }
}
