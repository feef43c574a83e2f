//! Frame storage seam.
//!
//! The smoothing and flow stages only see [`FrameSource`] and [`FrameSink`].
//! Frames are loaded one at a time by index, so a batch unit holds only the
//! frames of its own window resident.

mod codec;
mod directory;

#[cfg(test)]
mod tests;

use std::borrow::Cow;
use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::frame::{FlowField, Frame};

pub use codec::{load_flow_field, load_frame};
pub use directory::{
    flow_field_name, smoothed_frame_name, FrameDirectory, OutputDirectory, SmoothedDirectory,
};

/// Ordered, indexable frame sequence.
pub trait FrameSource: Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Human-readable identifier of frame `index`, used in errors and logs.
    fn frame_id(&self, index: usize) -> String;

    /// Loads frame `index`. Fails with [`Error::NotFound`] when the index
    /// has no backing data and [`Error::Decode`] when it cannot be parsed.
    fn load_frame(&self, index: usize) -> Result<Cow<'_, Frame>>;
}

/// Destination for computed frames and flow fields, keyed by frame index.
/// Saving an index that already exists overwrites it.
pub trait FrameSink: Sync {
    fn save_frame(&self, index: usize, frame: &Frame) -> Result<()>;

    fn save_flow_field(&self, index: usize, field: &FlowField) -> Result<()>;
}

impl FrameSource for [Frame] {
    fn len(&self) -> usize {
        <[Frame]>::len(self)
    }

    fn frame_id(&self, index: usize) -> String {
        format!("frame[{index}]")
    }

    fn load_frame(&self, index: usize) -> Result<Cow<'_, Frame>> {
        self.get(index)
            .map(Cow::Borrowed)
            .ok_or_else(|| Error::NotFound {
                id: self.frame_id(index),
            })
    }
}

impl FrameSource for Vec<Frame> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn frame_id(&self, index: usize) -> String {
        self.as_slice().frame_id(index)
    }

    fn load_frame(&self, index: usize) -> Result<Cow<'_, Frame>> {
        self.as_slice().load_frame(index)
    }
}

/// Contiguous window `[start, start + len)` of another source, re-indexed
/// from 0. Boundary handling in smoothing is relative to this window.
#[derive(Debug)]
pub struct SubSequence<'a, S: ?Sized> {
    inner: &'a S,
    start: usize,
    len: usize,
}

impl<'a, S: FrameSource + ?Sized> SubSequence<'a, S> {
    /// # Panics
    ///
    /// Panics if the window extends past the end of `inner`.
    pub fn new(inner: &'a S, start: usize, len: usize) -> Self {
        assert!(
            start + len <= inner.len(),
            "sub-sequence exceeds the source length"
        );
        Self { inner, start, len }
    }

    /// Index in the underlying source of local index `index`.
    fn absolute(&self, index: usize) -> usize {
        self.start + index
    }
}

impl<S: FrameSource + ?Sized> FrameSource for SubSequence<'_, S> {
    fn len(&self) -> usize {
        self.len
    }

    fn frame_id(&self, index: usize) -> String {
        self.inner.frame_id(self.absolute(index))
    }

    fn load_frame(&self, index: usize) -> Result<Cow<'_, Frame>> {
        if index >= self.len {
            return Err(Error::NotFound {
                id: self.frame_id(index),
            });
        }
        self.inner.load_frame(self.absolute(index))
    }
}

/// In-memory sink, mostly for tests and embedding callers.
#[derive(Debug, Default)]
pub struct MemorySink {
    frames: Mutex<BTreeMap<usize, Frame>>,
    flows: Mutex<BTreeMap<usize, FlowField>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame(&self, index: usize) -> Option<Frame> {
        self.frames.lock().get(&index).cloned()
    }

    pub fn flow_field(&self, index: usize) -> Option<FlowField> {
        self.flows.lock().get(&index).cloned()
    }

    pub fn frame_indices(&self) -> Vec<usize> {
        self.frames.lock().keys().copied().collect()
    }

    pub fn flow_indices(&self) -> Vec<usize> {
        self.flows.lock().keys().copied().collect()
    }

    /// Saved frames in index order.
    pub fn into_frames(self) -> Vec<Frame> {
        self.frames.into_inner().into_values().collect()
    }
}

impl FrameSink for MemorySink {
    fn save_frame(&self, index: usize, frame: &Frame) -> Result<()> {
        self.frames.lock().insert(index, frame.clone());
        Ok(())
    }

    fn save_flow_field(&self, index: usize, field: &FlowField) -> Result<()> {
        self.flows.lock().insert(index, field.clone());
        Ok(())
    }
}
