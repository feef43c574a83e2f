//! Error types for smoothing, flow estimation and frame storage.

use std::io;

use thiserror::Error;

use crate::frame::FrameShape;

/// Errors produced by the smoothing and flow stages and their storage seam.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Frame {index} needs neighbor at offset {offset}, outside sequence of length {len}")]
    OutOfRange {
        index: usize,
        offset: isize,
        len: usize,
    },

    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch {
        expected: FrameShape,
        actual: FrameShape,
    },

    #[error("Frame of shape {shape} is too small for a second-order gradient (need at least 3 rows and 3 columns)")]
    FrameTooSmall { shape: FrameShape },

    #[error("No frame data for '{id}'")]
    NotFound { id: String },

    #[error("Failed to decode '{id}': {reason}")]
    Decode { id: String, reason: String },

    #[error("I/O error for '{id}': {source}")]
    Io {
        id: String,
        #[source]
        source: io::Error,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Wraps an I/O error, mapping `NotFound` to [`Error::NotFound`].
    pub(crate) fn from_io(id: impl Into<String>, source: io::Error) -> Self {
        let id = id.into();
        if source.kind() == io::ErrorKind::NotFound {
            Error::NotFound { id }
        } else {
            Error::Io { id, source }
        }
    }

    pub(crate) fn decode(id: impl Into<String>, reason: impl ToString) -> Self {
        Error::Decode {
            id: id.into(),
            reason: reason.to_string(),
        }
    }
}
