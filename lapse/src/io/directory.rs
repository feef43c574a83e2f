//! Directory-backed frame sources and sinks.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use common::file_utils;

use super::codec;
use super::{FrameSink, FrameSource};
use crate::error::{Error, Result};
use crate::frame::{FlowField, Frame};

const SMOOTHED_PREFIX: &str = "smooth_";
const FLOW_PREFIX: &str = "flow_";
const TIFF_EXTENSION: &str = "tiff";

/// File name of smoothed frame `index`. Zero-padded so that name order
/// matches index order.
pub fn smoothed_frame_name(index: usize) -> String {
    format!("{SMOOTHED_PREFIX}{index:06}.{TIFF_EXTENSION}")
}

/// File name of the flow bundle for the pair starting at `index`.
pub fn flow_field_name(index: usize) -> String {
    format!("{FLOW_PREFIX}{index:06}.{TIFF_EXTENSION}")
}

/// Raw frames in a directory, ordered by file name.
#[derive(Debug, Clone)]
pub struct FrameDirectory {
    dir: PathBuf,
    files: Vec<PathBuf>,
}

impl FrameDirectory {
    /// Lists the TIFF and PNG files of `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        let files = file_utils::frame_files(dir)
            .map_err(|e| Error::from_io(dir.display().to_string(), e))?;

        tracing::info!(
            dir = %dir.display(),
            frame_count = files.len(),
            "Opened frame directory"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            files,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl FrameSource for FrameDirectory {
    fn len(&self) -> usize {
        self.files.len()
    }

    fn frame_id(&self, index: usize) -> String {
        match self.files.get(index) {
            Some(path) => path.display().to_string(),
            None => format!("{}[{index}]", self.dir.display()),
        }
    }

    fn load_frame(&self, index: usize) -> Result<Cow<'_, Frame>> {
        let path = self.files.get(index).ok_or_else(|| Error::NotFound {
            id: self.frame_id(index),
        })?;
        codec::load_frame(path).map(Cow::Owned)
    }
}

/// Writes smoothed frames and flow bundles into one directory.
#[derive(Debug, Clone)]
pub struct OutputDirectory {
    dir: PathBuf,
}

impl OutputDirectory {
    /// Uses `dir`, creating it if needed.
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| Error::from_io(dir.display().to_string(), e))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn smoothed_frame_path(&self, index: usize) -> PathBuf {
        self.dir.join(smoothed_frame_name(index))
    }

    pub fn flow_field_path(&self, index: usize) -> PathBuf {
        self.dir.join(flow_field_name(index))
    }
}

impl FrameSink for OutputDirectory {
    fn save_frame(&self, index: usize, frame: &Frame) -> Result<()> {
        codec::save_frame(&self.smoothed_frame_path(index), frame)
    }

    fn save_flow_field(&self, index: usize, field: &FlowField) -> Result<()> {
        codec::save_flow_field(&self.flow_field_path(index), field)
    }
}

/// Smoothed frames addressed by their absolute index (`smooth_{index}.tiff`).
///
/// Unlike [`FrameDirectory`], a missing index stays a gap: it is reported as
/// [`Error::NotFound`] instead of shifting later frames down.
#[derive(Debug, Clone)]
pub struct SmoothedDirectory {
    dir: PathBuf,
    len: usize,
    /// Indices that may be loaded; `None` allows every index below `len`.
    present: Option<Vec<bool>>,
}

impl SmoothedDirectory {
    /// Sequence of `len` frames stored in `dir`.
    pub fn new(dir: &Path, len: usize) -> Self {
        Self {
            dir: dir.to_path_buf(),
            len,
            present: None,
        }
    }

    /// Sequence of `len` frames of which only `indices` are readable.
    ///
    /// Every other index is a gap even if a file for it exists in `dir`,
    /// so frames left over from an earlier run are never picked up.
    pub fn with_indices(dir: &Path, len: usize, indices: &[usize]) -> Self {
        let mut present = vec![false; len];
        for &index in indices.iter().filter(|&&index| index < len) {
            present[index] = true;
        }
        Self {
            dir: dir.to_path_buf(),
            len,
            present: Some(present),
        }
    }

    fn contains(&self, index: usize) -> bool {
        match &self.present {
            Some(present) => present.get(index).copied().unwrap_or(false),
            None => index < self.len,
        }
    }

    /// Scans `dir` and sizes the sequence to one past the highest index found.
    pub fn open(dir: &Path) -> Result<Self> {
        let files = file_utils::files_with_extensions(dir, &[TIFF_EXTENSION])
            .map_err(|e| Error::from_io(dir.display().to_string(), e))?;

        let len = files
            .iter()
            .filter_map(|path| parse_smoothed_index(path))
            .max()
            .map_or(0, |max| max + 1);

        tracing::info!(dir = %dir.display(), len, "Opened smoothed frame directory");

        Ok(Self::new(dir, len))
    }

    fn path(&self, index: usize) -> PathBuf {
        self.dir.join(smoothed_frame_name(index))
    }
}

fn parse_smoothed_index(path: &Path) -> Option<usize> {
    path.file_stem()?
        .to_str()?
        .strip_prefix(SMOOTHED_PREFIX)?
        .parse()
        .ok()
}

impl FrameSource for SmoothedDirectory {
    fn len(&self) -> usize {
        self.len
    }

    fn frame_id(&self, index: usize) -> String {
        self.path(index).display().to_string()
    }

    fn load_frame(&self, index: usize) -> Result<Cow<'_, Frame>> {
        if !self.contains(index) {
            return Err(Error::NotFound {
                id: self.frame_id(index),
            });
        }
        codec::load_frame(&self.path(index)).map(Cow::Owned)
    }
}
