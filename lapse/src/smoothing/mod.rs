//! Temporal smoothing of a frame sequence.
//!
//! Each output frame is a weighted average of its temporal neighbors at
//! offsets that are multiples of `jump`. The window shrinks near the ends of
//! the sequence so no frame outside `[0, len)` is ever requested:
//!
//! | index              | window                         |
//! |--------------------|--------------------------------|
//! | `0`, `len - 1`     | frame copied unchanged         |
//! | `jump`, `len-1-jump` | 3 taps, `edge_kernel`        |
//! | otherwise          | 5 taps, `kernel`               |
//!
//! Any other index whose window still reaches past the sequence fails with
//! [`Error::OutOfRange`].


use std::borrow::Cow;

use crate::common::{par_rows_mut, Buffer2};
use crate::config::SmoothingConfig;
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::io::FrameSource;

const EDGE_OFFSETS: [isize; 3] = [-1, 0, 1];
const FULL_OFFSETS: [isize; 5] = [-2, -1, 0, 1, 2];

/// Smoothing window applied at one frame index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// First or last frame: no neighbors on one side, output is the input.
    Passthrough,
    /// One stride from either end: offsets `{-1, 0, 1} * jump`.
    ThreeTap,
    /// Interior: offsets `{-2, -1, 0, 1, 2} * jump`.
    FiveTap,
}

impl Window {
    /// Window for frame `index` of a sequence of `len` frames.
    pub fn for_index(index: usize, len: usize, jump: usize) -> Self {
        if index == 0 || index + 1 == len {
            Window::Passthrough
        } else if index == jump || index + 1 + jump == len {
            Window::ThreeTap
        } else {
            Window::FiveTap
        }
    }
}

/// Smooths frame `index` of `source`.
///
/// Loads at most five frames. The result is always a new double-precision
/// frame, even for the passthrough window.
pub fn smooth<S>(source: &S, index: usize, config: &SmoothingConfig) -> Result<Frame>
where
    S: FrameSource + ?Sized,
{
    config.validate();

    let len = source.len();
    if index >= len {
        return Err(Error::OutOfRange {
            index,
            offset: 0,
            len,
        });
    }

    match Window::for_index(index, len, config.jump) {
        Window::Passthrough => Ok(source.load_frame(index)?.into_owned()),
        Window::ThreeTap => {
            weighted_window(source, index, config.jump, &EDGE_OFFSETS, &config.edge_kernel)
        }
        Window::FiveTap => {
            weighted_window(source, index, config.jump, &FULL_OFFSETS, &config.kernel)
        }
    }
}

/// Resolves `index + offset * jump`, failing if it leaves `[0, len)`.
fn neighbor_index(index: usize, offset: isize, jump: usize, len: usize) -> Result<usize> {
    let delta = offset * jump as isize;
    let position = index as isize + delta;
    if position < 0 || position >= len as isize {
        return Err(Error::OutOfRange {
            index,
            offset: delta,
            len,
        });
    }
    Ok(position as usize)
}

fn weighted_window<S>(
    source: &S,
    index: usize,
    jump: usize,
    offsets: &[isize],
    weights: &[f64],
) -> Result<Frame>
where
    S: FrameSource + ?Sized,
{
    debug_assert_eq!(offsets.len(), weights.len());

    // Bounds are checked for the whole window before anything is loaded.
    let len = source.len();
    let positions = offsets
        .iter()
        .map(|&offset| neighbor_index(index, offset, jump, len))
        .collect::<Result<Vec<_>>>()?;

    let frames = positions
        .iter()
        .map(|&position| source.load_frame(position))
        .collect::<Result<Vec<Cow<'_, Frame>>>>()?;

    let center = &frames[offsets.len() / 2];
    let shape = center.shape();
    if let Some(other) = frames.iter().find(|f| f.shape() != shape) {
        return Err(Error::ShapeMismatch {
            expected: shape,
            actual: other.shape(),
        });
    }

    let planes: Vec<&[f64]> = frames.iter().map(|f| f.pixels()).collect();
    Ok(weighted_average(&planes, weights, shape.width, shape.height).into())
}

/// Per-pixel `sum(w_i * f_i) / sum(w_i)`, accumulated in f64.
pub(crate) fn weighted_average(
    planes: &[&[f64]],
    weights: &[f64],
    width: usize,
    height: usize,
) -> Buffer2<f64> {
    let weight_sum: f64 = weights.iter().sum();
    let mut output = vec![0.0f64; width * height];

    par_rows_mut(&mut output, width, |y, row| {
        let row_start = y * width;
        for (x, out) in row.iter_mut().enumerate() {
            let i = row_start + x;
            let mut acc = 0.0f64;
            for (plane, &w) in planes.iter().zip(weights) {
                acc += w * plane[i];
            }
            *out = acc / weight_sum;
        }
    });

    Buffer2::new(width, height, output)
}
