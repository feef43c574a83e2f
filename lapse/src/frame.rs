//! Frame and flow-field containers.

use std::fmt;

use crate::common::Buffer2;

/// Frame dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameShape {
    /// Number of columns.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
}

impl FrameShape {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    pub fn of<T>(buffer: &Buffer2<T>) -> Self {
        Self::new(buffer.width(), buffer.height())
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }
}

impl fmt::Display for FrameShape {
    /// Prints `(rows, cols)`, the order arrays are usually described in.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.height, self.width)
    }
}

/// Single-channel intensity frame, stored in double precision.
///
/// Frames are never modified after construction; smoothing and flow
/// estimation always allocate new buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pixels: Buffer2<f64>,
}

impl Frame {
    pub fn new(width: usize, height: usize, pixels: Vec<f64>) -> Self {
        Self {
            pixels: Buffer2::new(width, height, pixels),
        }
    }

    pub fn filled(width: usize, height: usize, value: f64) -> Self {
        Self {
            pixels: Buffer2::new_filled(width, height, value),
        }
    }

    pub fn from_fn<F>(width: usize, height: usize, f: F) -> Self
    where
        F: FnMut(usize, usize) -> f64,
    {
        Self {
            pixels: Buffer2::from_fn(width, height, f),
        }
    }

    #[inline]
    pub fn shape(&self) -> FrameShape {
        FrameShape::of(&self.pixels)
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.pixels.width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.pixels.height()
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f64 {
        *self.pixels.get(x, y)
    }

    #[inline]
    pub fn pixels(&self) -> &[f64] {
        self.pixels.pixels()
    }

    #[inline]
    pub fn buffer(&self) -> &Buffer2<f64> {
        &self.pixels
    }
}

impl From<Buffer2<f64>> for Frame {
    fn from(pixels: Buffer2<f64>) -> Self {
        Self { pixels }
    }
}

/// Per-pixel velocity and reliability for one frame pair.
///
/// `vx` and `vy` are already zero wherever `reliability` did not exceed the
/// threshold used to compute the field.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowField {
    pub vx: Buffer2<f32>,
    pub vy: Buffer2<f32>,
    pub reliability: Buffer2<f32>,
}

impl FlowField {
    /// # Panics
    ///
    /// Panics if the three planes differ in shape.
    pub fn new(vx: Buffer2<f32>, vy: Buffer2<f32>, reliability: Buffer2<f32>) -> Self {
        assert!(
            vx.same_shape(&vy) && vx.same_shape(&reliability),
            "flow planes must share one shape"
        );
        Self {
            vx,
            vy,
            reliability,
        }
    }

    pub fn shape(&self) -> FrameShape {
        FrameShape::of(&self.vx)
    }

    /// Number of pixels whose reliability exceeds `threshold`.
    pub fn reliable_count(&self, threshold: f32) -> usize {
        self.reliability.iter().filter(|&&r| r > threshold).count()
    }

    /// Mean speed over pixels whose reliability exceeds `threshold`,
    /// or 0 if there are none.
    pub fn mean_speed(&self, threshold: f32) -> f32 {
        let (sum, count) = self
            .vx
            .iter()
            .zip(self.vy.iter())
            .zip(self.reliability.iter())
            .filter(|(_, &r)| r > threshold)
            .fold((0.0f64, 0usize), |(sum, count), ((&vx, &vy), _)| {
                (sum + (vx as f64).hypot(vy as f64), count + 1)
            });

        if count == 0 {
            0.0
        } else {
            (sum / count as f64) as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_from_fn_layout() {
        let frame = Frame::from_fn(3, 2, |x, y| (10 * y + x) as f64);
        assert_eq!(frame.shape(), FrameShape::new(3, 2));
        assert_eq!(frame.get(2, 1), 12.0);
        assert_eq!(frame.pixels(), &[0.0, 1.0, 2.0, 10.0, 11.0, 12.0]);
    }

    #[test]
    fn test_shape_display_rows_first() {
        assert_eq!(FrameShape::new(11, 10).to_string(), "(10, 11)");
        assert_eq!(FrameShape::new(4, 3).pixel_count(), 12);
    }

    #[test]
    fn test_flow_field_statistics() {
        let vx = Buffer2::new(2, 2, vec![3.0, 0.0, 1.0, 0.0]);
        let vy = Buffer2::new(2, 2, vec![4.0, 0.0, 0.0, 0.0]);
        let reliability = Buffer2::new(2, 2, vec![1.0, 0.0, 0.5, -0.1]);
        let field = FlowField::new(vx, vy, reliability);

        assert_eq!(field.reliable_count(0.01), 2);
        assert!((field.mean_speed(0.01) - 3.0).abs() < 1e-6);
        assert_eq!(field.mean_speed(10.0), 0.0);
    }

    #[test]
    #[should_panic(expected = "flow planes must share one shape")]
    fn test_flow_field_rejects_mixed_shapes() {
        FlowField::new(
            Buffer2::new_default(2, 2),
            Buffer2::new_default(2, 2),
            Buffer2::new_default(2, 3),
        );
    }
}
