//! Dense Lucas-Kanade optical flow between two frames.
//!
//! For each pixel the brightness-constancy equations of its Gaussian-weighted
//! neighborhood are solved in closed form:
//!
//! ```text
//! | Σ Ix²   Σ IxIy | |vx|     | Σ IxIt |
//! | Σ IxIy  Σ Iy²  | |vy| = - | Σ IyIt |
//! ```
//!
//! The smaller eigenvalue of the structure tensor serves as the reliability
//! of the estimate. Velocities are kept only where reliability exceeds
//! [`FlowConfig::threshold`] and are exactly zero everywhere else.
//!
//! All per-pixel arithmetic after the gradients is single precision.

mod gaussian;
mod gradient;


use rayon::prelude::*;

use crate::common::Buffer2;
use crate::config::FlowConfig;
use crate::error::{Error, Result};
use crate::frame::{FlowField, Frame, FrameShape};

pub use gaussian::{gaussian_blur, gaussian_kernel_1d};
pub use gradient::{gradient_x, gradient_y, temporal_difference};

/// Added to the discriminant and to the determinant so flat and
/// rank-deficient neighborhoods never divide by zero.
pub const STABILIZER: f32 = 1e-6;

/// Smallest frame side the second-order border stencil accepts.
const MIN_SIDE: usize = 3;

/// Estimates the flow from `frame_a` to `frame_b`.
///
/// # Panics
///
/// Panics if `config` fails [`FlowConfig::validate`].
pub fn estimate(frame_a: &Frame, frame_b: &Frame, config: &FlowConfig) -> Result<FlowField> {
    config.validate();

    let shape = frame_a.shape();
    if frame_b.shape() != shape {
        return Err(Error::ShapeMismatch {
            expected: shape,
            actual: frame_b.shape(),
        });
    }
    if shape.width < MIN_SIDE || shape.height < MIN_SIDE {
        return Err(Error::FrameTooSmall { shape });
    }

    let gradients = GradientField::compute(frame_a, frame_b);
    let moments = WeightedMoments::compute(&gradients, config);

    Ok(moments.solve(shape, config.threshold))
}

/// Spatial and temporal derivatives of one frame pair.
struct GradientField {
    dx: Buffer2<f32>,
    dy: Buffer2<f32>,
    dt: Buffer2<f32>,
}

impl GradientField {
    fn compute(frame_a: &Frame, frame_b: &Frame) -> Self {
        let a = frame_a.buffer();
        Self {
            dx: gradient_x(a),
            dy: gradient_y(a),
            dt: temporal_difference(a, frame_b.buffer()),
        }
    }
}

/// Gaussian-weighted sums of the five gradient products.
struct WeightedMoments {
    dx2: Buffer2<f32>,
    dy2: Buffer2<f32>,
    dxdy: Buffer2<f32>,
    dxdt: Buffer2<f32>,
    dydt: Buffer2<f32>,
}

impl WeightedMoments {
    fn compute(g: &GradientField, config: &FlowConfig) -> Self {
        let radius = config.kernel_radius();
        let blur = |product: Buffer2<f32>| gaussian_blur(&product, config.sigma, radius);

        Self {
            dx2: blur(g.dx.zip_map(&g.dx, |&a, &b| a * b)),
            dy2: blur(g.dy.zip_map(&g.dy, |&a, &b| a * b)),
            dxdy: blur(g.dx.zip_map(&g.dy, |&a, &b| a * b)),
            dxdt: blur(g.dx.zip_map(&g.dt, |&a, &b| a * b)),
            dydt: blur(g.dy.zip_map(&g.dt, |&a, &b| a * b)),
        }
    }

    fn solve(&self, shape: FrameShape, threshold: f32) -> FlowField {
        let n = shape.pixel_count();
        let mut vx = vec![0.0f32; n];
        let mut vy = vec![0.0f32; n];
        let mut reliability = vec![0.0f32; n];

        vx.par_iter_mut()
            .zip(vy.par_iter_mut())
            .zip(reliability.par_iter_mut())
            .enumerate()
            .for_each(|(i, ((out_vx, out_vy), out_rel))| {
                let (pvx, pvy, rel) = solve_pixel(
                    self.dx2[i],
                    self.dy2[i],
                    self.dxdy[i],
                    self.dxdt[i],
                    self.dydt[i],
                    threshold,
                );
                *out_vx = pvx;
                *out_vy = pvy;
                *out_rel = rel;
            });

        let (w, h) = (shape.width, shape.height);
        FlowField::new(
            Buffer2::new(w, h, vx),
            Buffer2::new(w, h, vy),
            Buffer2::new(w, h, reliability),
        )
    }
}

/// Closed-form 2x2 solve for one pixel. Returns `(vx, vy, reliability)`.
#[inline]
fn solve_pixel(sxx: f32, syy: f32, sxy: f32, sxt: f32, syt: f32, threshold: f32) -> (f32, f32, f32) {
    let det = sxx * syy - sxy * sxy;
    let trace = sxx + syy;
    let root = (STABILIZER + trace * trace - 4.0 * det).sqrt();
    let reliability = ((trace + root) / 2.0).min((trace - root) / 2.0);

    // NaN reliability fails the comparison and is masked too.
    if reliability > threshold {
        let denom = det + STABILIZER;
        let vx = (sxy * syt - syy * sxt) / denom;
        let vy = (sxy * sxt - sxx * syt) / denom;
        (vx, vy, reliability)
    } else {
        (0.0, 0.0, reliability)
    }
}
