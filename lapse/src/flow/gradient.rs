//! Finite-difference derivatives of a frame.
//!
//! Interior pixels use the central difference `(f[i+1] - f[i-1]) / 2`. The
//! first and last pixel along each axis use second-order one-sided stencils,
//! so every derivative has the same accuracy order across the whole frame.
//! Differences are taken in double precision and stored as `f32`.

use crate::common::{par_rows_mut, Buffer2};

/// Derivative along a sampled line of `n >= 3` values at position `i`.
#[inline]
fn derivative_at(sample: impl Fn(usize) -> f64, i: usize, n: usize) -> f64 {
    if i == 0 {
        (-3.0 * sample(0) + 4.0 * sample(1) - sample(2)) / 2.0
    } else if i == n - 1 {
        (3.0 * sample(n - 1) - 4.0 * sample(n - 2) + sample(n - 3)) / 2.0
    } else {
        (sample(i + 1) - sample(i - 1)) / 2.0
    }
}

/// Derivative along columns (x). Requires `width >= 3`.
pub fn gradient_x(input: &Buffer2<f64>) -> Buffer2<f32> {
    let (width, height) = (input.width(), input.height());
    debug_assert!(width >= 3);

    let mut output = vec![0.0f32; width * height];
    par_rows_mut(&mut output, width, |y, out_row| {
        let row = input.row(y);
        for (x, out) in out_row.iter_mut().enumerate() {
            *out = derivative_at(|i| row[i], x, width) as f32;
        }
    });

    Buffer2::new(width, height, output)
}

/// Derivative along rows (y). Requires `height >= 3`.
pub fn gradient_y(input: &Buffer2<f64>) -> Buffer2<f32> {
    let (width, height) = (input.width(), input.height());
    debug_assert!(height >= 3);

    let mut output = vec![0.0f32; width * height];
    par_rows_mut(&mut output, width, |y, out_row| {
        for (x, out) in out_row.iter_mut().enumerate() {
            *out = derivative_at(|j| *input.get(x, j), y, height) as f32;
        }
    });

    Buffer2::new(width, height, output)
}

/// Per-pixel difference `b - a`, taken in f64 and stored as f32.
pub fn temporal_difference(a: &Buffer2<f64>, b: &Buffer2<f64>) -> Buffer2<f32> {
    b.zip_map(a, |&vb, &va| (vb - va) as f32)
}
