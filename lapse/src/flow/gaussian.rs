//! Separable Gaussian smoothing with edge replication.
//!
//! Used to aggregate the structure-tensor products over a Gaussian window
//! around each pixel. Two 1D passes (rows, then columns) give O(n×k) instead
//! of O(n×k²). Samples outside the image take the value of the nearest edge
//! pixel.

use crate::common::{par_rows_mut, Buffer2};

/// Normalized 1D Gaussian kernel with `radius` taps on each side.
///
/// Length is `2 * radius + 1`; the weights sum to 1. See
/// [`FlowConfig::kernel_radius`](crate::FlowConfig::kernel_radius) for the
/// radius used by flow estimation.
pub fn gaussian_kernel_1d(sigma: f32, radius: usize) -> Vec<f32> {
    assert!(sigma > 0.0, "Sigma must be positive");

    let size = 2 * radius + 1;
    let mut kernel = vec![0.0f32; size];

    let two_sigma_sq = 2.0 * sigma * sigma;
    let mut sum = 0.0f32;

    for (i, k) in kernel.iter_mut().enumerate() {
        let x = i as f32 - radius as f32;
        let value = (-x * x / two_sigma_sq).exp();
        *k = value;
        sum += value;
    }

    for v in &mut kernel {
        *v /= sum;
    }

    kernel
}

/// Gaussian-smooths `input` with standard deviation `sigma` along both axes.
pub fn gaussian_blur(input: &Buffer2<f32>, sigma: f32, radius: usize) -> Buffer2<f32> {
    let kernel = gaussian_kernel_1d(sigma, radius);
    let (width, height) = (input.width(), input.height());

    if width == 0 || height == 0 {
        return input.clone();
    }

    let mut temp = vec![0.0f32; width * height];
    convolve_rows(input.pixels(), &mut temp, width, &kernel);

    let mut output = vec![0.0f32; width * height];
    convolve_cols(&temp, &mut output, width, height, &kernel);

    Buffer2::new(width, height, output)
}

#[inline]
fn clamp_index(i: isize, len: usize) -> usize {
    i.clamp(0, len as isize - 1) as usize
}

fn convolve_rows(input: &[f32], output: &mut [f32], width: usize, kernel: &[f32]) {
    let radius = kernel.len() / 2;

    par_rows_mut(output, width, |y, out_row| {
        let in_row = &input[y * width..(y + 1) * width];
        for (x, out) in out_row.iter_mut().enumerate() {
            let mut sum = 0.0f32;
            for (k, &kval) in kernel.iter().enumerate() {
                let sx = clamp_index(x as isize + k as isize - radius as isize, width);
                sum += in_row[sx] * kval;
            }
            *out = sum;
        }
    });
}

fn convolve_cols(input: &[f32], output: &mut [f32], width: usize, height: usize, kernel: &[f32]) {
    let radius = kernel.len() / 2;

    par_rows_mut(output, width, |y, out_row| {
        for (k, &kval) in kernel.iter().enumerate() {
            let sy = clamp_index(y as isize + k as isize - radius as isize, height);
            let in_row = &input[sy * width..(sy + 1) * width];
            for (out, &v) in out_row.iter_mut().zip(in_row) {
                *out += v * kval;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FlowConfig;

    /// Kernel radius flow estimation uses for `sigma` with the default truncation.
    fn radius(sigma: f32) -> usize {
        FlowConfig::new(sigma, 0.0).kernel_radius()
    }

    #[test]
    fn test_kernel_normalization() {
        for sigma in [0.5, 1.0, 2.0, 3.5] {
            let kernel = gaussian_kernel_1d(sigma, radius(sigma));
            let sum: f32 = kernel.iter().sum();
            assert!((sum - 1.0).abs() < 1e-6, "sigma={sigma} sum={sum}");
        }
    }

    #[test]
    fn test_kernel_size_follows_config_radius() {
        assert_eq!(gaussian_kernel_1d(1.0, radius(1.0)).len(), 9);
        assert_eq!(gaussian_kernel_1d(2.0, radius(2.0)).len(), 17);

        let narrow = FlowConfig {
            truncate: 3.0,
            ..FlowConfig::default()
        };
        assert_eq!(gaussian_kernel_1d(1.0, narrow.kernel_radius()).len(), 7);
        assert_eq!(gaussian_kernel_1d(0.1, radius(0.1)), vec![1.0]);
    }

    #[test]
    fn test_kernel_symmetric_with_center_peak() {
        let kernel = gaussian_kernel_1d(1.5, radius(1.5));
        let n = kernel.len();
        for i in 0..n / 2 {
            assert!((kernel[i] - kernel[n - 1 - i]).abs() < 1e-7);
            assert!(kernel[i] < kernel[n / 2]);
        }
    }

    #[test]
    #[should_panic(expected = "Sigma must be positive")]
    fn test_zero_sigma_panics() {
        gaussian_kernel_1d(0.0, 4);
    }

    #[test]
    fn test_uniform_input_is_preserved() {
        let input = Buffer2::new_filled(7, 5, 3.25f32);
        let output = gaussian_blur(&input, 1.0, radius(1.0));
        for &v in output.iter() {
            assert!((v - 3.25).abs() < 1e-5);
        }
    }

    #[test]
    fn test_impulse_spreads_as_kernel_outer_product() {
        let mut input = Buffer2::new_default(15, 15);
        input[(7, 7)] = 1.0f32;
        let output = gaussian_blur(&input, 1.0, radius(1.0));
        let kernel = gaussian_kernel_1d(1.0, radius(1.0));

        for dy in 0..kernel.len() {
            for dx in 0..kernel.len() {
                let v = output[(3 + dx, 3 + dy)];
                assert!((v - kernel[dx] * kernel[dy]).abs() < 1e-7);
            }
        }
        let total: f32 = output.iter().sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_edges_replicate_nearest_pixel() {
        // Step at the left border: replicated edge keeps the left column at 1.
        let input = Buffer2::from_fn(12, 3, |x, _| if x < 6 { 1.0f32 } else { 0.0 });
        let output = gaussian_blur(&input, 1.0, radius(1.0));
        for y in 0..3 {
            assert!((output[(0, y)] - 1.0).abs() < 1e-4);
            assert!(output[(11, y)].abs() < 1e-4);
        }
    }

    #[test]
    fn test_kernel_wider_than_image() {
        let input = Buffer2::from_fn(3, 3, |x, y| (x + y) as f32);
        let output = gaussian_blur(&input, 5.0, radius(5.0));
        let min = input.iter().cloned().fold(f32::INFINITY, f32::min);
        let max = input.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        for &v in output.iter() {
            assert!(v >= min - 1e-5 && v <= max + 1e-5);
        }
    }
}
