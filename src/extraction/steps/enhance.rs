use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::dilate;

use crate::config::ExtractionConfig;

/// Expose the structural features of a grayscale image as a binary mask.
///
/// Blur suppresses sensor noise, the adaptive threshold binarizes against a
/// local mean so uneven illumination cannot split the grid, and the
/// inversion makes lines and glyph strokes the foreground. Dilation grows
/// the foreground with a plus-shaped element to thicken thin grid lines;
/// skip it when the result feeds per-cell glyph isolation, where strokes
/// must stay at their printed width.
pub fn binarize(gray: &GrayImage, thicken_lines: bool, config: &ExtractionConfig) -> GrayImage {
    let blurred = gaussian_blur_f32(gray, config.blur_sigma);
    let thresholded = adaptive_threshold(
        &blurred,
        config.threshold_block_size,
        config.threshold_bias,
    );
    let inverted = invert(&thresholded);

    if thicken_lines {
        // L1 ball of radius 1 = plus-shaped structuring element
        dilate(&inverted, Norm::L1, 1)
    } else {
        inverted
    }
}

/// Mean adaptive thresholding
///
/// Each pixel is compared against the mean of its `block_size` x `block_size`
/// neighborhood minus a bias; pixels above stay light (255), the rest go
/// dark (0). Window statistics come from a precomputed integral image.
fn adaptive_threshold(img: &GrayImage, block_size: u32, bias: i16) -> GrayImage {
    let (width, height) = img.dimensions();
    let half_block = block_size as i32 / 2;

    let integral = compute_integral_image(img);

    GrayImage::from_fn(width, height, |x, y| {
        let x1 = (x as i32 - half_block).max(0) as u32;
        let y1 = (y as i32 - half_block).max(0) as u32;
        let x2 = (x as i32 + half_block).min(width as i32 - 1) as u32;
        let y2 = (y as i32 + half_block).min(height as i32 - 1) as u32;

        let mean = window_mean(&integral, x1, y1, x2, y2);
        let threshold = mean - bias as f64;

        let pixel = img.get_pixel(x, y).0[0] as f64;
        if pixel > threshold {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

/// Compute the integral image (summed-area table)
fn compute_integral_image(img: &GrayImage) -> Vec<Vec<f64>> {
    let (width, height) = img.dimensions();
    let mut integral = vec![vec![0.0f64; width as usize + 1]; height as usize + 1];

    for y in 0..height as usize {
        for x in 0..width as usize {
            let val = img.get_pixel(x as u32, y as u32).0[0] as f64;
            integral[y + 1][x + 1] = val + integral[y][x + 1] + integral[y + 1][x] - integral[y][x];
        }
    }

    integral
}

/// Compute the mean of a window using the integral image
fn window_mean(integral: &[Vec<f64>], x1: u32, y1: u32, x2: u32, y2: u32) -> f64 {
    let (x1, y1, x2, y2) = (x1 as usize, y1 as usize, x2 as usize + 1, y2 as usize + 1);
    let area = ((x2 - x1) * (y2 - y1)) as f64;

    let sum = integral[y2][x2] - integral[y1][x2] - integral[y2][x1] + integral[y1][x1];
    sum / area
}

/// Flip polarity so dark structure becomes the foreground
fn invert(img: &GrayImage) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        Luma([255 - img.get_pixel(x, y).0[0]])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ExtractionConfig {
        ExtractionConfig::default()
    }

    #[test]
    fn binarize_produces_binary_output() {
        let img = GrayImage::from_fn(50, 50, |x, _| Luma([(x as u8).wrapping_mul(5)]));

        let result = binarize(&img, false, &config());
        for pixel in result.pixels() {
            assert!(
                pixel.0[0] == 0 || pixel.0[0] == 255,
                "Expected binary pixel, got {}",
                pixel.0[0]
            );
        }
    }

    #[test]
    fn binarize_makes_dark_lines_foreground() {
        // Dark horizontal line on a light background
        let mut img = GrayImage::from_pixel(50, 30, Luma([230]));
        for x in 0..50 {
            for y in 14..17 {
                img.put_pixel(x, y, Luma([20]));
            }
        }

        let result = binarize(&img, false, &config());
        assert_eq!(result.get_pixel(25, 15).0[0], 255);
        assert_eq!(result.get_pixel(25, 5).0[0], 0);
    }

    #[test]
    fn uniform_image_has_no_foreground() {
        for value in [0u8, 255u8] {
            let img = GrayImage::from_pixel(40, 40, Luma([value]));
            let result = binarize(&img, true, &config());
            assert!(
                result.pixels().all(|p| p.0[0] == 0),
                "Uniform {} image should binarize to background only",
                value
            );
        }
    }

    #[test]
    fn dilation_thickens_lines() {
        let mut img = GrayImage::from_pixel(40, 40, Luma([230]));
        for x in 5..35 {
            img.put_pixel(x, 20, Luma([20]));
        }

        let thin = binarize(&img, false, &config());
        let thick = binarize(&img, true, &config());

        let count = |img: &GrayImage| img.pixels().filter(|p| p.0[0] == 255).count();
        assert!(
            count(&thick) > count(&thin),
            "Dilation should grow the foreground: {} > {}",
            count(&thick),
            count(&thin)
        );
    }

    #[test]
    fn adaptive_threshold_tolerates_illumination_gradient() {
        // Dark dot on a background whose brightness ramps across the image;
        // a global threshold could not keep both halves clean.
        let mut img = GrayImage::from_fn(60, 20, |x, _| Luma([120 + (x as u8 * 2).min(120)]));
        for y in 8..12 {
            for x in 28..32 {
                img.put_pixel(x, y, Luma([10]));
            }
        }

        let result = binarize(&img, false, &config());
        assert_eq!(result.get_pixel(30, 10).0[0], 255);
        assert_eq!(result.get_pixel(10, 10).0[0], 0);
        assert_eq!(result.get_pixel(50, 10).0[0], 0);
    }
}
