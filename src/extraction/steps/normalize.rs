use image::{imageops::FilterType, DynamicImage, GenericImageView};

use crate::config::ExtractionConfig;

/// Resize to the working height and trim dark border margins.
///
/// The crop collapses to a 1x1 image when nothing in the frame exceeds the
/// darkness threshold; downstream grid location then fails with
/// `GridNotFound` instead of running on empty data.
pub fn apply(image: &DynamicImage, config: &ExtractionConfig) -> DynamicImage {
    let resized = resize_to_height(image, config.target_height);
    autocrop(&resized, config.crop_threshold)
}

/// Resize to a target height, preserving aspect ratio
fn resize_to_height(image: &DynamicImage, target_height: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    if height == target_height {
        return image.clone();
    }

    let ratio = target_height as f32 / height as f32;
    let new_width = ((width as f32 * ratio) as u32).max(1);
    image.resize_exact(new_width, target_height, FilterType::Lanczos3)
}

/// Crop away border rows and columns whose brightest channel does not exceed
/// the threshold
fn autocrop(image: &DynamicImage, threshold: u8) -> DynamicImage {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();

    // Brightest channel seen in each column and each row
    let mut col_max = vec![0u8; width as usize];
    let mut row_max = vec![0u8; height as usize];
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let value = pixel.0[0].max(pixel.0[1]).max(pixel.0[2]);
        col_max[x as usize] = col_max[x as usize].max(value);
        row_max[y as usize] = row_max[y as usize].max(value);
    }

    let lit_cols: Vec<u32> = (0..width)
        .filter(|&x| col_max[x as usize] > threshold)
        .collect();
    let lit_rows: Vec<u32> = (0..height)
        .filter(|&y| row_max[y as usize] > threshold)
        .collect();

    match (lit_cols.first(), lit_cols.last(), lit_rows.first(), lit_rows.last()) {
        (Some(&x0), Some(&x1), Some(&y0), Some(&y1)) => {
            image.crop_imm(x0, y0, x1 - x0 + 1, y1 - y0 + 1)
        }
        _ => image.crop_imm(0, 0, 1, 1),
    }
}
