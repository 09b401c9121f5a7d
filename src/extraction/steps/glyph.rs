use image::{imageops, GrayImage};
use imageproc::rect::Rect;

use crate::config::ExtractionConfig;

/// Foreground value of the binarized cell and of the selected feature
const FOREGROUND: u8 = 255;
/// Transient label for regions visited during the connected-component scan
const SCRATCH: u8 = 64;
/// Background value
const BACKGROUND: u8 = 0;

/// Isolate the digit glyph of one cell onto a classifier-sized canvas.
///
/// Crops the binarized rectified image to the cell box, keeps the largest
/// connected foreground feature whose seed lies inside the central scan
/// region, and rescales it onto a square canvas. Cells without a plausible
/// glyph produce an all-zero canvas.
pub fn extract_digit(binary: &GrayImage, cell: &Rect, config: &ExtractionConfig) -> GrayImage {
    let mut digit = imageops::crop_imm(
        binary,
        cell.left() as u32,
        cell.top() as u32,
        cell.width(),
        cell.height(),
    )
    .to_image();

    let (width, height) = digit.dimensions();

    // Grid-line remnants hug the cell border; restrict the feature search to
    // the central region so only glyph strokes can seed the selection.
    let margin = ((width + height) as f32 / 2.0 / 2.5) as u32;
    let scan_tl = (margin, margin);
    let scan_br = (
        width.saturating_sub(margin),
        height.saturating_sub(margin),
    );

    let Some(bbox) = isolate_largest_feature(&mut digit, scan_tl, scan_br) else {
        return blank_canvas(config.canvas_size);
    };

    let (left, top, right, bottom) = bbox;
    let glyph_width = right - left;
    let glyph_height = bottom - top;
    if glyph_width == 0 || glyph_height == 0 || glyph_width * glyph_height <= config.min_glyph_area
    {
        return blank_canvas(config.canvas_size);
    }

    let glyph = imageops::crop_imm(&digit, left, top, glyph_width, glyph_height).to_image();
    scale_and_center(&glyph, config.canvas_size, config.glyph_margin)
}

/// Keep only the largest connected foreground feature seeded inside the scan
/// region and return its bounding box as (left, top, right, bottom).
///
/// Two-phase fill: every scanned component is first relabeled to a scratch
/// value while its area is measured, then everything still at foreground
/// (features outside the scan region) joins the scratch pool, and only the
/// winning seed is filled back up to the selected value. Returns `None` when
/// the scan region holds no foreground at all.
fn isolate_largest_feature(
    img: &mut GrayImage,
    scan_tl: (u32, u32),
    scan_br: (u32, u32),
) -> Option<(u32, u32, u32, u32)> {
    let (width, height) = img.dimensions();

    let mut max_area = 0u32;
    let mut seed = None;
    for x in scan_tl.0..scan_br.0 {
        for y in scan_tl.1..scan_br.1 {
            if img.get_pixel(x, y).0[0] == FOREGROUND {
                let area = flood_fill(img, (x, y), FOREGROUND, SCRATCH);
                if area > max_area {
                    max_area = area;
                    seed = Some((x, y));
                }
            }
        }
    }

    // Neutralize features outside the scan region so they cannot be mistaken
    // for the selection.
    for x in 0..width {
        for y in 0..height {
            if img.get_pixel(x, y).0[0] == FOREGROUND {
                flood_fill(img, (x, y), FOREGROUND, SCRATCH);
            }
        }
    }

    let seed = seed?;
    flood_fill(img, seed, SCRATCH, FOREGROUND);

    let mut bbox: Option<(u32, u32, u32, u32)> = None;
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        match pixel.0[0] {
            SCRATCH => pixel.0[0] = BACKGROUND,
            FOREGROUND => {
                bbox = Some(match bbox {
                    None => (x, y, x, y),
                    Some((l, t, r, b)) => (l.min(x), t.min(y), r.max(x), b.max(y)),
                });
            }
            _ => {}
        }
    }
    bbox
}

/// 4-connected flood fill; returns the number of pixels repainted
fn flood_fill(img: &mut GrayImage, seed: (u32, u32), target: u8, replacement: u8) -> u32 {
    if target == replacement || img.get_pixel(seed.0, seed.1).0[0] != target {
        return 0;
    }

    let (width, height) = img.dimensions();
    let mut filled = 0u32;
    let mut stack = vec![seed];

    while let Some((x, y)) = stack.pop() {
        if img.get_pixel(x, y).0[0] != target {
            continue;
        }
        img.put_pixel(x, y, image::Luma([replacement]));
        filled += 1;

        if x > 0 {
            stack.push((x - 1, y));
        }
        if x + 1 < width {
            stack.push((x + 1, y));
        }
        if y > 0 {
            stack.push((x, y - 1));
        }
        if y + 1 < height {
            stack.push((x, y + 1));
        }
    }

    filled
}

/// Rescale a glyph onto a square canvas, preserving aspect ratio.
///
/// The longer side is fitted to `size - margin`; the shorter side is padded
/// so the glyph sits centered, with the two pads differing by at most one
/// pixel when the centered dimension is odd.
fn scale_and_center(glyph: &GrayImage, size: u32, margin: u32) -> GrayImage {
    let (width, height) = glyph.dimensions();
    let inner = size - margin;

    let (new_width, new_height, left_pad, top_pad) = if height > width {
        let top_pad = margin / 2;
        let new_width = (inner * width / height).max(1);
        let (left_pad, _) = center_pad(size, new_width);
        (new_width, inner, left_pad, top_pad)
    } else {
        let left_pad = margin / 2;
        let new_height = (inner * height / width).max(1);
        let (top_pad, _) = center_pad(size, new_height);
        (inner, new_height, left_pad, top_pad)
    };

    let resized = imageops::resize(
        glyph,
        new_width,
        new_height,
        imageops::FilterType::Triangle,
    );

    let mut canvas = GrayImage::new(size, size);
    imageops::replace(&mut canvas, &resized, left_pad as i64, top_pad as i64);
    canvas
}

/// Leading and trailing pad for centering a length inside a span
fn center_pad(size: u32, length: u32) -> (u32, u32) {
    let lead = (size - length) / 2;
    if length % 2 == 0 {
        (lead, lead)
    } else {
        (lead, lead + 1)
    }
}

fn blank_canvas(size: u32) -> GrayImage {
    GrayImage::new(size, size)
}

/// True when a canvas holds no foreground at all
pub fn is_blank(canvas: &GrayImage) -> bool {
    canvas.pixels().all(|p| p.0[0] == 0)
}
