use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};

use crate::error::SudokuError;

/// Rectified grids smaller than this cannot hold 81 cells
const MIN_GRID_SIDE: u32 = 9;

/// Corner points of the puzzle border, in cyclic order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Corners {
    pub top_left: (f32, f32),
    pub top_right: (f32, f32),
    pub bottom_right: (f32, f32),
    pub bottom_left: (f32, f32),
}

/// Locate the four extreme corners of the largest outer contour.
///
/// The bottom-right corner carries the largest (x + y), the top-left the
/// smallest (x + y), the top-right the largest (x - y) and the bottom-left
/// the smallest (x - y).
pub fn find_corners(binary: &GrayImage) -> Result<Corners, SudokuError> {
    let contours: Vec<Contour<i32>> = find_contours(binary);

    let polygon = contours
        .iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter(|c| !c.points.is_empty())
        .max_by(|a, b| contour_area(a).total_cmp(&contour_area(b)))
        .ok_or(SudokuError::GridNotFound)?;

    let extreme = |key: fn(i32, i32) -> i32, largest: bool| {
        let point = if largest {
            polygon.points.iter().max_by_key(|p| key(p.x, p.y))
        } else {
            polygon.points.iter().min_by_key(|p| key(p.x, p.y))
        };
        // The polygon is non-empty by the filter above
        let point = point.unwrap_or(&polygon.points[0]);
        (point.x as f32, point.y as f32)
    };

    Ok(Corners {
        top_left: extreme(|x, y| x + y, false),
        top_right: extreme(|x, y| x - y, true),
        bottom_right: extreme(|x, y| x + y, true),
        bottom_left: extreme(|x, y| x - y, false),
    })
}

/// Shoelace area of a contour's point sequence
fn contour_area(contour: &Contour<i32>) -> f64 {
    let points = &contour.points;
    if points.len() < 3 {
        return 0.0;
    }

    let mut doubled = 0i64;
    for i in 0..points.len() {
        let p = &points[i];
        let q = &points[(i + 1) % points.len()];
        doubled += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
    }
    (doubled.abs() as f64) / 2.0
}

/// Warp the quadrilateral spanned by the corners to a fronto-parallel square.
///
/// The square's side is the longest of the four corner-to-corner edges, so
/// the sharpest-resolved edge sets the sampling density. The warp reads the
/// grayscale (non-thresholded) image to preserve glyph stroke fidelity for
/// classification.
pub fn rectify(gray: &GrayImage, corners: &Corners) -> Result<GrayImage, SudokuError> {
    let side = [
        distance(corners.bottom_right, corners.top_right),
        distance(corners.top_left, corners.bottom_left),
        distance(corners.bottom_right, corners.bottom_left),
        distance(corners.top_left, corners.top_right),
    ]
    .into_iter()
    .fold(0.0f32, f32::max);

    let side_px = side as u32;
    if side_px < MIN_GRID_SIDE {
        return Err(SudokuError::GridNotFound);
    }

    let src = [
        corners.top_left,
        corners.top_right,
        corners.bottom_right,
        corners.bottom_left,
    ];
    let dst = [
        (0.0, 0.0),
        (side - 1.0, 0.0),
        (side - 1.0, side - 1.0),
        (0.0, side - 1.0),
    ];

    // Degenerate quadrilaterals (collinear or coincident corners) admit no
    // projective transform
    let projection =
        Projection::from_control_points(src, dst).ok_or(SudokuError::GridNotFound)?;

    let mut rectified = GrayImage::new(side_px, side_px);
    warp_into(
        gray,
        &projection,
        Interpolation::Bilinear,
        Luma([0u8]),
        &mut rectified,
    );
    Ok(rectified)
}

fn distance(p1: (f32, f32), p2: (f32, f32)) -> f32 {
    let dx = p2.0 - p1.0;
    let dy = p2.1 - p1.1;
    (dx * dx + dy * dy).sqrt()
}
