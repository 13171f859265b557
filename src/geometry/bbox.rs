// src/geometry/bbox.rs

use crate::types::{BoundingBox, Point};
use tracing::debug;

/// Axis-aligned box around a contour, clamped to `[0, width-1] x [0, height-1]`.
///
/// Returns None for an absent/empty contour, a zero-sized frame, or a
/// contour with non-finite coordinates. Never panics.
pub fn bounding_box_of(contour: Option<&[Point]>, height: usize, width: usize) -> Option<BoundingBox> {
    let points = contour.filter(|c| !c.is_empty())?;
    if width == 0 || height == 0 {
        return None;
    }

    if points.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
        debug!("Contour has non-finite points, no bounding box");
        return None;
    }

    let mut x1 = i32::MAX;
    let mut y1 = i32::MAX;
    let mut x2 = i32::MIN;
    let mut y2 = i32::MIN;
    for &(x, y) in points {
        let (xi, yi) = (x as i32, y as i32);
        x1 = x1.min(xi);
        y1 = y1.min(yi);
        x2 = x2.max(xi);
        y2 = y2.max(yi);
    }

    let max_x = width as i32 - 1;
    let max_y = height as i32 - 1;
    Some(BoundingBox {
        x1: x1.clamp(0, max_x),
        y1: y1.clamp(0, max_y),
        x2: x2.clamp(0, max_x),
        y2: y2.clamp(0, max_y),
    })
}

/// Largest image-space y among contour points (the lowest point on screen).
pub fn lowest_point_y(contour: Option<&[Point]>) -> Option<f32> {
    contour?
        .iter()
        .map(|p| p.1)
        .filter(|y| y.is_finite())
        .fold(None, |acc: Option<f32>, y| Some(acc.map_or(y, |m| m.max(y))))
}
