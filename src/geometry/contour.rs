// src/geometry/contour.rs
//
// Mask → polygon conversion for segmentation backends that hand back
// per-instance masks instead of contours. Only the largest outer contour
// is kept.

use super::mask::BinaryMask;
use crate::error::AnalysisError;
use crate::types::Point;
use opencv::{
    core::{self, Vector},
    imgproc,
};

/// Outer boundary of the largest blob as a simplified polygon
/// (straight runs collapsed to their end points). None when the mask is empty.
pub fn trace_outer_contour(mask: &BinaryMask) -> Result<Option<Vec<Point>>, AnalysisError> {
    if mask.width == 0 || mask.height == 0 || mask.is_empty() {
        return Ok(None);
    }

    let mut image = mask.to_mat()?;
    let mut contours = Vector::<Vector<core::Point>>::new();
    imgproc::find_contours(
        &mut image,
        &mut contours,
        imgproc::RETR_EXTERNAL,
        imgproc::CHAIN_APPROX_SIMPLE,
        core::Point::new(0, 0),
    )?;

    let mut best: Option<(f64, Vector<core::Point>)> = None;
    for contour in contours {
        let area = imgproc::contour_area(&contour, false)?;
        let better = match &best {
            None => true,
            Some((best_area, best_contour)) => {
                area > *best_area || (area == *best_area && contour.len() > best_contour.len())
            }
        };
        if better {
            best = Some((area, contour));
        }
    }

    Ok(best.map(|(_, contour)| {
        contour
            .iter()
            .map(|p| (p.x as f32, p.y as f32))
            .collect()
    }))
}
