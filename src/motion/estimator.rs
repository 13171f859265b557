// src/motion/estimator.rs

use super::flow::{flow_magnitudes, FlowParams};
use super::gray::GrayFrame;
use tracing::{trace, warn};

/// Median optical-flow magnitude inside `bbox` between two frames.
///
/// `bbox` is `[x1, y1, x2, y2]`; coordinates are truncated to integers and
/// the crop is `[x1, x2) x [y1, y2)`, clamped to each frame. Any degraded
/// input (missing frame, malformed box, empty or mismatched crop) gives 0.0,
/// and so does a crop OpenCV refuses.
pub fn flow_magnitude(
    prev: Option<&GrayFrame>,
    curr: Option<&GrayFrame>,
    bbox: Option<&[f32]>,
    params: &FlowParams,
) -> f32 {
    let (Some(prev), Some(curr), Some(bbox)) = (prev, curr, bbox) else {
        return 0.0;
    };
    if bbox.len() != 4 || bbox.iter().any(|v| !v.is_finite()) {
        trace!("Malformed bbox {:?}, no motion", bbox);
        return 0.0;
    }

    let [x1, y1, x2, y2] = [bbox[0], bbox[1], bbox[2], bbox[3]].map(|v| v as i64);
    let (Some(a), Some(b)) = (prev.crop(x1, y1, x2, y2), curr.crop(x1, y1, x2, y2)) else {
        return 0.0;
    };
    if !a.same_size(&b) {
        return 0.0;
    }

    match flow_magnitudes(&a, &b, params) {
        Ok(magnitudes) => median(magnitudes),
        Err(err) => {
            warn!("Optical flow failed on {}x{} crop: {}", a.width, a.height, err);
            0.0
        }
    }
}

/// Median with the mean of the two middle values for even counts; 0.0 when empty.
pub fn median(mut values: Vec<f32>) -> f32 {
    values.retain(|v| v.is_finite());
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}
