// src/geometry/mod.rs
//
// Mask construction, overlap, boxes and contours. Masks are plain pixel
// buffers; fill, dilation and contour tracing go through OpenCV's imgproc.

pub mod bbox;
pub mod contour;
pub mod mask;

pub use bbox::{bounding_box_of, lowest_point_y};
pub use contour::trace_outer_contour;
pub use mask::{build_mask, dilate_elliptical, elliptical_kernel, overlap_ratio, BinaryMask};
