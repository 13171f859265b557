// src/geometry/mask.rs
//
// Binary occupancy masks built from segmentation contours. Rasterization
// and morphology go through OpenCV; the overlap count is a plain pass over
// the buffers.

use crate::error::AnalysisError;
use crate::types::Point;
use opencv::{
    core::{self, Mat, Scalar, Size, Vector},
    imgproc,
    prelude::*,
};

/// Row-major 0/1 mask, `data[y * width + x]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl BinaryMask {
    pub fn zeros(height: usize, width: usize) -> Self {
        Self {
            data: vec![0; width * height],
            width,
            height,
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> bool {
        self.data[y * self.width + x] != 0
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize) {
        self.data[y * self.width + x] = 1;
    }

    /// Number of set pixels
    pub fn area(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.data.iter().all(|&v| v == 0)
    }

    pub fn same_shape(&self, other: &BinaryMask) -> bool {
        self.width == other.width && self.height == other.height
    }

    /// Single-channel 8-bit copy of the mask.
    pub fn to_mat(&self) -> opencv::Result<Mat> {
        let mut mat = Mat::new_rows_cols_with_default(
            self.height as i32,
            self.width as i32,
            core::CV_8UC1,
            Scalar::all(0.0),
        )?;
        mat.data_bytes_mut()?.copy_from_slice(&self.data);
        Ok(mat)
    }

    /// Any non-zero pixel of a CV_8UC1 Mat becomes 1.
    pub fn from_mat(mat: &Mat) -> opencv::Result<Self> {
        let data = mat.data_bytes()?.iter().map(|&v| (v != 0) as u8).collect();
        Ok(Self {
            data,
            width: mat.cols() as usize,
            height: mat.rows() as usize,
        })
    }
}

// ============================================================================
// POLYGON FILL
// ============================================================================

/// Fill `contour` into a zeroed `height x width` mask.
///
/// Vertices are truncated to integer pixels and the outline is part of the
/// mask. An absent or empty contour gives an all-zero mask; non-finite
/// points are ignored.
pub fn build_mask(
    contour: Option<&[Point]>,
    height: usize,
    width: usize,
) -> Result<BinaryMask, AnalysisError> {
    let empty = BinaryMask::zeros(height, width);
    if width == 0 || height == 0 {
        return Ok(empty);
    }
    let points = match contour {
        Some(points) if !points.is_empty() => points,
        _ => return Ok(empty),
    };

    // far-away vertices are pulled in so the int cast cannot overflow
    let (w, h) = (width as i32, height as i32);
    let polygon: Vector<core::Point> = points
        .iter()
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .map(|&(x, y)| {
            core::Point::new(
                (x as i32).clamp(-w, 2 * w),
                (y as i32).clamp(-h, 2 * h),
            )
        })
        .collect();
    if polygon.is_empty() {
        return Ok(empty);
    }

    let mut canvas = empty.to_mat()?;
    let mut polygons = Vector::<Vector<core::Point>>::new();
    polygons.push(polygon);
    imgproc::fill_poly(
        &mut canvas,
        &polygons,
        Scalar::all(1.0),
        imgproc::LINE_8,
        0,
        core::Point::new(0, 0),
    )?;

    Ok(BinaryMask::from_mat(&canvas)?)
}

// ============================================================================
// OVERLAP
// ============================================================================

/// Fraction of `a` covered by `b`: `|A ∩ B| / |A|`, 0.0 when `a` is empty.
///
/// Directional: a small bucket fully inside a large dilated hopper scores
/// 1.0 regardless of the hopper's size.
pub fn overlap_ratio(a: &BinaryMask, b: &BinaryMask) -> Result<f32, AnalysisError> {
    if !a.same_shape(b) {
        return Err(AnalysisError::MaskShapeMismatch {
            a_width: a.width,
            a_height: a.height,
            b_width: b.width,
            b_height: b.height,
        });
    }

    let mut area = 0usize;
    let mut intersection = 0usize;
    for (&pa, &pb) in a.data.iter().zip(b.data.iter()) {
        if pa != 0 {
            area += 1;
            if pb != 0 {
                intersection += 1;
            }
        }
    }

    if area == 0 {
        return Ok(0.0);
    }
    Ok((intersection as f64 / area as f64) as f32)
}

// ============================================================================
// MORPHOLOGY
// ============================================================================

/// Elliptical structuring element of `size x size`, anchored at the centre.
pub fn elliptical_kernel(size: usize) -> opencv::Result<Mat> {
    imgproc::get_structuring_element(
        imgproc::MORPH_ELLIPSE,
        Size::new(size as i32, size as i32),
        core::Point::new(-1, -1),
    )
}

/// Binary dilation with the elliptical element of `size x size` pixels.
/// Pixels outside the mask never contribute.
pub fn dilate_elliptical(mask: &BinaryMask, size: usize) -> Result<BinaryMask, AnalysisError> {
    if size <= 1 || mask.is_empty() {
        return Ok(mask.clone());
    }

    let src = mask.to_mat()?;
    let kernel = elliptical_kernel(size)?;
    let mut dst = Mat::default();
    imgproc::dilate(
        &src,
        &mut dst,
        &kernel,
        core::Point::new(-1, -1),
        1,
        core::BORDER_CONSTANT,
        imgproc::morphology_default_border_value()?,
    )?;

    Ok(BinaryMask::from_mat(&dst)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f32, y0: f32, x1: f32, y1: f32) -> Vec<Point> {
        vec![(x0, y0), (x1, y0), (x1, y1), (x0, y1)]
    }

    fn fill(contour: &[Point], height: usize, width: usize) -> BinaryMask {
        build_mask(Some(contour), height, width).unwrap()
    }

    #[test]
    fn test_absent_or_empty_contour_gives_zero_mask() {
        let mask = build_mask(None, 12, 20).unwrap();
        assert_eq!(mask.width, 20);
        assert_eq!(mask.height, 12);
        assert_eq!(mask.data.len(), 240);
        assert!(mask.is_empty());

        let empty: Vec<Point> = Vec::new();
        let mask = build_mask(Some(&empty), 7, 9).unwrap();
        assert_eq!((mask.width, mask.height), (9, 7));
        assert!(mask.is_empty());

        let nan = vec![(f32::NAN, 1.0), (2.0, f32::INFINITY)];
        assert!(build_mask(Some(&nan), 7, 9).unwrap().is_empty());
    }

    #[test]
    fn test_square_fill_includes_outline() {
        let mask = fill(&square(2.0, 3.0, 6.0, 8.0), 20, 20);
        // 5 columns (2..=6) x 6 rows (3..=8)
        assert_eq!(mask.area(), 30);
        assert!(mask.get(2, 3));
        assert!(mask.get(6, 8));
        assert!(mask.get(4, 5));
        assert!(!mask.get(7, 5));
        assert!(!mask.get(4, 9));
    }

    #[test]
    fn test_fractional_vertices_truncate() {
        let mask = fill(&square(2.9, 3.7, 6.2, 8.9), 20, 20);
        assert_eq!(mask, fill(&square(2.0, 3.0, 6.0, 8.0), 20, 20));
    }

    #[test]
    fn test_triangle_interior() {
        let mask = fill(&[(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)], 16, 16);
        assert!(mask.get(1, 1));
        assert!(mask.get(4, 4));
        assert!(!mask.get(8, 8));
        assert!(!mask.get(12, 1));
    }

    #[test]
    fn test_polygon_clipped_to_canvas() {
        let mask = fill(&square(-5.0, -5.0, 4.0, 4.0), 10, 10);
        assert_eq!(mask.area(), 25);
        assert!(mask.get(0, 0));
        assert!(!mask.get(5, 5));

        let huge = fill(&square(-1e9, -1e9, 1e9, 1e9), 10, 10);
        assert_eq!(huge.area(), 100);
    }

    #[test]
    fn test_mat_conversion_keeps_pixels() {
        let mut mask = BinaryMask::zeros(4, 6);
        mask.set(5, 3);
        mask.set(0, 1);
        let mat = mask.to_mat().unwrap();
        assert_eq!((mat.rows(), mat.cols()), (4, 6));
        assert_eq!(BinaryMask::from_mat(&mat).unwrap(), mask);
    }

    #[test]
    fn test_overlap_self_is_one_and_empty_is_zero() {
        let mask = fill(&square(1.0, 1.0, 5.0, 5.0), 10, 10);
        assert_eq!(overlap_ratio(&mask, &mask).unwrap(), 1.0);

        let zero = BinaryMask::zeros(10, 10);
        assert_eq!(overlap_ratio(&zero, &mask).unwrap(), 0.0);
        assert_eq!(overlap_ratio(&zero, &zero).unwrap(), 0.0);
    }

    #[test]
    fn test_overlap_is_directional() {
        // small fully inside big
        let small = fill(&square(2.0, 2.0, 3.0, 3.0), 10, 10);
        let big = fill(&square(0.0, 0.0, 7.0, 7.0), 10, 10);
        assert_eq!(overlap_ratio(&small, &big).unwrap(), 1.0);
        let reverse = overlap_ratio(&big, &small).unwrap();
        assert!((reverse - 4.0 / 64.0).abs() < 1e-6);
    }

    #[test]
    fn test_overlap_rejects_shape_mismatch() {
        let a = BinaryMask::zeros(10, 10);
        let b = BinaryMask::zeros(10, 11);
        assert!(matches!(
            overlap_ratio(&a, &b),
            Err(AnalysisError::MaskShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_elliptical_kernel_shape() {
        let kernel = elliptical_kernel(5).unwrap();
        let rows: Vec<Vec<u8>> = kernel
            .data_bytes()
            .unwrap()
            .chunks(5)
            .map(|r| r.to_vec())
            .collect();
        assert_eq!(rows[0], vec![0, 0, 1, 0, 0]);
        assert_eq!(rows[2], vec![1, 1, 1, 1, 1]);
        assert_eq!(rows[4], vec![0, 0, 1, 0, 0]);
    }

    #[test]
    fn test_dilation_grows_single_pixel() {
        let mut mask = BinaryMask::zeros(11, 11);
        mask.set(5, 5);
        let grown = dilate_elliptical(&mask, 5).unwrap();
        let expected = core::count_non_zero(&elliptical_kernel(5).unwrap()).unwrap() as usize;
        assert_eq!(grown.area(), expected);
        assert!(grown.get(5, 3));
        assert!(grown.get(3, 5));
        assert!(!grown.get(3, 3));
    }

    #[test]
    fn test_dilation_of_empty_mask_is_noop() {
        let mask = BinaryMask::zeros(8, 8);
        assert!(dilate_elliptical(&mask, 20).unwrap().is_empty());
    }

    #[test]
    fn test_dilation_bridges_small_gap() {
        let bucket = fill(&square(0.0, 0.0, 3.0, 3.0), 20, 20);
        let hopper = fill(&square(6.0, 0.0, 12.0, 3.0), 20, 20);
        assert_eq!(overlap_ratio(&bucket, &hopper).unwrap(), 0.0);
        let dilated = dilate_elliptical(&hopper, 6).unwrap();
        assert!(overlap_ratio(&bucket, &dilated).unwrap() > 0.0);
    }
}
