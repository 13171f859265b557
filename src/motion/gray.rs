// src/motion/gray.rs

use crate::error::AnalysisError;
use crate::types::Frame;
use opencv::{
    core::{self, Mat, Scalar},
    prelude::*,
};

/// Grayscale frame, row-major: pixel at (x, y) = data[y * width + x]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrayFrame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl GrayFrame {
    pub fn new(data: Vec<u8>, width: usize, height: usize) -> Self {
        debug_assert_eq!(data.len(), width * height);
        Self {
            data,
            width,
            height,
        }
    }

    /// Convert from RGB packed bytes (3 bytes per pixel)
    pub fn from_rgb(rgb: &[u8], width: usize, height: usize) -> Self {
        let mut gray = Vec::with_capacity(width * height);
        for pixel in rgb.chunks_exact(3) {
            // ITU-R BT.601 luma
            let g = (0.299 * pixel[0] as f32 + 0.587 * pixel[1] as f32 + 0.114 * pixel[2] as f32)
                .round() as u8;
            gray.push(g);
        }
        Self::new(gray, width, height)
    }

    /// Grayscale view of a source frame; the buffer length must match its size.
    pub fn from_frame(frame: &Frame) -> Result<Self, AnalysisError> {
        let expected = frame.width * frame.height * 3;
        if frame.data.len() != expected {
            return Err(AnalysisError::InvalidFrameData {
                expected,
                actual: frame.data.len(),
            });
        }
        Ok(Self::from_rgb(&frame.data, frame.width, frame.height))
    }

    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    /// Single-channel 8-bit copy for OpenCV.
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

    pub fn same_size(&self, other: &GrayFrame) -> bool {
        self.width == other.width && self.height == other.height
    }

    /// Half-open region `[x1, x2) x [y1, y2)` clamped to the frame.
    /// None when the clamped region is empty.
    pub fn crop(&self, x1: i64, y1: i64, x2: i64, y2: i64) -> Option<GrayFrame> {
        let x1 = x1.clamp(0, self.width as i64) as usize;
        let x2 = x2.clamp(0, self.width as i64) as usize;
        let y1 = y1.clamp(0, self.height as i64) as usize;
        let y2 = y2.clamp(0, self.height as i64) as usize;
        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        let (w, h) = (x2 - x1, y2 - y1);
        let mut data = Vec::with_capacity(w * h);
        for y in y1..y2 {
            let row = y * self.width;
            data.extend_from_slice(&self.data[row + x1..row + x2]);
        }
        Some(GrayFrame::new(data, w, h))
    }
}
