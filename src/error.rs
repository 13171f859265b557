// src/error.rs
//
// Malformed input to the analysis core. Degraded input (missing contour,
// missing box, no previous frame) never lands here; it resolves to a safe
// default inside the analyzer. These variants are for input the caller
// must fix or drop.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("frame size mismatch: previous {prev_width}x{prev_height}, current {width}x{height}")]
    FrameSizeMismatch {
        prev_width: usize,
        prev_height: usize,
        width: usize,
        height: usize,
    },

    #[error("mask shape mismatch: {a_width}x{a_height} vs {b_width}x{b_height}")]
    MaskShapeMismatch {
        a_width: usize,
        a_height: usize,
        b_width: usize,
        b_height: usize,
    },

    #[error("invalid timestamp {0}s (must be finite and >= 0)")]
    InvalidTimestamp(f64),

    #[error("timestamp went backwards: {current:.3}s after {previous:.3}s")]
    NonMonotonicTime { previous: f64, current: f64 },

    #[error("frame buffer has {actual} bytes, expected {expected}")]
    InvalidFrameData { expected: usize, actual: usize },

    /// OpenCV rejected a mask or contour operation
    #[error("opencv: {0}")]
    Vision(String),
}

impl From<opencv::Error> for AnalysisError {
    fn from(err: opencv::Error) -> Self {
        AnalysisError::Vision(err.to_string())
    }
}
