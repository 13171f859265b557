// src/motion/flow.rs
//
// Dense optical flow (Farnebäck) between two grayscale frames, through
// OpenCV's video module.

use super::gray::GrayFrame;
use anyhow::{bail, Result};
use opencv::{
    core::{self, Mat, Vector},
    prelude::*,
    video,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowParams {
    /// Image scale between pyramid levels (< 1)
    pub pyr_scale: f64,
    /// Pyramid layers, including the original image
    pub levels: usize,
    /// Averaging window size
    pub win_size: usize,
    /// Iterations per pyramid level
    pub iterations: usize,
    /// Pixel neighbourhood used for the polynomial expansion
    pub poly_n: usize,
    /// Gaussian sigma smoothing the derivatives of the expansion
    pub poly_sigma: f64,
}

impl Default for FlowParams {
    fn default() -> Self {
        Self {
            pyr_scale: 0.5,
            levels: 3,
            win_size: 15,
            iterations: 3,
            poly_n: 5,
            poly_sigma: 1.2,
        }
    }
}

impl FlowParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.pyr_scale > 0.0 && self.pyr_scale < 1.0) {
            bail!("flow.pyr_scale must be in (0, 1), got {}", self.pyr_scale);
        }
        if self.levels == 0 {
            bail!("flow.levels must be >= 1");
        }
        if self.win_size == 0 {
            bail!("flow.win_size must be >= 1");
        }
        if self.iterations == 0 {
            bail!("flow.iterations must be >= 1");
        }
        if self.poly_n == 0 || self.poly_n > 9 {
            bail!("flow.poly_n must be in 1..=9, got {}", self.poly_n);
        }
        if !(self.poly_sigma > 0.0) {
            bail!("flow.poly_sigma must be > 0, got {}", self.poly_sigma);
        }
        Ok(())
    }
}

/// Per-pixel flow magnitude from `prev` to `curr`, row-major.
/// Both frames must have the same size.
pub fn flow_magnitudes(
    prev: &GrayFrame,
    curr: &GrayFrame,
    params: &FlowParams,
) -> opencv::Result<Vec<f32>> {
    let prev = prev.to_mat()?;
    let curr = curr.to_mat()?;

    let mut flow = Mat::default();
    video::calc_optical_flow_farneback(
        &prev,
        &curr,
        &mut flow,
        params.pyr_scale,
        params.levels as i32,
        params.win_size as i32,
        params.iterations as i32,
        params.poly_n as i32,
        params.poly_sigma,
        0,
    )?;

    let mut planes = Vector::<Mat>::new();
    core::split(&flow, &mut planes)?;
    let (dx, dy) = (planes.get(0)?, planes.get(1)?);

    let mut magnitude = Mat::default();
    let mut angle = Mat::default();
    core::cart_to_polar(&dx, &dy, &mut magnitude, &mut angle, false)?;

    Ok(magnitude.data_typed::<f32>()?.to_vec())
}
