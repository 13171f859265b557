// src/source/camera.rs
//
// Local capture device through OpenCV's VideoCapture.

use super::{CameraConfig, FrameSource};
use crate::types::Frame;
use anyhow::{anyhow, bail, Result};
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst},
};
use std::time::Instant;
use tracing::info;

pub struct CameraSource {
    config: CameraConfig,
    cap: Option<VideoCapture>,
    started_at: Option<Instant>,
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            cap: None,
            started_at: None,
        }
    }
}

impl FrameSource for CameraSource {
    fn name(&self) -> String {
        format!("camera:{}", self.config.index)
    }

    fn connect(&mut self) -> Result<()> {
        self.cap = None;
        let mut cap = VideoCapture::new(self.config.index, videoio::CAP_ANY)?;
        if !cap.is_opened()? {
            bail!("failed to open camera {}", self.config.index);
        }
        cap.set(videoio::CAP_PROP_FPS, self.config.fps)?;
        if let Some(w) = self.config.width {
            cap.set(videoio::CAP_PROP_FRAME_WIDTH, w as f64)?;
        }
        if let Some(h) = self.config.height {
            cap.set(videoio::CAP_PROP_FRAME_HEIGHT, h as f64)?;
        }

        let width = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_WIDTH)?;
        let height = VideoCaptureTraitConst::get(&cap, videoio::CAP_PROP_FRAME_HEIGHT)?;
        info!(
            "🎥 Camera {} open: {}x{} @ {:.1} FPS",
            self.config.index, width, height, self.config.fps
        );

        self.cap = Some(cap);
        self.started_at.get_or_insert_with(Instant::now);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let cap = self
            .cap
            .as_mut()
            .ok_or_else(|| anyhow!("camera not connected"))?;

        let mut mat = Mat::default();
        if !VideoCaptureTrait::read(cap, &mut mat)? || mat.empty() {
            // a live device has no end; an empty read is a dropped signal
            bail!("camera {} returned no frame", self.config.index);
        }

        let mut rgb = Mat::default();
        imgproc::cvt_color(&mat, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;
        let data = rgb.data_bytes()?.to_vec();

        Ok(Some(Frame {
            data,
            width: rgb.cols() as usize,
            height: rgb.rows() as usize,
            timestamp_s: self
                .started_at
                .map_or(0.0, |t| t.elapsed().as_secs_f64()),
        }))
    }

    fn nominal_fps(&self) -> Option<f64> {
        Some(self.config.fps)
    }
}
