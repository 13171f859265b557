// src/source/mod.rs
//
// Frame sources. Every variant yields packed RGB frames stamped with
// seconds since the stream started; the processing loop owns the source
// and drives it one frame at a time.

pub mod camera;
pub mod directory;
pub mod mjpeg;
pub mod snapshot;

pub use camera::CameraSource;
pub use directory::{DirectoryConfig, DirectorySource};
pub use mjpeg::{MjpegConfig, MjpegSource};
pub use snapshot::{SnapshotConfig, SnapshotSource};

use crate::types::Frame;
use anyhow::{anyhow, bail, Context, Result};
use image::GenericImageView;
use serde::{Deserialize, Serialize};

pub trait FrameSource {
    /// Human-readable origin (URL, folder, device)
    fn name(&self) -> String;

    /// Open or reopen the underlying stream.
    fn connect(&mut self) -> Result<()>;

    /// Next frame; `Ok(None)` marks the end of a finite stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Expected frame rate, if the source knows it
    fn nominal_fps(&self) -> Option<f64>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    Mjpeg(MjpegConfig),
    Snapshot(SnapshotConfig),
    Directory(DirectoryConfig),
    Camera(CameraConfig),
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Mjpeg(MjpegConfig::default())
    }
}

impl SourceConfig {
    pub fn validate(&self) -> Result<()> {
        match self {
            SourceConfig::Mjpeg(c) => {
                check_http_url(&c.url)?;
                check_fps(c.fps)
            }
            SourceConfig::Snapshot(c) => {
                check_http_url(&c.url)?;
                if c.interval_ms == 0 {
                    bail!("snapshot interval_ms must be > 0");
                }
                Ok(())
            }
            SourceConfig::Directory(c) => {
                if c.path.trim().is_empty() {
                    bail!("directory source needs a path");
                }
                check_fps(c.fps)
            }
            SourceConfig::Camera(c) => check_fps(c.fps),
        }
    }
}

/// Local capture device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub index: i32,
    pub fps: f64,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            fps: 25.0,
            width: None,
            height: None,
        }
    }
}

pub fn build_source(config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    match config {
        SourceConfig::Mjpeg(c) => Ok(Box::new(MjpegSource::new(c.clone())?)),
        SourceConfig::Snapshot(c) => Ok(Box::new(SnapshotSource::new(c.clone())?)),
        SourceConfig::Directory(c) => Ok(Box::new(DirectorySource::new(c.clone()))),
        SourceConfig::Camera(c) => Ok(Box::new(CameraSource::new(c.clone()))),
    }
}

fn check_http_url(raw: &str) -> Result<()> {
    let url = url::Url::parse(raw).with_context(|| format!("parse stream url '{}'", raw))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(anyhow!("unsupported scheme '{}'; expected http(s)", other)),
    }
}

fn check_fps(fps: f64) -> Result<()> {
    if !fps.is_finite() || fps <= 0.0 {
        bail!("fps must be > 0, got {}", fps);
    }
    Ok(())
}

/// Decode an encoded image (JPEG/PNG) to packed RGB.
pub(crate) fn decode_rgb(bytes: &[u8]) -> Result<(Vec<u8>, usize, usize)> {
    let image = image::load_from_memory(bytes).context("decode image")?;
    let (width, height) = image.dimensions();
    let rgb = image.into_rgb8();
    Ok((rgb.into_raw(), width as usize, height as usize))
}
