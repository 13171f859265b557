// src/source/directory.rs
//
// Replays still images from a folder in file-name order. Useful for
// offline runs against frames dumped from a recorded stream.

use super::{decode_rgb, FrameSource};
use crate::types::Frame;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub path: String,
    /// Capture rate the frames were taken at; sets the timestamps
    pub fps: f64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            path: "frames".to_string(),
            fps: 30.0,
        }
    }
}

pub struct DirectorySource {
    config: DirectoryConfig,
    files: Vec<PathBuf>,
    cursor: usize,
}

impl DirectorySource {
    pub fn new(config: DirectoryConfig) -> Self {
        Self {
            config,
            files: Vec::new(),
            cursor: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

pub fn find_image_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

impl FrameSource for DirectorySource {
    fn name(&self) -> String {
        self.config.path.clone()
    }

    /// (Re)scans the folder. The replay position is kept across reconnects.
    fn connect(&mut self) -> Result<()> {
        let dir = Path::new(&self.config.path);
        if !dir.is_dir() {
            bail!("frame directory {} does not exist", dir.display());
        }
        self.files = find_image_files(dir);
        if self.files.is_empty() {
            warn!("No images found in {}", dir.display());
        }
        info!("🗂️ {} frame(s) in {}", self.files.len(), dir.display());
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.cursor) else {
            return Ok(None);
        };
        let index = self.cursor;
        self.cursor += 1;

        let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
        let (data, width, height) =
            decode_rgb(&bytes).with_context(|| format!("decode {}", path.display()))?;
        Ok(Some(Frame {
            data,
            width,
            height,
            timestamp_s: index as f64 / self.config.fps,
        }))
    }

    fn nominal_fps(&self) -> Option<f64> {
        Some(self.config.fps)
    }
}
