// src/detection/replay.rs
//
// Serves pre-computed detections, one JSON object per line:
//   {"frame": 0, "detections": [{"class_name": "cucharon", "confidence": 0.9,
//                                "bbox": [..], "contour": [[x, y], ...]}]}
// Frames are matched by the order in which `detect` is called.

use super::DetectionModel;
use crate::types::{Detection, Frame};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct ReplayLine {
    frame: u64,
    #[serde(default)]
    detections: Vec<Detection>,
}

pub struct ReplayModel {
    name: String,
    frames: HashMap<u64, Vec<Detection>>,
    confidence_threshold: f32,
    cursor: u64,
}

impl ReplayModel {
    pub fn open(path: impl AsRef<Path>, confidence_threshold: f32) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("read detections {}", path.display()))?;
        let model = Self::from_jsonl(&contents, confidence_threshold)
            .with_context(|| format!("parse detections {}", path.display()))?;
        info!(
            "🎞️ Replay model: {} frame(s) of detections from {}",
            model.frames.len(),
            path.display()
        );
        Ok(Self {
            name: format!("replay:{}", path.display()),
            ..model
        })
    }

    pub fn from_jsonl(contents: &str, confidence_threshold: f32) -> Result<Self> {
        let mut frames = HashMap::new();
        for (line_no, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let parsed: ReplayLine = serde_json::from_str(line)
                .with_context(|| format!("line {}", line_no + 1))?;
            frames
                .entry(parsed.frame)
                .or_insert_with(Vec::new)
                .extend(parsed.detections);
        }
        Ok(Self {
            name: "replay".to_string(),
            frames,
            confidence_threshold,
            cursor: 0,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

impl DetectionModel for ReplayModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        let index = self.cursor;
        self.cursor += 1;
        let detections: Vec<Detection> = self
            .frames
            .get(&index)
            .map(|dets| {
                dets.iter()
                    .filter(|d| d.confidence >= self.confidence_threshold)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        debug!("Frame {}: {} replayed detection(s)", index, detections.len());
        Ok(detections)
    }
}
