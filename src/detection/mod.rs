// src/detection/mod.rs
//
// Detection models: anything that turns a frame into labelled instances
// (class, confidence, box, optional contour). The analysis core only sees
// the resulting `Detection` list.

pub mod replay;

#[cfg(feature = "onnx")]
pub mod yolo_seg;

pub use replay::ReplayModel;

use crate::types::{Detection, Frame};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

pub trait DetectionModel {
    fn name(&self) -> &str;

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Pre-computed detections from a JSON-lines file
    Replay,
    /// YOLO instance-segmentation network exported to ONNX
    YoloSeg,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub kind: ModelKind,
    pub path: String,
    /// Detections below this confidence never reach the analyzer
    pub confidence_threshold: f32,
    /// Class index → label, in training order
    pub class_names: Vec<String>,
    pub input_size: usize,
    pub iou_threshold: f32,
    pub mask_threshold: f32,
    pub use_cuda: bool,
    pub num_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            kind: ModelKind::Replay,
            path: "detections.jsonl".to_string(),
            confidence_threshold: 0.45,
            class_names: ["brazo", "cabina", "cucharon", "volquete"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            input_size: 640,
            iou_threshold: 0.45,
            mask_threshold: 0.5,
            use_cuda: false,
            num_threads: 4,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<()> {
        if self.path.trim().is_empty() {
            bail!("model.path is empty");
        }
        for (name, v) in [
            ("confidence_threshold", self.confidence_threshold),
            ("iou_threshold", self.iou_threshold),
            ("mask_threshold", self.mask_threshold),
        ] {
            if !(0.0..=1.0).contains(&v) {
                bail!("model.{} must be in [0, 1], got {}", name, v);
            }
        }
        if self.kind == ModelKind::YoloSeg {
            if self.input_size == 0 || self.input_size % 32 != 0 {
                bail!("model.input_size must be a positive multiple of 32, got {}", self.input_size);
            }
            if self.class_names.is_empty() {
                bail!("model.class_names is required for yolo_seg");
            }
            if self.num_threads == 0 {
                bail!("model.num_threads must be >= 1");
            }
        }
        Ok(())
    }
}

pub fn build_model(config: &ModelConfig) -> Result<Box<dyn DetectionModel>> {
    match config.kind {
        ModelKind::Replay => Ok(Box::new(ReplayModel::open(
            &config.path,
            config.confidence_threshold,
        )?)),
        #[cfg(feature = "onnx")]
        ModelKind::YoloSeg => Ok(Box::new(yolo_seg::YoloSegModel::new(config)?)),
        #[cfg(not(feature = "onnx"))]
        ModelKind::YoloSeg => bail!("yolo_seg model requires building with --features onnx"),
    }
}
