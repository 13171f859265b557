// src/types.rs

use serde::{Deserialize, Serialize};
use std::fmt;

/// Image-space point `(x, y)` in pixels, as returned by the segmentation model.
pub type Point = (f32, f32);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_name: String,
    pub confidence: f32,
    /// [x1, y1, x2, y2] in frame coordinates
    pub bbox: [f32; 4],
    /// Polygon contour, present only for segmentation models
    #[serde(default)]
    pub contour: Option<Vec<Point>>,
}

impl Detection {
    pub fn label_contains(&self, keyword: &str) -> bool {
        self.class_name
            .to_lowercase()
            .contains(&keyword.to_lowercase())
    }
}

/// Axis-aligned integer box, inclusive corners, clamped to the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn as_coords(&self) -> [f32; 4] {
        [
            self.x1 as f32,
            self.y1 as f32,
            self.x2 as f32,
            self.y2 as f32,
        ]
    }
}

/// Packed RGB frame handed over by a frame source.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
    /// Seconds since stream start
    pub timestamp_s: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperatingState {
    Starting,
    Idle,
    Preparing,
    Loading,
}

impl OperatingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatingState::Starting => "STARTING",
            OperatingState::Idle => "IDLE",
            OperatingState::Preparing => "PREPARING",
            OperatingState::Loading => "LOADING",
        }
    }
}

impl fmt::Display for OperatingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateInterval {
    pub state: OperatingState,
    pub start_s: f64,
    pub end_s: f64,
}

impl StateInterval {
    pub fn new(state: OperatingState, start_s: f64, end_s: f64) -> Self {
        Self {
            state,
            start_s,
            end_s,
        }
    }

    pub fn duration_s(&self) -> f64 {
        self.end_s - self.start_s
    }
}

/// Emitted by the cycle state machine whenever the derived state changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateTransition {
    pub from: OperatingState,
    pub to: OperatingState,
    /// Start time of the new interval (backdated when entering IDLE)
    pub start_s: f64,
    /// Interval closed by this transition; None when leaving STARTING
    pub closed: Option<StateInterval>,
}

/// Per-frame signals derived from detections and motion.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SignalBundle {
    pub contact: bool,
    pub hopper_present: bool,
    pub motion_arm: f32,
    pub motion_bucket: f32,
    pub motion_cabin: f32,
    pub motion_arm_or_bucket: bool,
    pub motion_cabin_moving: bool,
    pub motion_combined: bool,
    pub motion_peak: f32,
    pub overlap_ratio: f32,
    pub bucket_tip_y: Option<f32>,
    pub bucket_tip_velocity_y: f32,
}
