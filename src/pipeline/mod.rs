// src/pipeline/mod.rs
//
// Stream-level orchestration: the per-frame monitor and the loop that
// feeds it from a frame source and a detection model.

pub mod monitor;
pub mod runner;

pub use monitor::{ActivityMonitor, ActivityReport, FrameOutcome};
pub use runner::{run_stream, ProcessingStats, RuntimeConfig, StopReason};
