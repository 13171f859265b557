// src/lib.rs
//
// Excavator activity monitoring: bucket/hopper contact from segmentation
// contours, part motion from dense optical flow, and a LOADING / PREPARING /
// IDLE cycle timeline built from both.

pub mod analysis;
pub mod config;
pub mod cycle;
pub mod detection;
pub mod error;
pub mod geometry;
pub mod motion;
pub mod pipeline;
pub mod source;
pub mod types;

pub use config::Config;
pub use error::AnalysisError;
pub use pipeline::{ActivityMonitor, ActivityReport};
pub use types::{Detection, Frame, OperatingState, SignalBundle, StateInterval};
