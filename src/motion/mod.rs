// src/motion/mod.rs
//
// Grayscale frames and optical-flow motion intensity.

pub mod estimator;
pub mod flow;
pub mod gray;

pub use estimator::{flow_magnitude, median};
pub use flow::{flow_magnitudes, FlowParams};
pub use gray::GrayFrame;
