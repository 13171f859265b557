// src/analysis/mod.rs
//
// Per-frame signal extraction.
//
// Signal flow:
//   Detections → parts (one per bucket / hopper / arm / cabin) ─┐
//   Gray frame + previous gray frame ──────────────────────────┴→ frame_analyzer → SignalBundle
//
// The SignalBundle feeds cycle::CycleStateMachine.

pub mod frame_analyzer;
pub mod parts;

pub use frame_analyzer::{AnalyzerConfig, FrameAnalyzer, FrameInput};
pub use parts::{PartKeywords, SelectedParts};
