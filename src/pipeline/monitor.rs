// src/pipeline/monitor.rs
//
// Owns the per-stream analysis state: previous grayscale frame, frame
// analyzer and cycle state machine. One instance per stream; the processing
// loop hands it one frame + detections at a time.

use crate::analysis::{FrameAnalyzer, FrameInput};
use crate::config::Config;
use crate::cycle::{postprocess, CycleStateMachine, StateSummary, Timeline};
use crate::error::AnalysisError;
use crate::motion::GrayFrame;
use crate::types::{Detection, Frame, OperatingState, SignalBundle, StateInterval, StateTransition};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone)]
pub struct FrameOutcome {
    pub frame_index: u64,
    pub timestamp_s: f64,
    pub signals: SignalBundle,
    pub state: OperatingState,
    pub transition: Option<StateTransition>,
}

pub struct ActivityMonitor {
    analyzer: FrameAnalyzer,
    machine: CycleStateMachine,
    prev_gray: Option<GrayFrame>,
    min_load_duration_s: f64,
    frames_processed: u64,
    last_timestamp_s: f64,
}

impl ActivityMonitor {
    pub fn new(config: &Config) -> Self {
        Self {
            analyzer: FrameAnalyzer::new(config.analysis.clone(), config.parts.clone()),
            machine: CycleStateMachine::new(config.cycle.clone()),
            prev_gray: None,
            min_load_duration_s: config.cycle.min_load_duration_s,
            frames_processed: 0,
            last_timestamp_s: 0.0,
        }
    }

    pub fn current_state(&self) -> OperatingState {
        self.machine.current_state()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn time_since_contact(&self) -> f64 {
        self.machine.time_since_contact()
    }

    /// Drop motion history, e.g. after a reconnect or a resolution change.
    /// Cycle timers are kept.
    pub fn reset_motion_reference(&mut self) {
        self.prev_gray = None;
        self.analyzer.reset();
    }

    /// Analyze one frame. On error nothing is updated and the frame can be dropped.
    pub fn process_frame(
        &mut self,
        frame: &Frame,
        detections: &[Detection],
    ) -> Result<FrameOutcome, AnalysisError> {
        self.machine.check_time(frame.timestamp_s)?;
        let gray = GrayFrame::from_frame(frame)?;

        let signals = self.analyzer.analyze(FrameInput {
            detections,
            gray: &gray,
            prev_gray: self.prev_gray.as_ref(),
        })?;
        let transition = self.machine.update(&signals, frame.timestamp_s)?;

        self.prev_gray = Some(gray);
        let frame_index = self.frames_processed;
        self.frames_processed += 1;
        self.last_timestamp_s = frame.timestamp_s;

        Ok(FrameOutcome {
            frame_index,
            timestamp_s: frame.timestamp_s,
            signals,
            state: self.machine.current_state(),
            transition,
        })
    }

    /// Close the timeline at the last processed frame and build the report.
    pub fn finalize(self) -> ActivityReport {
        let end = self.last_timestamp_s;
        let raw = self.machine.finalize(end);
        let timeline = postprocess(&raw, self.min_load_duration_s);
        info!(
            "📊 Timeline: {} raw interval(s) → {} after post-processing",
            raw.len(),
            timeline.intervals.len()
        );
        ActivityReport {
            generated_at: Utc::now(),
            frames_processed: self.frames_processed,
            stream_duration_s: end,
            raw_intervals: raw,
            timeline,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityReport {
    pub generated_at: DateTime<Utc>,
    pub frames_processed: u64,
    pub stream_duration_s: f64,
    pub raw_intervals: Vec<StateInterval>,
    pub timeline: Timeline,
}

impl ActivityReport {
    pub fn summary(&self) -> &[StateSummary] {
        &self.timeline.summary
    }

    /// Plain-text summary table (State, Duration_s, Percentage).
    pub fn summary_table(&self) -> String {
        let mut out = format!("{:<10} {:>12} {:>11}\n", "State", "Duration_s", "Percentage");
        for row in &self.timeline.summary {
            out.push_str(&format!(
                "{:<10} {:>12.2} {:>10.1}%\n",
                row.state.as_str(),
                row.duration_s,
                row.percentage
            ));
        }
        out
    }

    /// Writes `<stem>_summary.json` into `dir`, creating it if needed.
    pub fn write_json(&self, dir: impl AsRef<Path>, stem: &str) -> Result<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        let path = dir.join(format!("{}_summary.json", stem));
        let json = serde_json::to_string_pretty(self).context("serialize report")?;
        fs::write(&path, json).with_context(|| format!("write {}", path.display()))?;
        info!("💾 Report saved: {}", path.display());
        Ok(path)
    }
}
