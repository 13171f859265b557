// src/pipeline/runner.rs
//
// Frame-sequential processing loop: source -> model -> monitor.
// Source errors are treated as a lost signal (wait, reconnect); bad frames
// are skipped so one broken JPEG or detection never ends the run.

use super::ActivityMonitor;
use crate::detection::DetectionModel;
use crate::error::AnalysisError;
use crate::source::FrameSource;
use crate::types::Frame;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Pause before reconnecting after the signal is lost
    pub retry_delay_ms: u64,
    /// Give up after this many failures in a row (0 = never)
    pub max_consecutive_failures: u32,
    /// Progress line period, in processed frames (0 = off)
    pub progress_every_frames: u64,
    pub max_frames: Option<u64>,
    /// Stop once frame timestamps pass this many seconds
    pub max_duration_s: Option<f64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: 1000,
            max_consecutive_failures: 0,
            progress_every_frames: 100,
            max_frames: None,
            max_duration_s: None,
        }
    }
}

impl RuntimeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_frames == Some(0) {
            bail!("runtime.max_frames must be >= 1 when set");
        }
        if let Some(d) = self.max_duration_s {
            if !d.is_finite() || d <= 0.0 {
                bail!("runtime.max_duration_s must be > 0, got {}", d);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    #[default]
    EndOfStream,
    MaxFrames,
    MaxDuration,
    Interrupted,
    TooManyFailures,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub frames_read: u64,
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub detection_failures: u64,
    pub source_failures: u64,
    pub reconnects: u64,
    pub transitions: u64,
    pub elapsed_s: f64,
    pub avg_fps: f64,
    pub stop_reason: StopReason,
}

/// Drive `source` until it ends, a limit is hit, or `stop` is raised.
///
/// Only an unrecoverable failure streak ends the loop early; even then the
/// monitor keeps everything processed so far and can still be finalized.
pub fn run_stream(
    source: &mut dyn FrameSource,
    model: &mut dyn DetectionModel,
    monitor: &mut ActivityMonitor,
    runtime: &RuntimeConfig,
    stop: &AtomicBool,
) -> Result<ProcessingStats> {
    runtime.validate()?;
    info!("🚀 Processing {} with model {}", source.name(), model.name());

    let started = Instant::now();
    let mut stats = ProcessingStats::default();
    let mut connected = false;
    let mut ever_connected = false;
    let mut consecutive_failures: u32 = 0;

    let reason = loop {
        if stop.load(Ordering::Relaxed) {
            info!("🛑 Stop requested");
            break StopReason::Interrupted;
        }

        if !connected {
            match source.connect() {
                Ok(()) => {
                    connected = true;
                    if ever_connected {
                        stats.reconnects += 1;
                        monitor.reset_motion_reference();
                        info!("🔌 Reconnected to {}", source.name());
                    } else {
                        ever_connected = true;
                        info!(
                            "🔌 Connected to {} ({})",
                            source.name(),
                            source
                                .nominal_fps()
                                .map_or("unknown FPS".to_string(), |f| format!("{:.1} FPS", f))
                        );
                    }
                }
                Err(e) => {
                    if give_up(&mut stats, &mut consecutive_failures, runtime, &e) {
                        break StopReason::TooManyFailures;
                    }
                    continue;
                }
            }
        }

        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("🏁 End of stream");
                break StopReason::EndOfStream;
            }
            Err(e) => {
                connected = false;
                if give_up(&mut stats, &mut consecutive_failures, runtime, &e) {
                    break StopReason::TooManyFailures;
                }
                continue;
            }
        };
        consecutive_failures = 0;

        if let Some(limit) = runtime.max_duration_s {
            if frame.timestamp_s > limit {
                info!("⏱️ Reached max duration {:.1}s", limit);
                break StopReason::MaxDuration;
            }
        }

        stats.frames_read += 1;
        let processed = handle_frame(&frame, model, monitor, &mut stats);

        if processed && progress_due(runtime, stats.frames_processed) {
            let elapsed = started.elapsed().as_secs_f64();
            info!(
                "🎬 Frame {} | t={:.1}s | {} | {:.1} FPS",
                stats.frames_processed,
                frame.timestamp_s,
                monitor.current_state(),
                if elapsed > 0.01 {
                    stats.frames_read as f64 / elapsed
                } else {
                    0.0
                }
            );
        }

        if runtime.max_frames.is_some_and(|m| stats.frames_read >= m) {
            info!("⏱️ Reached max frames {}", stats.frames_read);
            break StopReason::MaxFrames;
        }
    };

    stats.stop_reason = reason;
    stats.elapsed_s = started.elapsed().as_secs_f64();
    stats.avg_fps = if stats.elapsed_s > 0.01 {
        stats.frames_read as f64 / stats.elapsed_s
    } else {
        0.0
    };
    info!(
        "✓ Stream done ({:?}): {} processed, {} skipped, {} reconnect(s)",
        stats.stop_reason, stats.frames_processed, stats.frames_skipped, stats.reconnects
    );
    Ok(stats)
}

/// Progress is logged every `progress_every_frames` processed frames (0 = never).
fn progress_due(runtime: &RuntimeConfig, frames_processed: u64) -> bool {
    runtime.progress_every_frames > 0
        && frames_processed > 0
        && frames_processed % runtime.progress_every_frames == 0
}

/// Detect and analyse one frame. Returns true when the frame was processed,
/// false when it was skipped.
fn handle_frame(
    frame: &Frame,
    model: &mut dyn DetectionModel,
    monitor: &mut ActivityMonitor,
    stats: &mut ProcessingStats,
) -> bool {
    let detections = match model.detect(frame) {
        Ok(d) => d,
        Err(e) => {
            warn!("Detection failed at t={:.2}s, skipping frame: {:#}", frame.timestamp_s, e);
            stats.detection_failures += 1;
            stats.frames_skipped += 1;
            return false;
        }
    };

    let result = match monitor.process_frame(frame, &detections) {
        Err(AnalysisError::FrameSizeMismatch { .. }) => {
            warn!(
                "Frame size changed to {}x{}, restarting motion reference",
                frame.width, frame.height
            );
            monitor.reset_motion_reference();
            monitor.process_frame(frame, &detections)
        }
        other => other,
    };

    match result {
        Ok(outcome) => {
            stats.frames_processed += 1;
            if outcome.transition.is_some() {
                stats.transitions += 1;
            }
            debug!(
                "t={:.2}s state={} contact={} peak motion={:.2}",
                outcome.timestamp_s,
                outcome.state,
                outcome.signals.contact,
                outcome.signals.motion_peak
            );
            true
        }
        Err(e) => {
            warn!("Skipping frame at t={:.2}s: {}", frame.timestamp_s, e);
            stats.frames_skipped += 1;
            false
        }
    }
}

/// Count a source failure and wait before the next attempt.
/// Returns true when the failure streak exceeds the configured limit.
fn give_up(
    stats: &mut ProcessingStats,
    consecutive: &mut u32,
    runtime: &RuntimeConfig,
    err: &anyhow::Error,
) -> bool {
    stats.source_failures += 1;
    *consecutive += 1;
    if runtime.max_consecutive_failures > 0 && *consecutive >= runtime.max_consecutive_failures {
        error!("❌ Source failed {} time(s) in a row: {:#}", consecutive, err);
        return true;
    }
    warn!(
        "📡 Signal lost ({:#}), retrying in {} ms",
        err, runtime.retry_delay_ms
    );
    thread::sleep(Duration::from_millis(runtime.retry_delay_ms));
    false
}
