// src/cycle/mod.rs
//
// Operating-cycle tracking: per-frame state derivation and the timeline
// post-processor that turns raw intervals into a report.

pub mod state_machine;
pub mod timeline;

pub use state_machine::CycleStateMachine;
pub use timeline::{postprocess, StateSummary, Timeline};

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    /// LOADING stays valid this long after the last bucket-hopper contact
    pub active_cycle_window_s: f64,
    /// Sustained stillness after which the machine is IDLE
    pub dead_time_s: f64,
    /// LOADING intervals shorter than this are reclassified as PREPARING
    pub min_load_duration_s: f64,
    /// Assumed time per frame, used to turn still-frame counts into seconds
    pub frame_interval_s: f64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            active_cycle_window_s: 25.0,
            dead_time_s: 6.0,
            min_load_duration_s: 5.0,
            frame_interval_s: 1.0 / 30.0,
        }
    }
}

impl CycleConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("active_cycle_window_s", self.active_cycle_window_s),
            ("dead_time_s", self.dead_time_s),
            ("min_load_duration_s", self.min_load_duration_s),
        ] {
            if !v.is_finite() || v < 0.0 {
                bail!("cycle.{} must be finite and >= 0, got {}", name, v);
            }
        }
        if !self.frame_interval_s.is_finite() || self.frame_interval_s <= 0.0 {
            bail!(
                "cycle.frame_interval_s must be > 0, got {}",
                self.frame_interval_s
            );
        }
        Ok(())
    }
}
