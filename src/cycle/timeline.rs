// src/cycle/timeline.rs
//
// Raw intervals → cleaned timeline + per-state summary.
//   1. LOADING shorter than the minimum becomes PREPARING
//   2. consecutive intervals of the same state merge (min start, max end)
//   3. zero/negative durations are dropped
//   4. totals and percentages per state

use crate::types::{OperatingState, StateInterval};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSummary {
    pub state: OperatingState,
    pub duration_s: f64,
    /// Share of the total timeline, rounded to one decimal
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub intervals: Vec<StateInterval>,
    pub summary: Vec<StateSummary>,
    pub total_duration_s: f64,
}

impl Timeline {
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn duration_of(&self, state: OperatingState) -> f64 {
        self.summary
            .iter()
            .find(|s| s.state == state)
            .map_or(0.0, |s| s.duration_s)
    }
}

/// Report order of the summary table.
const SUMMARY_ORDER: [OperatingState; 3] = [
    OperatingState::Idle,
    OperatingState::Preparing,
    OperatingState::Loading,
];

pub fn postprocess(raw: &[StateInterval], min_load_duration_s: f64) -> Timeline {
    let reclassified = raw.iter().map(|iv| {
        if iv.state == OperatingState::Loading && iv.duration_s() < min_load_duration_s {
            StateInterval::new(OperatingState::Preparing, iv.start_s, iv.end_s)
        } else {
            *iv
        }
    });

    let mut merged: Vec<StateInterval> = Vec::with_capacity(raw.len());
    for iv in reclassified {
        match merged.last_mut() {
            Some(last) if last.state == iv.state => {
                last.start_s = last.start_s.min(iv.start_s);
                last.end_s = last.end_s.max(iv.end_s);
            }
            _ => merged.push(iv),
        }
    }
    merged.retain(|iv| iv.duration_s() > 0.0);

    let total: f64 = merged.iter().map(|iv| iv.duration_s()).sum();
    let summary = SUMMARY_ORDER
        .iter()
        .filter_map(|&state| {
            let duration: f64 = merged
                .iter()
                .filter(|iv| iv.state == state)
                .map(|iv| iv.duration_s())
                .sum();
            if duration <= 0.0 {
                return None;
            }
            let percentage = if total > 0.0 {
                round1(duration / total * 100.0)
            } else {
                0.0
            };
            Some(StateSummary {
                state,
                duration_s: duration,
                percentage,
            })
        })
        .collect();

    Timeline {
        intervals: merged,
        summary,
        total_duration_s: total,
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
