// src/cycle/state_machine.rs
//
// Excavator operating-cycle state machine.
//
// The state is derived fresh every frame, in priority order:
//   1. IDLE      - no motion for at least `dead_time_s`
//   2. LOADING   - contact seen within `active_cycle_window_s` and a hopper is visible
//   3. PREPARING - everything else
//
// STARTING is only the initial value. Entering IDLE backdates the boundary
// by `dead_time_s` so the still period is attributed to IDLE.

use super::CycleConfig;
use crate::error::AnalysisError;
use crate::types::{OperatingState, SignalBundle, StateInterval, StateTransition};
use tracing::{debug, info};

pub struct CycleStateMachine {
    config: CycleConfig,
    state: OperatingState,
    state_start_s: f64,
    frames_since_motion: u64,
    last_contact_s: Option<f64>,
    time_since_contact_s: f64,
    last_time_s: Option<f64>,
    intervals: Vec<StateInterval>,
}

impl CycleStateMachine {
    pub fn new(config: CycleConfig) -> Self {
        Self {
            config,
            state: OperatingState::Starting,
            state_start_s: 0.0,
            frames_since_motion: 0,
            last_contact_s: None,
            time_since_contact_s: f64::INFINITY,
            last_time_s: None,
            intervals: Vec::new(),
        }
    }

    pub fn current_state(&self) -> OperatingState {
        self.state
    }

    /// Start time of the interval currently open.
    pub fn state_start_s(&self) -> f64 {
        self.state_start_s
    }

    /// Closed intervals so far, in order.
    pub fn intervals(&self) -> &[StateInterval] {
        &self.intervals
    }

    /// Seconds since the last bucket-hopper contact; infinite before the first one.
    pub fn time_since_contact(&self) -> f64 {
        self.time_since_contact_s
    }

    pub fn frames_since_motion(&self) -> u64 {
        self.frames_since_motion
    }

    /// Whether `now_s` is acceptable as the next frame time.
    pub fn check_time(&self, now_s: f64) -> Result<(), AnalysisError> {
        if !now_s.is_finite() || now_s < 0.0 {
            return Err(AnalysisError::InvalidTimestamp(now_s));
        }
        match self.last_time_s {
            Some(previous) if now_s < previous => Err(AnalysisError::NonMonotonicTime {
                previous,
                current: now_s,
            }),
            _ => Ok(()),
        }
    }

    /// Feed one frame's signals at `now_s` seconds since stream start.
    pub fn update(
        &mut self,
        signals: &SignalBundle,
        now_s: f64,
    ) -> Result<Option<StateTransition>, AnalysisError> {
        self.check_time(now_s)?;
        self.last_time_s = Some(now_s);

        // timers
        self.time_since_contact_s = match self.last_contact_s {
            Some(t) => now_s - t,
            None => f64::INFINITY,
        };
        if signals.contact {
            self.last_contact_s = Some(now_s);
            self.time_since_contact_s = 0.0;
        }

        if signals.motion_combined {
            self.frames_since_motion = 0;
        } else {
            self.frames_since_motion += 1;
        }

        let next = self.derive_state(signals);
        if next == self.state {
            return Ok(None);
        }
        Ok(Some(self.transition(next, now_s)))
    }

    fn derive_state(&self, signals: &SignalBundle) -> OperatingState {
        let still_s = self.frames_since_motion as f64 * self.config.frame_interval_s;
        if still_s >= self.config.dead_time_s {
            OperatingState::Idle
        } else if self.last_contact_s.is_some()
            && self.time_since_contact_s <= self.config.active_cycle_window_s
            && signals.hopper_present
        {
            OperatingState::Loading
        } else {
            OperatingState::Preparing
        }
    }

    fn transition(&mut self, next: OperatingState, now_s: f64) -> StateTransition {
        let from = self.state;
        let dead = self.config.dead_time_s;

        let (closed, start_s) = if from == OperatingState::Starting {
            let start = if next == OperatingState::Idle {
                (now_s - dead).max(0.0)
            } else {
                now_s
            };
            (None, start)
        } else {
            let end = if next == OperatingState::Idle {
                (now_s - dead).max(self.state_start_s)
            } else {
                now_s
            };
            let interval = StateInterval::new(from, self.state_start_s, end);
            self.intervals.push(interval);
            (Some(interval), end)
        };

        match closed {
            Some(c) => info!(
                "🔁 {} → {} at {:.2}s ({} lasted {:.2}s)",
                from,
                next,
                start_s,
                from,
                c.duration_s()
            ),
            None => info!("▶️ First state {} from {:.2}s", next, start_s),
        }
        debug!(
            "since contact {:.2}s, still frames {}",
            self.time_since_contact_s, self.frames_since_motion
        );

        self.state = next;
        self.state_start_s = start_s;

        StateTransition {
            from,
            to: next,
            start_s,
            closed,
        }
    }

    /// Close the open interval at `end_s` and return the raw timeline.
    /// Nothing is appended if the machine never left STARTING.
    pub fn finalize(mut self, end_s: f64) -> Vec<StateInterval> {
        if self.state != OperatingState::Starting {
            let end = if end_s.is_finite() {
                end_s.max(self.state_start_s)
            } else {
                self.state_start_s
            };
            self.intervals
                .push(StateInterval::new(self.state, self.state_start_s, end));
            info!(
                "⏹️ Closed {} at {:.2}s ({} intervals)",
                self.state,
                end,
                self.intervals.len()
            );
        }
        self.intervals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycle::postprocess;

    fn signals(contact: bool, hopper: bool, moving: bool) -> SignalBundle {
        SignalBundle {
            contact,
            hopper_present: hopper,
            motion_combined: moving,
            ..Default::default()
        }
    }

    fn config(frame_interval_s: f64) -> CycleConfig {
        CycleConfig {
            frame_interval_s,
            ..Default::default()
        }
    }

    #[test]
    fn test_loading_while_hopper_visible_after_contact() {
        let mut sm = CycleStateMachine::new(config(0.5));
        for i in 0..=80 {
            let t = i as f64 * 0.5;
            let s = signals(i == 0, t < 20.0, true);
            sm.update(&s, t).unwrap();
        }
        let raw = sm.finalize(40.0);
        assert_eq!(
            raw,
            vec![
                StateInterval::new(OperatingState::Loading, 0.0, 20.0),
                StateInterval::new(OperatingState::Preparing, 20.0, 40.0),
            ]
        );

        let timeline = postprocess(&raw, 5.0);
        let loading: Vec<_> = timeline
            .intervals
            .iter()
            .filter(|i| i.state == OperatingState::Loading)
            .collect();
        assert_eq!(loading.len(), 1);
        assert_eq!((loading[0].start_s, loading[0].end_s), (0.0, 20.0));
    }

    #[test]
    fn test_loading_expires_after_window() {
        let mut sm = CycleStateMachine::new(config(0.5));
        sm.update(&signals(true, true, true), 0.0).unwrap();
        assert_eq!(sm.current_state(), OperatingState::Loading);

        sm.update(&signals(false, true, true), 25.0).unwrap();
        assert_eq!(sm.current_state(), OperatingState::Loading);

        let tr = sm.update(&signals(false, true, true), 25.5).unwrap().unwrap();
        assert_eq!(tr.from, OperatingState::Loading);
        assert_eq!(tr.to, OperatingState::Preparing);
        assert_eq!(tr.closed, Some(StateInterval::new(OperatingState::Loading, 0.0, 25.5)));
    }

    #[test]
    fn test_no_loading_without_any_contact() {
        let mut sm = CycleStateMachine::new(config(0.5));
        sm.update(&signals(false, true, true), 0.0).unwrap();
        assert_eq!(sm.current_state(), OperatingState::Preparing);
        assert!(sm.time_since_contact().is_infinite());
    }

    #[test]
    fn test_idle_backdates_previous_interval() {
        let mut sm = CycleStateMachine::new(config(0.5));
        let mut transition = None;
        for i in 0..=40 {
            let t = i as f64 * 0.5;
            if let Some(tr) = sm.update(&signals(false, false, t <= 10.0), t).unwrap() {
                transition = Some(tr);
            }
        }
        // still from t=10.5; 12 still frames * 0.5s reach dead time at t=16
        let tr = transition.unwrap();
        assert_eq!(tr.to, OperatingState::Idle);
        assert_eq!(tr.start_s, 10.0);
        assert_eq!(tr.closed, Some(StateInterval::new(OperatingState::Preparing, 0.0, 10.0)));
        assert_eq!(sm.current_state(), OperatingState::Idle);
    }

    #[test]
    fn test_idle_backdate_clamped_to_interval_start() {
        let mut sm = CycleStateMachine::new(config(0.5));
        // moving until t=8, contact + hopper from t=7 puts us in LOADING
        for i in 0..=16 {
            let t = i as f64 * 0.5;
            sm.update(&signals(t >= 7.0, t >= 7.0, true), t).unwrap();
        }
        assert_eq!(sm.current_state(), OperatingState::Loading);
        assert_eq!(sm.state_start_s(), 7.0);

        let mut idle = None;
        for i in 17..=40 {
            let t = i as f64 * 0.5;
            if let Some(tr) = sm.update(&signals(false, true, false), t).unwrap() {
                idle = Some(tr);
                break;
            }
        }
        // IDLE reached at t=14; 14-6=8 is after LOADING's start, no clamp needed
        let tr = idle.unwrap();
        assert_eq!(tr.to, OperatingState::Idle);
        assert_eq!(tr.closed, Some(StateInterval::new(OperatingState::Loading, 7.0, 8.0)));

        // LOADING entered while already still: backdating would precede its start
        let mut sm = CycleStateMachine::new(config(1.0));
        sm.update(&signals(false, false, true), 0.0).unwrap();
        for t in 1..=3 {
            sm.update(&signals(false, false, false), t as f64).unwrap();
        }
        sm.update(&signals(true, true, false), 4.0).unwrap();
        assert_eq!(sm.current_state(), OperatingState::Loading);
        sm.update(&signals(false, true, false), 5.0).unwrap();
        let tr = sm.update(&signals(false, true, false), 6.0).unwrap().unwrap();
        assert_eq!(tr.to, OperatingState::Idle);
        // 6 - 6 = 0 is clamped to the LOADING start
        assert_eq!(tr.closed, Some(StateInterval::new(OperatingState::Loading, 4.0, 4.0)));
        assert_eq!(tr.start_s, 4.0);
    }

    #[test]
    fn test_first_state_idle_starts_at_zero_at_least() {
        let mut sm = CycleStateMachine::new(CycleConfig {
            dead_time_s: 0.0,
            ..config(1.0)
        });
        let tr = sm.update(&signals(false, false, false), 2.0).unwrap().unwrap();
        assert_eq!(tr.from, OperatingState::Starting);
        assert_eq!(tr.to, OperatingState::Idle);
        assert_eq!(tr.start_s, 2.0);
        assert!(tr.closed.is_none());

        let mut sm = CycleStateMachine::new(config(1.0));
        for t in 0..6 {
            sm.update(&signals(false, false, false), t as f64).unwrap();
        }
        assert_eq!(sm.current_state(), OperatingState::Idle);
        assert_eq!(sm.state_start_s(), 0.0);
        // the PREPARING interval entered at t=0 closes with zero length
        assert_eq!(
            sm.intervals(),
            &[StateInterval::new(OperatingState::Preparing, 0.0, 0.0)]
        );
    }

    #[test]
    fn test_idle_has_priority_over_loading() {
        let mut sm = CycleStateMachine::new(config(1.0));
        for t in 0..=6 {
            sm.update(&signals(true, true, false), t as f64).unwrap();
        }
        assert_eq!(sm.current_state(), OperatingState::Idle);
    }

    #[test]
    fn test_rejects_bad_timestamps() {
        let mut sm = CycleStateMachine::new(config(1.0));
        let s = signals(false, false, true);
        let err = sm.update(&s, f64::NAN).unwrap_err();
        assert!(err.to_string().contains("invalid timestamp"));
        assert!(matches!(
            sm.update(&s, -1.0),
            Err(AnalysisError::InvalidTimestamp(_))
        ));
        sm.update(&s, 5.0).unwrap();
        sm.update(&s, 5.0).unwrap();
        assert_eq!(
            sm.update(&s, 4.0),
            Err(AnalysisError::NonMonotonicTime {
                previous: 5.0,
                current: 4.0
            })
        );
    }

    #[test]
    fn test_finalize_while_starting_is_empty() {
        let sm = CycleStateMachine::new(CycleConfig::default());
        assert!(sm.finalize(10.0).is_empty());
    }
}
