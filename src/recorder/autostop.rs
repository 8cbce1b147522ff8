//! Auto-stop evaluation
//!
//! Checked once per recorded frame, first match wins:
//! 1. collision onset
//! 2. capture trigger onset, outside the trigger cooldown
//! 3. episode timer crossing zero
//!
//! Fires at most once per recording session.

use crate::constants::{ACTION_CAPTURE, TRIGGER_COOLDOWN_MS};
use crate::episode::{Frame, StopReason};

#[derive(Debug, Clone, PartialEq)]
pub struct AutoStopConfig {
    pub trigger_symbol: String,
    pub trigger_cooldown_ms: u64,
}

impl Default for AutoStopConfig {
    fn default() -> Self {
        Self {
            trigger_symbol: ACTION_CAPTURE.to_string(),
            trigger_cooldown_ms: TRIGGER_COOLDOWN_MS,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AutoStopEvaluator {
    pub config: AutoStopConfig,
    prev_collision: bool,
    prev_trigger: bool,
    prev_time_remaining: Option<f32>,
    /// Simulated time of the last trigger stop; kept across sessions
    last_trigger_stop_ms: Option<u64>,
    fired: bool,
}

impl AutoStopEvaluator {
    pub fn new(config: AutoStopConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Arm for a new recording session. The trigger cooldown carries over.
    pub fn begin_session(&mut self) {
        self.prev_collision = false;
        self.prev_trigger = false;
        self.prev_time_remaining = None;
        self.fired = false;
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Inspect the latest frame; `now_ms` is simulated time
    pub fn evaluate(&mut self, frame: &Frame, now_ms: u64) -> Option<StopReason> {
        let collision_edge = frame.collision && !self.prev_collision;
        let trigger_active = frame.has_action(&self.config.trigger_symbol);
        let trigger_edge = trigger_active && !self.prev_trigger;
        let timer_crossed = self
            .prev_time_remaining
            .is_some_and(|prev| prev > 0.0 && frame.time_remaining <= 0.0);

        self.prev_collision = frame.collision;
        self.prev_trigger = trigger_active;
        self.prev_time_remaining = Some(frame.time_remaining);

        if self.fired {
            return None;
        }

        let reason = if collision_edge {
            Some(StopReason::Collision)
        } else if trigger_edge && self.trigger_cooled_down(now_ms) {
            self.last_trigger_stop_ms = Some(now_ms);
            Some(StopReason::TriggerAction)
        } else if timer_crossed {
            Some(StopReason::TimeExpired)
        } else {
            None
        };

        if reason.is_some() {
            self.fired = true;
        }
        reason
    }

    fn trigger_cooled_down(&self, now_ms: u64) -> bool {
        match self.last_trigger_stop_ms {
            Some(last) => now_ms.saturating_sub(last) >= self.config.trigger_cooldown_ms,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::prelude::default;

    fn frame(collision: bool, actions: &[&str], time: f32) -> Frame {
        Frame {
            collision,
            active_actions: actions.iter().map(|s| s.to_string()).collect(),
            time_remaining: time,
            ..default()
        }
    }

    #[test]
    fn test_collision_edge_fires_once() {
        let mut eval = AutoStopEvaluator::default();
        eval.begin_session();
        assert_eq!(eval.evaluate(&frame(false, &[], 10.0), 0), None);
        assert_eq!(
            eval.evaluate(&frame(true, &[], 10.0), 16),
            Some(StopReason::Collision)
        );
        assert_eq!(eval.evaluate(&frame(false, &[], 10.0), 32), None);
        assert_eq!(eval.evaluate(&frame(true, &[], 10.0), 48), None);
    }

    #[test]
    fn test_collision_on_first_frame_counts() {
        let mut eval = AutoStopEvaluator::default();
        eval.begin_session();
        assert_eq!(
            eval.evaluate(&frame(true, &[], 10.0), 0),
            Some(StopReason::Collision)
        );
    }

    #[test]
    fn test_priority_collision_over_trigger_over_timer() {
        let mut eval = AutoStopEvaluator::default();
        eval.begin_session();
        eval.evaluate(&frame(false, &[], 0.1), 0);
        assert_eq!(
            eval.evaluate(&frame(true, &["v"], -0.1), 16),
            Some(StopReason::Collision)
        );

        let mut eval = AutoStopEvaluator::default();
        eval.begin_session();
        eval.evaluate(&frame(false, &[], 0.1), 0);
        assert_eq!(
            eval.evaluate(&frame(false, &["v"], -0.1), 16),
            Some(StopReason::TriggerAction)
        );
    }

    #[test]
    fn test_trigger_cooldown_survives_restart() {
        let mut eval = AutoStopEvaluator::default();
        eval.begin_session();
        assert_eq!(
            eval.evaluate(&frame(false, &["v"], 10.0), 1_000),
            Some(StopReason::TriggerAction)
        );

        eval.begin_session();
        assert_eq!(eval.evaluate(&frame(false, &[], 10.0), 1_100), None);
        // Within 500 ms of the last trigger stop
        assert_eq!(eval.evaluate(&frame(false, &["v"], 10.0), 1_300), None);
        assert_eq!(eval.evaluate(&frame(false, &[], 10.0), 1_400), None);
        assert_eq!(
            eval.evaluate(&frame(false, &["v"], 10.0), 1_600),
            Some(StopReason::TriggerAction)
        );
    }

    #[test]
    fn test_held_trigger_is_not_an_edge() {
        let mut eval = AutoStopEvaluator::default();
        eval.begin_session();
        eval.evaluate(&frame(false, &["v"], 10.0), 0);
        eval.begin_session();
        // Held through the cooldown window, then still held: no new edge
        assert_eq!(eval.evaluate(&frame(false, &["v"], 10.0), 100), None);
        assert_eq!(eval.evaluate(&frame(false, &["v"], 10.0), 900), None);
    }

    #[test]
    fn test_timer_crossing_fires_once() {
        let mut eval = AutoStopEvaluator::default();
        eval.begin_session();
        assert_eq!(eval.evaluate(&frame(false, &[], 0.5), 0), None);
        assert_eq!(
            eval.evaluate(&frame(false, &[], -0.1), 16),
            Some(StopReason::TimeExpired)
        );
        assert_eq!(eval.evaluate(&frame(false, &[], -0.2), 32), None);
    }
}
