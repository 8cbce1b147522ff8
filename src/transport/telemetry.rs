//! Telemetry throttle - decides which sampled frames go out over the socket
//!
//! A frame is pushed when the cadence interval elapses or when something
//! significant changed since the last push: a collision onset, a different
//! action set, or the robot moving further than the position threshold.

use bevy::prelude::*;
use std::collections::BTreeSet;

use crate::constants::{TELEMETRY_INTERVAL_FRAMES, TELEMETRY_POSITION_THRESHOLD};
use crate::episode::Frame;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryConfig {
    pub interval_frames: u64,
    pub position_threshold: f32,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            interval_frames: TELEMETRY_INTERVAL_FRAMES,
            position_threshold: TELEMETRY_POSITION_THRESHOLD,
        }
    }
}

/// Outcome of evaluating one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetryDecision {
    pub push_state: bool,
    /// Also send a dedicated `collision_event`
    pub collision_onset: bool,
}

/// Previous-push state used for change detection
#[derive(Debug, Clone, Default)]
pub struct TelemetryThrottle {
    pub config: TelemetryConfig,
    ticks_since_push: u64,
    prev_collision: bool,
    last_actions: BTreeSet<String>,
    last_position: Option<Vec3>,
}

impl TelemetryThrottle {
    pub fn new(config: TelemetryConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn evaluate(&mut self, frame: &Frame) -> TelemetryDecision {
        self.ticks_since_push += 1;

        let collision_onset = frame.collision && !self.prev_collision;
        self.prev_collision = frame.collision;

        let cadence = self.ticks_since_push >= self.config.interval_frames.max(1);
        let actions_changed = frame.active_actions != self.last_actions;
        let moved = match self.last_position {
            Some(last) => last.distance(frame.translation()) > self.config.position_threshold,
            None => true,
        };

        let push_state = cadence || collision_onset || actions_changed || moved;
        if push_state {
            self.ticks_since_push = 0;
            self.last_actions = frame.active_actions.clone();
            self.last_position = Some(frame.translation());
        }

        TelemetryDecision {
            push_state,
            collision_onset,
        }
    }

    /// Forget everything (scene reset)
    pub fn reset(&mut self) {
        *self = Self::new(self.config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_at(x: f32) -> Frame {
        Frame {
            position: [x, 0.0, 0.0],
            ..default()
        }
    }

    #[test]
    fn test_cadence_when_idle() {
        let mut throttle = TelemetryThrottle::default();
        // First frame always goes out
        assert!(throttle.evaluate(&frame_at(0.0)).push_state);
        let pushes = (0..30)
            .filter(|_| throttle.evaluate(&frame_at(0.0)).push_state)
            .count();
        assert_eq!(pushes, 3);
    }

    #[test]
    fn test_significant_changes_push_immediately() {
        let mut throttle = TelemetryThrottle::default();
        throttle.evaluate(&frame_at(0.0));

        assert!(!throttle.evaluate(&frame_at(0.01)).push_state);
        assert!(throttle.evaluate(&frame_at(0.2)).push_state);

        let mut f = frame_at(0.2);
        f.active_actions.insert("w".into());
        assert!(throttle.evaluate(&f).push_state);

        let mut f = frame_at(0.2);
        f.active_actions.insert("w".into());
        f.collision = true;
        let decision = throttle.evaluate(&f);
        assert!(decision.push_state);
        assert!(decision.collision_onset);
        // Held collision is not a new onset
        assert!(!throttle.evaluate(&f).collision_onset);
    }
}
