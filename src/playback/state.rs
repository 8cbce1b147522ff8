//! Playback lifecycle state and speed controls

use std::fmt;

/// Available playback speeds
pub const PLAYBACK_SPEEDS: [f32; 5] = [0.25, 0.5, 1.0, 2.0, 4.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Loading,
    Positioning,
    Loaded,
    Playing,
    Complete,
    Cancelled,
    Error,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Loading => "loading",
            PlaybackState::Positioning => "positioning",
            PlaybackState::Loaded => "loaded",
            PlaybackState::Playing => "playing",
            PlaybackState::Complete => "complete",
            PlaybackState::Cancelled => "cancelled",
            PlaybackState::Error => "error",
        }
    }

    /// Complete, Cancelled and Error wait for `acknowledge`
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlaybackState::Complete | PlaybackState::Cancelled | PlaybackState::Error
        )
    }

    /// States in which the player, not the operator, drives the agent pose
    pub fn owns_pose(&self) -> bool {
        matches!(
            self,
            PlaybackState::Positioning | PlaybackState::Loaded | PlaybackState::Playing
        )
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(status, reason)` pair shown to the operator
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayerStatus {
    pub state: PlaybackState,
    pub detail: Option<String>,
}

impl fmt::Display for PlayerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {}", self.state, detail),
            None => write!(f, "{}", self.state),
        }
    }
}

/// Speed, pause and single-step controls for stored playback
#[derive(Debug, Clone)]
pub struct PlaybackControls {
    pub playback_speed: f32,
    pub speed_index: usize,
    pub is_paused: bool,
    /// One frame requested while paused
    pub step_pending: bool,
}

impl Default for PlaybackControls {
    fn default() -> Self {
        Self {
            playback_speed: 1.0,
            speed_index: 2, // 1.0x
            is_paused: false,
            step_pending: false,
        }
    }
}

impl PlaybackControls {
    pub fn speed_up(&mut self) {
        if self.speed_index < PLAYBACK_SPEEDS.len() - 1 {
            self.speed_index += 1;
            self.playback_speed = PLAYBACK_SPEEDS[self.speed_index];
        }
    }

    pub fn speed_down(&mut self) {
        if self.speed_index > 0 {
            self.speed_index -= 1;
            self.playback_speed = PLAYBACK_SPEEDS[self.speed_index];
        }
    }

    pub fn toggle_pause(&mut self) {
        self.is_paused = !self.is_paused;
        self.step_pending = false;
    }

    /// Advance exactly one frame on the next tick (only while paused)
    pub fn step_forward(&mut self) {
        if self.is_paused {
            self.step_pending = true;
        }
    }

    pub fn speed_string(&self) -> String {
        if self.is_paused {
            "PAUSED".to_string()
        } else {
            format!("{:.2}x", self.playback_speed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_clamps_at_ends() {
        let mut controls = PlaybackControls::default();
        for _ in 0..10 {
            controls.speed_up();
        }
        assert_eq!(controls.playback_speed, 4.0);
        for _ in 0..10 {
            controls.speed_down();
        }
        assert_eq!(controls.playback_speed, 0.25);
        assert_eq!(controls.speed_string(), "0.25x");
    }

    #[test]
    fn test_step_only_while_paused() {
        let mut controls = PlaybackControls::default();
        controls.step_forward();
        assert!(!controls.step_pending);
        controls.toggle_pause();
        controls.step_forward();
        assert!(controls.step_pending);
        assert_eq!(controls.speed_string(), "PAUSED");
    }

    #[test]
    fn test_status_rendering() {
        let status = PlayerStatus {
            state: PlaybackState::Error,
            detail: Some("loading failed: episode 'x' not found".into()),
        };
        assert_eq!(
            status.to_string(),
            "error: loading failed: episode 'x' not found"
        );
        assert!(PlaybackState::Cancelled.is_terminal());
        assert!(PlaybackState::Positioning.owns_pose());
        assert!(!PlaybackState::Idle.owns_pose());
    }
}
