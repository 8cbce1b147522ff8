//! Episode countdown timer
//!
//! Counts down from the configured limit while a recording runs. The value
//! is allowed to go negative; the auto-stop evaluator looks for the crossing.

use crate::constants::DEFAULT_TIME_LIMIT_SECS;

#[derive(Debug, Clone)]
pub struct EpisodeTimer {
    /// Seconds left (may be negative after expiry)
    pub remaining: f32,
    pub limit: f32,
    /// Whether the timer is counting
    pub active: bool,
}

impl Default for EpisodeTimer {
    fn default() -> Self {
        Self::new(DEFAULT_TIME_LIMIT_SECS)
    }
}

impl EpisodeTimer {
    pub fn new(limit: f32) -> Self {
        Self {
            remaining: limit,
            limit,
            active: false,
        }
    }

    /// Refill and start counting
    pub fn start(&mut self) {
        self.remaining = self.limit;
        self.active = true;
    }

    pub fn stop(&mut self) {
        self.active = false;
    }

    /// Refill without starting
    pub fn reset(&mut self) {
        self.remaining = self.limit;
    }

    pub fn tick(&mut self, dt: f32) {
        if self.active && dt.is_finite() {
            self.remaining -= dt;
        }
    }

    pub fn is_expired(&self) -> bool {
        self.remaining <= 0.0
    }

    /// Whole seconds for display, never below zero
    pub fn display_seconds(&self) -> u32 {
        self.remaining.max(0.0).ceil() as u32
    }
}
