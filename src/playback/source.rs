//! Where playback steps come from: a stored frame list or a live step stream

use std::collections::BTreeMap;

use crate::episode::Frame;
use crate::transport::ReplayStep;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceMode {
    #[default]
    Stored,
    Live,
}

impl SourceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceMode::Stored => "stored",
            SourceMode::Live => "live",
        }
    }
}

/// Frames of a loaded episode, consumed in order
#[derive(Debug, Clone, Default)]
pub struct StoredFrames {
    frames: Vec<Frame>,
    cursor: usize,
    accumulator: f32,
}

impl StoredFrames {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames,
            cursor: 0,
            accumulator: 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_finished(&self) -> bool {
        self.cursor >= self.frames.len()
    }

    /// Advance by `speed` frames worth of time and return the last frame
    /// passed over, if any
    pub fn advance(&mut self, speed: f32) -> Option<&Frame> {
        self.accumulator += speed;
        let mut count = 0;
        while self.accumulator >= 1.0 {
            self.accumulator -= 1.0;
            count += 1;
        }
        self.skip(count)
    }

    /// Advance exactly `count` frames, ignoring speed
    pub fn skip(&mut self, count: usize) -> Option<&Frame> {
        if count == 0 || self.is_finished() {
            return None;
        }
        let target = (self.cursor + count).min(self.frames.len());
        self.cursor = target;
        self.frames.get(target - 1)
    }
}

/// Steps streamed by the backend. Applied in strictly increasing step
/// order; late, duplicate and skipped-over steps are dropped.
#[derive(Debug, Clone, Default)]
pub struct LiveSteps {
    queued: BTreeMap<u64, ReplayStep>,
    last_applied: Option<u64>,
    pub total_steps: Option<u64>,
    pub dropped: u64,
}

impl LiveSteps {
    pub fn last_applied(&self) -> Option<u64> {
        self.last_applied
    }

    /// Queue a step; returns false when it arrived too late or twice
    pub fn push(&mut self, step: ReplayStep) -> bool {
        let stale = self.last_applied.is_some_and(|last| step.step <= last);
        if stale || self.queued.contains_key(&step.step) {
            self.dropped += 1;
            return false;
        }
        if step.total_steps.is_some() {
            self.total_steps = step.total_steps;
        }
        self.queued.insert(step.step, step);
        true
    }

    /// Newest queued step; everything older is discarded
    pub fn take_latest(&mut self) -> Option<ReplayStep> {
        let (_, latest) = self.queued.pop_last()?;
        self.dropped += self.queued.len() as u64;
        self.queued.clear();
        self.last_applied = Some(latest.step);
        Some(latest)
    }

    /// True once the final step announced by `total_steps` was applied
    pub fn reached_end(&self) -> bool {
        match (self.last_applied, self.total_steps) {
            (Some(last), Some(total)) => total > 0 && last + 1 >= total,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::prelude::default;

    fn frames(n: u64) -> Vec<Frame> {
        (0..n)
            .map(|i| Frame {
                frame_number: i,
                ..default()
            })
            .collect()
    }

    fn step(n: u64) -> ReplayStep {
        ReplayStep {
            step: n,
            total_steps: Some(10),
            action: Default::default(),
            state: vec![0.0; 6],
        }
    }

    #[test]
    fn test_stored_speed_accumulates() {
        let mut stored = StoredFrames::new(frames(10));
        assert!(stored.advance(0.5).is_none());
        assert_eq!(stored.advance(0.5).map(|f| f.frame_number), Some(0));
        assert_eq!(stored.advance(4.0).map(|f| f.frame_number), Some(4));
        assert_eq!(stored.cursor(), 5);
        assert_eq!(stored.advance(4.0).map(|f| f.frame_number), Some(8));
        assert_eq!(stored.advance(4.0).map(|f| f.frame_number), Some(9));
        assert!(stored.is_finished());
        assert!(stored.advance(1.0).is_none());
    }

    #[test]
    fn test_live_drops_stale_and_duplicate() {
        let mut live = LiveSteps::default();
        assert!(live.push(step(0)));
        assert!(!live.push(step(0)));
        assert_eq!(live.take_latest().map(|s| s.step), Some(0));
        assert!(!live.push(step(0)));
        assert!(live.push(step(2)));
        assert!(live.push(step(1)));
        // Skips to the newest; 1 is discarded
        assert_eq!(live.take_latest().map(|s| s.step), Some(2));
        assert!(!live.push(step(1)));
        assert_eq!(live.dropped, 4);
        assert!(live.take_latest().is_none());
    }

    #[test]
    fn test_live_end_from_total_steps() {
        let mut live = LiveSteps::default();
        live.push(step(9));
        live.take_latest();
        assert!(live.reached_end());
    }
}
