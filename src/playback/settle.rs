//! Settlement tracking for freshly placed objects
//!
//! Objects count as settled after `stable_ticks` consecutive ticks in which
//! every tracked object moved less than `epsilon`. Any violation restarts the
//! count. The wait is bounded by `max_ticks`.

use bevy::prelude::*;
use std::collections::HashMap;

use crate::constants::{SETTLE_EPSILON, SETTLE_MAX_TICKS, SETTLE_STABLE_TICKS};
use crate::error::SettlementTimeoutError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SettleConfig {
    pub stable_ticks: u32,
    pub epsilon: f32,
    pub max_ticks: u32,
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            stable_ticks: SETTLE_STABLE_TICKS,
            epsilon: SETTLE_EPSILON,
            max_ticks: SETTLE_MAX_TICKS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettleProgress {
    Waiting,
    Settled,
    TimedOut(SettlementTimeoutError),
}

#[derive(Debug, Clone)]
pub struct SettlementTracker {
    config: SettleConfig,
    last_positions: HashMap<String, Vec3>,
    consecutive: u32,
    elapsed: u32,
}

impl SettlementTracker {
    /// Start tracking from the positions objects were placed at
    pub fn new(config: SettleConfig, placed: impl IntoIterator<Item = (String, Vec3)>) -> Self {
        Self {
            config,
            last_positions: placed.into_iter().collect(),
            consecutive: 0,
            elapsed: 0,
        }
    }

    pub fn elapsed_ticks(&self) -> u32 {
        self.elapsed
    }

    pub fn stable_ticks(&self) -> u32 {
        self.consecutive
    }

    /// Feed one tick of polled positions
    pub fn observe(&mut self, positions: &[(String, Vec3)]) -> SettleProgress {
        self.elapsed += 1;

        let mut moving = 0;
        for (id, pos) in positions {
            let still = match self.last_positions.get(id) {
                Some(prev) => prev.distance(*pos) < self.config.epsilon,
                None => false,
            };
            if !still {
                moving += 1;
            }
            self.last_positions.insert(id.clone(), *pos);
        }
        // Tracked objects missing from the poll have not spawned yet
        let missing = self
            .last_positions
            .keys()
            .filter(|id| !positions.iter().any(|(p, _)| p == *id))
            .count();
        moving += missing;

        if moving == 0 {
            self.consecutive += 1;
        } else {
            self.consecutive = 0;
        }

        if self.consecutive >= self.config.stable_ticks {
            SettleProgress::Settled
        } else if self.elapsed >= self.config.max_ticks {
            SettleProgress::TimedOut(SettlementTimeoutError {
                ticks: self.elapsed,
                unsettled: moving,
            })
        } else {
            SettleProgress::Waiting
        }
    }
}
