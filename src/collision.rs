//! Collision monitor
//!
//! Turns raw contact notifications into the per-frame collision flag. Floor
//! colliders are ignored and contacts inside the cooldown window after an
//! accepted one are dropped. The flag holds until the cooldown passes or
//! the scene resets.

use bevy::prelude::*;

use crate::constants::{COLLISION_COOLDOWN_MS, IGNORED_COLLIDERS};

#[derive(Debug, Clone)]
pub struct CollisionMonitor {
    pub cooldown_ms: u64,
    pub ignored: Vec<String>,
    last_accepted_ms: Option<u64>,
    active: bool,
    last_collider: Option<String>,
}

impl Default for CollisionMonitor {
    fn default() -> Self {
        Self {
            cooldown_ms: COLLISION_COOLDOWN_MS,
            ignored: IGNORED_COLLIDERS.iter().map(|s| s.to_string()).collect(),
            last_accepted_ms: None,
            active: false,
            last_collider: None,
        }
    }
}

impl CollisionMonitor {
    pub fn new(cooldown_ms: u64, ignored: Vec<String>) -> Self {
        Self {
            cooldown_ms,
            ignored,
            ..Default::default()
        }
    }

    /// Report a contact; returns true when it counts as a new collision
    pub fn on_contact(&mut self, collider: &str, now_ms: u64) -> bool {
        if self.ignored.iter().any(|name| name == collider) {
            return false;
        }
        if let Some(last) = self.last_accepted_ms
            && now_ms.saturating_sub(last) < self.cooldown_ms
        {
            debug!("Collision with {} inside cooldown, ignored", collider);
            return false;
        }
        info!("Collision with {}", collider);
        self.last_accepted_ms = Some(now_ms);
        self.active = true;
        self.last_collider = Some(collider.to_string());
        true
    }

    /// Release the flag once the cooldown has passed
    pub fn update(&mut self, now_ms: u64) {
        if self.active
            && let Some(last) = self.last_accepted_ms
            && now_ms.saturating_sub(last) >= self.cooldown_ms
        {
            self.active = false;
        }
    }

    pub fn is_colliding(&self) -> bool {
        self.active
    }

    pub fn last_collider(&self) -> Option<&str> {
        self.last_collider.as_deref()
    }

    /// Scene reset: clear the flag; the cooldown clock is kept
    pub fn reset(&mut self) {
        self.active = false;
        self.last_collider = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_is_ignored() {
        let mut monitor = CollisionMonitor::default();
        assert!(!monitor.on_contact("HallFloor", 0));
        assert!(!monitor.is_colliding());
    }

    #[test]
    fn test_cooldown_and_release() {
        let mut monitor = CollisionMonitor::default();
        assert!(monitor.on_contact("Wall", 1000));
        assert!(!monitor.on_contact("Chair", 1200));
        assert_eq!(monitor.last_collider(), Some("Wall"));

        monitor.update(2000);
        assert!(monitor.is_colliding());
        monitor.update(2500);
        assert!(!monitor.is_colliding());
        assert!(monitor.on_contact("Chair", 2600));
    }

    #[test]
    fn test_reset_clears_flag() {
        let mut monitor = CollisionMonitor::default();
        monitor.on_contact("Wall", 0);
        monitor.reset();
        assert!(!monitor.is_colliding());
    }
}
