//! Tunable constants for navsim
//!
//! Defaults for the recorder, player and telemetry. Most of these can be
//! overridden through `SimSettings`.

use bevy::prelude::*;

// =============================================================================
// TICK / CLOCK
// =============================================================================

pub const DEFAULT_TICK_HZ: f32 = 60.0;

// =============================================================================
// AGENT
// =============================================================================

/// Spawn position of the buggy (also the replay fallback when no frames exist)
pub const SPAWN_POSITION: Vec3 = Vec3::new(7.0, 0.1, 15.0);
/// Spawn yaw in radians (facing down the hall)
pub const SPAWN_YAW: f32 = -std::f32::consts::FRAC_PI_2;

pub const AGENT_MOVE_SPEED: f32 = 4.0; // World units per second at full throttle
pub const AGENT_TURN_SPEED: f32 = 3.0; // Radians per second

/// Action symbols understood by the agent and the training backend
pub const ACTION_FORWARD: &str = "w";
pub const ACTION_LEFT: &str = "a";
pub const ACTION_BACK: &str = "s";
pub const ACTION_RIGHT: &str = "d";
pub const ACTION_CAPTURE: &str = "v";
pub const ACTIONS: [&str; 5] = [
    ACTION_FORWARD,
    ACTION_LEFT,
    ACTION_BACK,
    ACTION_RIGHT,
    ACTION_CAPTURE,
];

// =============================================================================
// RECORDING / AUTO-STOP
// =============================================================================

pub const DEFAULT_TIME_LIMIT_SECS: f32 = 350.0;
pub const TRIGGER_COOLDOWN_MS: u64 = 500;
/// Collision notifications closer together than this are ignored
pub const COLLISION_COOLDOWN_MS: u64 = 1500;
/// Colliders that never count as a collision (the robot rests on them)
pub const IGNORED_COLLIDERS: [&str; 3] = ["RoomFloor", "HallFloor", "Plane"];
pub const DEFAULT_TARGET_OBJECT: &str = "cup";

// =============================================================================
// PLAYBACK / SETTLEMENT
// =============================================================================

pub const SETTLE_STABLE_TICKS: u32 = 20;
pub const SETTLE_EPSILON: f32 = 0.01;
pub const SETTLE_MAX_TICKS: u32 = 300;

// =============================================================================
// TELEMETRY / VISION
// =============================================================================

pub const TELEMETRY_INTERVAL_FRAMES: u64 = 10;
pub const TELEMETRY_POSITION_THRESHOLD: f32 = 0.05;
pub const VISION_INTERVAL_MS: u64 = 400;

// =============================================================================
// ENDPOINTS
// =============================================================================

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:5001";
pub const DEFAULT_SOCKET_URL: &str = "ws://localhost:5000";
pub const DEFAULT_EPISODE_DIR: &str = "replays";
