//! Persistent simulator settings
//!
//! Loaded from `config/sim_settings.json`; missing fields take defaults, a
//! missing or unreadable file yields the defaults (and is written back on
//! first run so there is something to edit).

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::collision::CollisionMonitor;
use crate::constants::*;
use crate::playback::{PlayerConfig, SettleConfig};
use crate::recorder::AutoStopConfig;
use crate::store::StoreKind;
use crate::transport::TelemetryConfig;

/// Path to the settings file
pub const SETTINGS_FILE: &str = "config/sim_settings.json";

#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimSettings {
    pub tick_hz: f32,
    pub time_limit_secs: f32,
    /// Action symbol that ends a recording (camera trigger)
    pub trigger_action: String,
    /// Action symbol -> key name (`KeyW`, `ArrowUp`, `Space`, ...)
    pub key_bindings: BTreeMap<String, String>,
    pub trigger_cooldown_ms: u64,
    pub collision_cooldown_ms: u64,
    pub ignored_colliders: Vec<String>,
    pub settle_stable_ticks: u32,
    pub settle_epsilon: f32,
    pub settle_max_ticks: u32,
    pub telemetry_interval_frames: u64,
    pub telemetry_position_threshold: f32,
    pub backend_url: String,
    pub socket_url: String,
    pub vision_enabled: bool,
    pub vision_interval_ms: u64,
    /// `file:<dir>`, `sqlite:<path>`, `http:<url>` or `memory`
    pub episode_store: String,
    pub spawn_position: [f32; 3],
    pub spawn_yaw: f32,
    pub target_object: String,
    /// Seed for object placement; None = fresh entropy per session
    pub placement_seed: Option<u64>,
}

impl Default for SimSettings {
    fn default() -> Self {
        let key_bindings = [
            (ACTION_FORWARD, "KeyW"),
            (ACTION_LEFT, "KeyA"),
            (ACTION_BACK, "KeyS"),
            (ACTION_RIGHT, "KeyD"),
            (ACTION_CAPTURE, "KeyV"),
        ]
        .iter()
        .map(|(a, k)| (a.to_string(), k.to_string()))
        .collect();

        Self {
            tick_hz: DEFAULT_TICK_HZ,
            time_limit_secs: DEFAULT_TIME_LIMIT_SECS,
            trigger_action: ACTION_CAPTURE.to_string(),
            key_bindings,
            trigger_cooldown_ms: TRIGGER_COOLDOWN_MS,
            collision_cooldown_ms: COLLISION_COOLDOWN_MS,
            ignored_colliders: IGNORED_COLLIDERS.iter().map(|s| s.to_string()).collect(),
            settle_stable_ticks: SETTLE_STABLE_TICKS,
            settle_epsilon: SETTLE_EPSILON,
            settle_max_ticks: SETTLE_MAX_TICKS,
            telemetry_interval_frames: TELEMETRY_INTERVAL_FRAMES,
            telemetry_position_threshold: TELEMETRY_POSITION_THRESHOLD,
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            socket_url: DEFAULT_SOCKET_URL.to_string(),
            vision_enabled: false,
            vision_interval_ms: VISION_INTERVAL_MS,
            episode_store: format!("file:{}", DEFAULT_EPISODE_DIR),
            spawn_position: SPAWN_POSITION.to_array(),
            spawn_yaw: SPAWN_YAW,
            target_object: DEFAULT_TARGET_OBJECT.to_string(),
            placement_seed: None,
        }
    }
}

impl SimSettings {
    /// Load settings from the default file, or return defaults
    pub fn load() -> Self {
        Self::load_from(Path::new(SETTINGS_FILE))
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            info!("No {} found, using defaults", path.display());
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<SimSettings>(&content) {
                Ok(settings) => {
                    info!("Loaded settings from {}", path.display());
                    settings.sanitized()
                }
                Err(e) => {
                    warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read {}: {}, using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    /// Load, writing the defaults out if no file exists yet
    pub fn load_or_create() -> Self {
        let path = Path::new(SETTINGS_FILE);
        let existed = path.exists();
        let settings = Self::load_from(path);
        if !existed && let Err(e) = settings.save_to(path) {
            warn!("Failed to write default settings: {}", e);
        }
        settings
    }

    pub fn save_to(&self, path: &Path) -> Result<(), std::io::Error> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, json)?;
        info!("Saved settings to {}", path.display());
        Ok(())
    }

    /// Replace values that would break the tick loop with defaults
    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !(self.tick_hz.is_finite() && self.tick_hz > 0.0) {
            warn!("Invalid tick_hz {}, using {}", self.tick_hz, defaults.tick_hz);
            self.tick_hz = defaults.tick_hz;
        }
        if !(self.time_limit_secs.is_finite() && self.time_limit_secs > 0.0) {
            self.time_limit_secs = defaults.time_limit_secs;
        }
        if !self.settle_epsilon.is_finite() || self.settle_epsilon <= 0.0 {
            self.settle_epsilon = defaults.settle_epsilon;
        }
        if self.settle_max_ticks == 0 {
            self.settle_max_ticks = defaults.settle_max_ticks;
        }
        if self.trigger_action.is_empty() {
            self.trigger_action = defaults.trigger_action;
        }
        if !self.spawn_position.iter().all(|v| v.is_finite()) {
            self.spawn_position = defaults.spawn_position;
        }
        self
    }

    pub fn tick_dt(&self) -> f32 {
        1.0 / self.tick_hz
    }

    pub fn autostop_config(&self) -> AutoStopConfig {
        AutoStopConfig {
            trigger_symbol: self.trigger_action.clone(),
            trigger_cooldown_ms: self.trigger_cooldown_ms,
        }
    }

    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            interval_frames: self.telemetry_interval_frames,
            position_threshold: self.telemetry_position_threshold,
        }
    }

    pub fn player_config(&self) -> PlayerConfig {
        PlayerConfig {
            settle: SettleConfig {
                stable_ticks: self.settle_stable_ticks,
                epsilon: self.settle_epsilon,
                max_ticks: self.settle_max_ticks,
            },
            spawn_position: Vec3::from_array(self.spawn_position),
            spawn_yaw: self.spawn_yaw,
        }
    }

    pub fn collision_monitor(&self) -> CollisionMonitor {
        CollisionMonitor::new(self.collision_cooldown_ms, self.ignored_colliders.clone())
    }

    pub fn store_kind(&self) -> Option<StoreKind> {
        StoreKind::from_str(&self.episode_store)
    }

    pub fn vision_url(&self) -> String {
        format!("{}/yolo_predict", self.backend_url.trim_end_matches('/'))
    }
}
