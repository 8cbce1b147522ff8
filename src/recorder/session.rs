//! Recording session state

use chrono::{DateTime, Utc};

use crate::episode::{Frame, ObjectPlacement, StopReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecorderState {
    #[default]
    Idle,
    Recording,
    Stopped,
}

impl RecorderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecorderState::Idle => "idle",
            RecorderState::Recording => "recording",
            RecorderState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for RecorderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable recorder status, rendered as `status: reason`
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RecorderStatus {
    #[default]
    Idle,
    Recording,
    Stopped(StopReason),
    Saving(String),
    Saved(String),
    SaveFailed(String),
    Discarded,
}

impl std::fmt::Display for RecorderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecorderStatus::Idle => write!(f, "idle"),
            RecorderStatus::Recording => write!(f, "recording"),
            RecorderStatus::Stopped(reason) => write!(f, "stopped: {}", reason),
            RecorderStatus::Saving(key) => write!(f, "saving: {}", key),
            RecorderStatus::Saved(key) => write!(f, "saved: {}", key),
            RecorderStatus::SaveFailed(cause) => write!(f, "save failed: {}", cause),
            RecorderStatus::Discarded => write!(f, "idle: discarded"),
        }
    }
}

/// Everything owned by one recording
#[derive(Debug, Clone, Default)]
pub struct RecordingSession {
    pub state: RecorderState,
    pub buffer: Vec<Frame>,
    pub started_at: Option<DateTime<Utc>>,
    pub stop_reason: Option<StopReason>,
    pub object_placements: Vec<ObjectPlacement>,
    /// Key of the save currently in flight
    pub saving: Option<String>,
}

impl RecordingSession {
    pub fn begin(object_placements: Vec<ObjectPlacement>) -> Self {
        Self {
            state: RecorderState::Recording,
            buffer: Vec::with_capacity(1024),
            started_at: Some(Utc::now()),
            stop_reason: None,
            object_placements,
            saving: None,
        }
    }

    /// Seconds since the session began
    pub fn duration_secs(&self) -> f64 {
        self.started_at
            .map(|t| (Utc::now() - t).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0)
    }
}
