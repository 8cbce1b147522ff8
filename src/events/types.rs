//! Event types carried by the simulation event queue

use crate::episode::Detection;
use crate::error::{StoreError, TransportError};
use crate::playback::{LoadedEpisode, SourceMode};
use crate::transport::InboundMessage;

/// Operator intents, from the keyboard, a script or the CLI
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    StartRecording,
    StopRecording,
    SaveRecording { name: String },
    AbandonRecording,
    SelectEpisode { key: String, mode: SourceMode },
    Play,
    CancelPlayback,
    AcknowledgePlayback,
    TogglePause,
    StepForward,
    SpeedUp,
    SpeedDown,
    ResetScene,
    RefreshEpisodeList,
}

/// Everything that can happen to the session between two ticks
#[derive(Debug)]
pub enum SimEvent {
    Command(Command),
    /// Contact reported by the physics collaborator
    Contact { collider: String },
    /// Scene finished a reset requested earlier
    SceneResetDone,
    SaveCompleted {
        key: String,
        result: Result<(), TransportError>,
    },
    EpisodeLoaded {
        key: String,
        result: Result<LoadedEpisode, StoreError>,
    },
    EpisodeList(Result<Vec<String>, TransportError>),
    VisionResult(Result<Vec<Detection>, TransportError>),
    Inbound(InboundMessage),
    TransportLost(String),
}

impl SimEvent {
    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            SimEvent::Command(_) => "command",
            SimEvent::Contact { .. } => "contact",
            SimEvent::SceneResetDone => "scene_reset_done",
            SimEvent::SaveCompleted { .. } => "save_completed",
            SimEvent::EpisodeLoaded { .. } => "episode_loaded",
            SimEvent::EpisodeList(_) => "episode_list",
            SimEvent::VisionResult(_) => "vision_result",
            SimEvent::Inbound(_) => "inbound",
            SimEvent::TransportLost(_) => "transport_lost",
        }
    }
}
