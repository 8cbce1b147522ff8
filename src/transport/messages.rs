//! Wire messages exchanged with the training backend over the socket
//!
//! Every message is a JSON envelope `{"event": <name>, "data": <payload>}`.
//! Inbound replay steps carry Euler XYZ angles; they are converted to
//! quaternions here so nothing past this module sees Euler angles.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeSet;

use crate::episode::Frame;
use crate::error::TransportError;

/// Raw socket envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// One step of a replay streamed by the backend
///
/// `state` is `[x, y, z, rx, ry, rz]` with XYZ Euler radians. A 7-value
/// `[x, y, z, qx, qy, qz, qw]` state is also accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayStep {
    #[serde(alias = "frame_number", default)]
    pub step: u64,
    #[serde(default)]
    pub total_steps: Option<u64>,
    #[serde(alias = "actions", alias = "currentActions", default)]
    pub action: BTreeSet<String>,
    #[serde(default)]
    pub state: Vec<f32>,
}

impl ReplayStep {
    pub fn from_frame(frame: &Frame, total_steps: Option<u64>) -> Self {
        let (rx, ry, rz) = frame.orientation().to_euler(EulerRot::XYZ);
        let [x, y, z] = frame.position;
        Self {
            step: frame.frame_number,
            total_steps,
            action: frame.active_actions.clone(),
            state: vec![x, y, z, rx, ry, rz],
        }
    }

    fn component(&self, i: usize) -> f32 {
        self.state
            .get(i)
            .copied()
            .filter(|v| v.is_finite())
            .unwrap_or(0.0)
    }

    pub fn position(&self) -> Vec3 {
        Vec3::new(self.component(0), self.component(1), self.component(2))
    }

    pub fn orientation(&self) -> Quat {
        if self.state.len() >= 7 {
            let q = Quat::from_xyzw(
                self.component(3),
                self.component(4),
                self.component(5),
                self.component(6),
            );
            if q.length_squared() > 0.0 {
                return q.normalize();
            }
            return Quat::IDENTITY;
        }
        Quat::from_euler(
            EulerRot::XYZ,
            self.component(3),
            self.component(4),
            self.component(5),
        )
    }

    /// Convert into a frame carrying only pose, actions and the frame number
    pub fn to_frame(&self) -> Frame {
        Frame {
            position: self.position().to_array(),
            rotation: self.orientation().to_array(),
            active_actions: self.action.clone(),
            frame_number: self.step,
            ..default()
        }
    }
}

/// Messages the simulator sends to the backend
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// Throttled live telemetry
    State(Frame),
    /// Sent once on collision onset, alongside the state push
    CollisionEvent { frame: Frame, timestamp_ms: u64 },
    StartReplay { filename: String },
    StopReplay,
}

impl OutboundMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            OutboundMessage::State(_) => "state",
            OutboundMessage::CollisionEvent { .. } => "collision_event",
            OutboundMessage::StartReplay { .. } => "start_replay",
            OutboundMessage::StopReplay => "stop_replay",
        }
    }

    pub fn to_envelope(&self) -> Result<Envelope, serde_json::Error> {
        let data = match self {
            OutboundMessage::State(frame) => serde_json::to_value(frame)?,
            OutboundMessage::CollisionEvent {
                frame,
                timestamp_ms,
            } => {
                let mut data = serde_json::to_value(frame)?;
                if let Value::Object(map) = &mut data {
                    map.insert("timestamp".into(), json!(timestamp_ms));
                    map.insert("event_type".into(), json!("collision"));
                }
                data
            }
            OutboundMessage::StartReplay { filename } => json!({ "filename": filename }),
            OutboundMessage::StopReplay => Value::Null,
        };
        Ok(Envelope {
            event: self.event_name().to_string(),
            data,
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_envelope()?)
    }
}

/// Messages the backend sends to the simulator
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    ReplayStep(ReplayStep),
    /// A full frame streamed instead of a compact step
    ReplayFrame(Frame),
    ReplayComplete,
    /// Status text from the backend's episode loader
    ReplayStatus { status: String, message: String },
    /// Anything else; kept for logging
    Other(String),
}

impl InboundMessage {
    pub fn parse(text: &str) -> Result<Self, TransportError> {
        let envelope: Envelope = serde_json::from_str(text)?;
        Self::from_envelope(envelope)
    }

    pub fn from_envelope(envelope: Envelope) -> Result<Self, TransportError> {
        let msg = match envelope.event.as_str() {
            "replay_step" | "replay_action" => {
                InboundMessage::ReplayStep(serde_json::from_value(envelope.data)?)
            }
            "replay_frame" => InboundMessage::ReplayFrame(serde_json::from_value(envelope.data)?),
            "replay_complete" => InboundMessage::ReplayComplete,
            "replay_status" => {
                let field = |k: &str| {
                    envelope
                        .data
                        .get(k)
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                };
                InboundMessage::ReplayStatus {
                    status: field("status"),
                    message: field("message"),
                }
            }
            other => InboundMessage::Other(other.to_string()),
        };
        Ok(msg)
    }
}
