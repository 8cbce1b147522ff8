//! Episode document - the persisted form of a recorded episode
//!
//! Written as `{"version":1, "name", "recordedAt", "terminationReason",
//! "objectPlacements", "frames"}`. Reading is lenient about the container
//! (bare array, `data`, `episodes`) but strict about the frames themselves.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::frame::Frame;
use super::placement::{ObjectPlacement, normalize_placements};
use crate::error::InvalidEpisodeError;
use crate::transport::ReplayStep;

pub const DOCUMENT_VERSION: u32 = 1;

/// Why a recording ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Manual,
    Collision,
    TriggerAction,
    TimeExpired,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Manual => "manual",
            StopReason::Collision => "collision",
            StopReason::TriggerAction => "trigger_action",
            StopReason::TimeExpired => "time_expired",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(StopReason::Manual),
            "collision" => Some(StopReason::Collision),
            "trigger_action" | "trigger" => Some(StopReason::TriggerAction),
            "time_expired" | "timeout" => Some(StopReason::TimeExpired),
            _ => None,
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A complete recorded episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    #[serde(default = "current_version")]
    pub version: u32,
    #[serde(default)]
    pub name: String,
    /// RFC 3339 timestamp
    #[serde(default)]
    pub recorded_at: String,
    #[serde(default)]
    pub termination_reason: Option<StopReason>,
    #[serde(default)]
    pub object_placements: Vec<ObjectPlacement>,
    pub frames: Vec<Frame>,
}

fn current_version() -> u32 {
    DOCUMENT_VERSION
}

impl Episode {
    pub fn new(
        name: impl Into<String>,
        frames: Vec<Frame>,
        object_placements: Vec<ObjectPlacement>,
        termination_reason: Option<StopReason>,
    ) -> Self {
        Self {
            version: DOCUMENT_VERSION,
            name: name.into(),
            recorded_at: chrono::Utc::now().to_rfc3339(),
            termination_reason,
            object_placements,
            frames,
        }
    }

    /// Check the frame sequence is non-empty, finite and strictly increasing
    pub fn validate(&self) -> Result<(), InvalidEpisodeError> {
        validate_frames(&self.frames)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse any accepted document shape. Frames are validated; placements
    /// are normalized.
    pub fn from_json(json: &str) -> Result<Self, InvalidEpisodeError> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| InvalidEpisodeError::Malformed(e.to_string()))?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, InvalidEpisodeError> {
        let frames = frames_from_value(value)?;
        let object_placements = normalize_placements(value);
        let text = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let termination_reason = value
            .get("terminationReason")
            .and_then(Value::as_str)
            .and_then(StopReason::from_str);

        Ok(Self {
            version: value
                .get("version")
                .and_then(Value::as_u64)
                .map(|v| v as u32)
                .unwrap_or(DOCUMENT_VERSION),
            name: text("name"),
            recorded_at: text("recordedAt"),
            termination_reason,
            object_placements,
            frames,
        })
    }
}

/// Extract frames from any accepted container shape and validate them
pub fn frames_from_value(value: &Value) -> Result<Vec<Frame>, InvalidEpisodeError> {
    let entries = frame_entries(value).ok_or_else(|| {
        InvalidEpisodeError::Malformed("no frame list found in document".to_string())
    })?;

    let mut frames = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        if entry.get("state").is_some_and(Value::is_array) {
            let step: ReplayStep = serde_json::from_value(entry.clone())
                .map_err(|e| InvalidEpisodeError::Malformed(format!("entry {index}: {e}")))?;
            frames.push(step.to_frame());
        } else if is_frame_like(entry) {
            let frame: Frame = serde_json::from_value(entry.clone())
                .map_err(|e| InvalidEpisodeError::Malformed(format!("entry {index}: {e}")))?;
            frames.push(frame);
        } else {
            debug!("Skipping non-frame entry {index} in episode document");
        }
    }

    // Very old recordings carry no frame numbers at all
    if frames.len() > 1 && frames.iter().all(|f| f.frame_number == 0) {
        for (i, frame) in frames.iter_mut().enumerate() {
            frame.frame_number = i as u64;
        }
    }

    drop_out_of_order(&mut frames);
    validate_frames(&frames)?;
    Ok(frames)
}

/// Keep only frames whose numbers strictly increase. Older recordings
/// restart numbering after a mid-recording reset.
fn drop_out_of_order(frames: &mut Vec<Frame>) {
    let before = frames.len();
    let mut previous: Option<u64> = None;
    frames.retain(|frame| {
        let keep = previous.is_none_or(|prev| frame.frame_number > prev);
        if keep {
            previous = Some(frame.frame_number);
        }
        keep
    });
    if frames.len() < before {
        warn!(
            "Dropped {} out-of-order or duplicate frames",
            before - frames.len()
        );
    }
}

pub fn validate_frames(frames: &[Frame]) -> Result<(), InvalidEpisodeError> {
    if frames.is_empty() {
        return Err(InvalidEpisodeError::Empty);
    }
    let mut previous: Option<u64> = None;
    for (index, frame) in frames.iter().enumerate() {
        frame.validate(index)?;
        if let Some(prev) = previous
            && frame.frame_number <= prev
        {
            return Err(InvalidEpisodeError::OutOfOrder {
                index,
                frame_number: frame.frame_number,
                previous: prev,
            });
        }
        previous = Some(frame.frame_number);
    }
    Ok(())
}

fn frame_entries(value: &Value) -> Option<&Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(map) => map
            .get("frames")
            .and_then(Value::as_array)
            .or_else(|| map.get("data").and_then(Value::as_array))
            .or_else(|| {
                map.get("episodes")
                    .and_then(Value::as_array)
                    .and_then(|eps| eps.first())
                    .and_then(Value::as_array)
            }),
        _ => None,
    }
}

const FRAME_KEYS: [&str; 8] = [
    "robot_pos",
    "position",
    "robot_position",
    "frame_number",
    "frameNumber",
    "currentActions",
    "activeActions",
    "time_left",
];

fn is_frame_like(entry: &Value) -> bool {
    entry
        .as_object()
        .is_some_and(|map| FRAME_KEYS.iter().any(|k| map.contains_key(*k)))
}

/// Derive a store-unique key like `run_1718000000000.json`
pub fn unique_key(base: &str) -> String {
    let base = base.trim().trim_end_matches(".json");
    let base = if base.is_empty() { "episode" } else { base };
    format!("{}_{}.json", base, chrono::Utc::now().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(n: u64) -> Frame {
        Frame {
            frame_number: n,
            ..default()
        }
    }

    #[test]
    fn test_round_trip_document() {
        let mut f = frame(0);
        f.active_actions.insert("w".into());
        f.key_durations.insert("w".into(), 1);
        let episode = Episode::new(
            "t1",
            vec![f, frame(1), frame(2)],
            vec![ObjectPlacement::new("cup", Vec3::new(1.0, 2.0, 3.0))],
            Some(StopReason::Collision),
        );
        let parsed = Episode::from_json(&episode.to_json().unwrap()).unwrap();
        assert_eq!(parsed, episode);
    }

    #[test]
    fn test_legacy_containers() {
        let frames = json!([{ "frame_number": 0 }, { "frame_number": 1 }]);
        for doc in [
            frames.clone(),
            json!({ "data": frames.clone() }),
            json!({ "episodes": [frames.clone()] }),
        ] {
            assert_eq!(frames_from_value(&doc).unwrap().len(), 2);
        }
    }

    #[test]
    fn test_non_frame_entries_discarded() {
        let doc = json!([
            { "frame_number": 0 },
            { "frame_number": 1 },
            { "terminated": true, "reason": "collision" },
        ]);
        assert_eq!(frames_from_value(&doc).unwrap().len(), 2);
    }

    #[test]
    fn test_rejects_empty_and_malformed() {
        assert_eq!(frames_from_value(&json!([])), Err(InvalidEpisodeError::Empty));
        assert!(matches!(
            Episode::from_json("{ not json"),
            Err(InvalidEpisodeError::Malformed(_))
        ));
        assert!(matches!(
            validate_frames(&[frame(2), frame(1)]),
            Err(InvalidEpisodeError::OutOfOrder { index: 1, .. })
        ));
    }

    #[test]
    fn test_restarted_numbering_is_dropped_on_load() {
        let doc = json!([
            { "frame_number": 0 },
            { "frame_number": 1 },
            { "frame_number": 2 },
            { "frame_number": 0 },
            { "frame_number": 2 },
            { "frame_number": 3 },
        ]);
        let numbers: Vec<u64> = frames_from_value(&doc)
            .unwrap()
            .iter()
            .map(|f| f.frame_number)
            .collect();
        assert_eq!(numbers, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_zero_rotation_rejected_on_load() {
        let doc = json!([
            { "frame_number": 0, "robot_rot": [0, 0, 0, 1] },
            { "frame_number": 1, "robot_rot": [0, 0, 0, 0] },
        ]);
        assert_eq!(
            frames_from_value(&doc),
            Err(InvalidEpisodeError::DegenerateRotation { index: 1 })
        );
    }

    #[test]
    fn test_unnumbered_frames_are_numbered_by_position() {
        let doc = json!([{ "robot_pos": [0, 0, 0] }, { "robot_pos": [1, 0, 0] }]);
        let frames = frames_from_value(&doc).unwrap();
        assert_eq!(frames[1].frame_number, 1);
    }

    #[test]
    fn test_unique_key() {
        let key = unique_key("lap.json");
        assert!(key.starts_with("lap_"));
        assert!(key.ends_with(".json"));
        assert!(unique_key("").starts_with("episode_"));
    }
}
