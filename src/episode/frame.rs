//! Frame - one tick of captured robot state

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::InvalidEpisodeError;

/// A single label reported by the vision service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "DetectionRepr")]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
}

/// Older recordings stored bare label strings
#[derive(Deserialize)]
#[serde(untagged)]
enum DetectionRepr {
    Label(String),
    Full {
        #[serde(alias = "name", alias = "class")]
        label: String,
        #[serde(default = "full_confidence")]
        confidence: f32,
    },
}

fn full_confidence() -> f32 {
    1.0
}

impl From<DetectionRepr> for Detection {
    fn from(repr: DetectionRepr) -> Self {
        match repr {
            DetectionRepr::Label(label) => Self {
                label,
                confidence: 1.0,
            },
            DetectionRepr::Full { label, confidence } => Self { label, confidence },
        }
    }
}

/// An object inside the camera frustum, ordered nearest-to-center first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectInView {
    pub id: String,
    #[serde(default)]
    pub distance: f32,
    /// 1.0 = dead center of the view, 0.0 = at the frustum edge
    #[serde(default)]
    pub centrality: f32,
}

/// Immutable snapshot of robot state for one tick
///
/// Field names on the wire follow the training backend (`robot_pos`,
/// `currentActions`, `time_left`, ...). Older camelCase names are accepted
/// when reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(
        rename = "robot_pos",
        alias = "position",
        alias = "robot_position",
        default
    )]
    pub position: [f32; 3],
    #[serde(
        rename = "robot_rot",
        alias = "rotation",
        alias = "robot_rotation",
        default = "identity_rotation"
    )]
    pub rotation: [f32; 4],
    #[serde(
        rename = "currentActions",
        alias = "activeActions",
        alias = "current_actions",
        default
    )]
    pub active_actions: BTreeSet<String>,
    #[serde(rename = "key_durations", alias = "keyDurations", default)]
    pub key_durations: BTreeMap<String, u32>,
    #[serde(default)]
    pub collision: bool,
    #[serde(rename = "detectedObjects", alias = "detected_objects", default)]
    pub detected_objects: Vec<Detection>,
    #[serde(rename = "objectsInView", alias = "objects_in_view", default)]
    pub objects_in_view: Vec<ObjectInView>,
    #[serde(rename = "target_object", alias = "targetObject", default)]
    pub target_object: String,
    #[serde(rename = "time_left", alias = "timeRemaining", default)]
    pub time_remaining: f32,
    #[serde(rename = "frame_number", alias = "frameNumber", default)]
    pub frame_number: u64,
}

/// Below this a stored rotation carries no direction
const MIN_ROTATION_LENGTH_SQ: f32 = 1e-6;

fn identity_rotation() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            rotation: identity_rotation(),
            active_actions: BTreeSet::new(),
            key_durations: BTreeMap::new(),
            collision: false,
            detected_objects: Vec::new(),
            objects_in_view: Vec::new(),
            target_object: String::new(),
            time_remaining: 0.0,
            frame_number: 0,
        }
    }
}

impl Frame {
    pub fn translation(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    /// Stored rotation as a unit quaternion; degenerate input faces identity
    pub fn orientation(&self) -> Quat {
        let q = Quat::from_array(self.rotation);
        if q.is_finite() && q.length_squared() > MIN_ROTATION_LENGTH_SQ {
            q.normalize()
        } else {
            Quat::IDENTITY
        }
    }

    pub fn has_action(&self, symbol: &str) -> bool {
        self.active_actions.contains(symbol)
    }

    /// Check every numeric field is finite; `index` is only used for the error
    pub fn validate(&self, index: usize) -> Result<(), InvalidEpisodeError> {
        let non_finite = |field| InvalidEpisodeError::NonFinite { index, field };
        if !self.position.iter().all(|v| v.is_finite()) {
            return Err(non_finite("position"));
        }
        if !self.rotation.iter().all(|v| v.is_finite()) {
            return Err(non_finite("rotation"));
        }
        if Quat::from_array(self.rotation).length_squared() <= MIN_ROTATION_LENGTH_SQ {
            return Err(InvalidEpisodeError::DegenerateRotation { index });
        }
        if !self.time_remaining.is_finite() {
            return Err(non_finite("time remaining"));
        }
        if self.detected_objects.iter().any(|d| !d.confidence.is_finite()) {
            return Err(non_finite("detection confidence"));
        }
        if self
            .objects_in_view
            .iter()
            .any(|o| !o.distance.is_finite() || !o.centrality.is_finite())
        {
            return Err(non_finite("object in view"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        let mut frame = Frame {
            frame_number: 7,
            ..default()
        };
        frame.active_actions.insert("w".into());
        let json = serde_json::to_value(&frame).unwrap();
        assert!(json.get("robot_pos").is_some());
        assert!(json.get("robot_rot").is_some());
        assert_eq!(json["currentActions"], serde_json::json!(["w"]));
        assert_eq!(json["frame_number"], 7);
        assert!(json.get("time_left").is_some());
    }

    #[test]
    fn test_legacy_aliases_and_defaults() {
        let json = r#"{"position":[1,2,3],"activeActions":["a","w"],"frameNumber":4,
                       "detectedObjects":["chair",{"label":"cup","confidence":0.8}]}"#;
        let frame: Frame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.position, [1.0, 2.0, 3.0]);
        assert_eq!(frame.rotation, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(frame.frame_number, 4);
        assert!(frame.has_action("a"));
        assert_eq!(frame.detected_objects[0].label, "chair");
        assert_eq!(frame.detected_objects[0].confidence, 1.0);
        assert_eq!(frame.detected_objects[1].confidence, 0.8);
        assert!(frame.key_durations.is_empty());
    }

    #[test]
    fn test_validate_rejects_non_finite() {
        let frame = Frame {
            position: [0.0, f32::NAN, 0.0],
            ..default()
        };
        assert_eq!(
            frame.validate(3),
            Err(InvalidEpisodeError::NonFinite {
                index: 3,
                field: "position"
            })
        );
        assert!(Frame::default().validate(0).is_ok());
    }

    #[test]
    fn test_rotation_is_unit_length() {
        let zero = Frame {
            rotation: [0.0; 4],
            ..default()
        };
        assert_eq!(
            zero.validate(0),
            Err(InvalidEpisodeError::DegenerateRotation { index: 0 })
        );
        assert_eq!(zero.orientation(), Quat::IDENTITY);

        let scaled = Frame {
            rotation: [0.0, 0.0, 0.0, 2.0],
            ..default()
        };
        assert!(scaled.validate(1).is_ok());
        assert!(scaled.orientation().is_normalized());
        assert!(scaled.orientation().dot(Quat::IDENTITY).abs() > 1.0 - 1e-6);
    }
}
