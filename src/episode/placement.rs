//! Object placements - where movable props start an episode
//!
//! Stores have accumulated several shapes for placement data over time.
//! Everything is normalized here, at ingress, into one canonical struct.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Rigid-body parameters handed to the physics collaborator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhysicsProps {
    pub mass: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub friction: f32,
    pub restitution: f32,
}

impl Default for PhysicsProps {
    fn default() -> Self {
        Self {
            mass: 1.0,
            linear_damping: 0.5,
            angular_damping: 0.5,
            friction: 0.7,
            restitution: 0.0,
        }
    }
}

/// Canonical placement of one object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectPlacement {
    pub id: String,
    pub position: [f32; 3],
    /// Euler angles, XYZ order, radians
    pub rotation: [f32; 3],
    pub scale: f32,
    #[serde(rename = "physicsProps", alias = "physics")]
    pub physics: PhysicsProps,
}

impl ObjectPlacement {
    pub fn new(id: impl Into<String>, position: Vec3) -> Self {
        Self {
            id: id.into(),
            position: position.to_array(),
            rotation: [0.0; 3],
            scale: 1.0,
            physics: PhysicsProps::default(),
        }
    }

    pub fn translation(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    pub fn orientation(&self) -> Quat {
        let [x, y, z] = self.rotation;
        Quat::from_euler(EulerRot::XYZ, x, y, z)
    }

    /// Normalize a single raw object. Missing or non-finite values take defaults.
    pub fn from_value(raw: &Value) -> Self {
        let id = raw
            .get("id")
            .and_then(non_empty_str)
            .or_else(|| raw.get("name").and_then(non_empty_str))
            .map(str::to_string)
            .unwrap_or_else(|| format!("object-{}", uuid::Uuid::new_v4().simple()));

        let nested = raw.get("physicsProps").or_else(|| raw.get("physics"));
        // Flat fields win over the nested object, matching how older files were written
        let physics_field = |name: &str, default: f32| {
            raw.get(name)
                .and_then(finite_f32)
                .filter(|v| *v != 0.0)
                .or_else(|| nested.and_then(|n| n.get(name)).and_then(finite_f32))
                .unwrap_or(default)
        };
        let defaults = PhysicsProps::default();

        Self {
            id,
            position: vec3_field(raw.get("position"), [0.0; 3]),
            rotation: vec3_field(raw.get("rotation"), [0.0; 3]),
            scale: scale_field(raw.get("scale")),
            physics: PhysicsProps {
                mass: physics_field("mass", defaults.mass),
                linear_damping: physics_field("linearDamping", defaults.linear_damping),
                angular_damping: physics_field("angularDamping", defaults.angular_damping),
                friction: physics_field("friction", defaults.friction),
                restitution: physics_field("restitution", defaults.restitution),
            },
        }
    }
}

/// Extract and normalize placements from any known container shape:
/// a bare array, `objectPlacements`, `objectPositions`, `object_positions`
/// or `metadata.object_positions`. Unknown shapes yield an empty list.
pub fn normalize_placements(data: &Value) -> Vec<ObjectPlacement> {
    let list = match data {
        Value::Array(items) => Some(items),
        Value::Object(map) => ["objectPlacements", "objectPositions", "object_positions"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array))
            .or_else(|| {
                map.get("metadata")
                    .and_then(|m| m.get("object_positions"))
                    .and_then(Value::as_array)
            }),
        _ => None,
    };

    match list {
        Some(items) => items
            .iter()
            .filter(|item| item.is_object())
            .map(ObjectPlacement::from_value)
            .collect(),
        None => {
            warn!("No object placements found in document");
            Vec::new()
        }
    }
}

fn non_empty_str(v: &Value) -> Option<&str> {
    v.as_str().filter(|s| !s.is_empty())
}

fn finite_f32(v: &Value) -> Option<f32> {
    v.as_f64().map(|f| f as f32).filter(|f| f.is_finite())
}

fn vec3_field(v: Option<&Value>, default: [f32; 3]) -> [f32; 3] {
    let Some(items) = v.and_then(Value::as_array) else {
        return default;
    };
    let mut out = default;
    for (slot, item) in out.iter_mut().zip(items.iter()) {
        if let Some(f) = finite_f32(item) {
            *slot = f;
        }
    }
    out
}

fn scale_field(v: Option<&Value>) -> f32 {
    let scale = match v {
        Some(Value::Array(items)) => items.first().and_then(finite_f32),
        Some(other) => finite_f32(other),
        None => None,
    };
    scale.filter(|s| *s > 0.0).unwrap_or(1.0)
}
