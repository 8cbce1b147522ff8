//! Headless scene - building colliders, placed props and their drop model
//!
//! Props fall under gravity with linear damping until they rest on a table
//! top or the floor. Contacts between the agent and named colliders are
//! reported to the event queue; what counts as a collision is decided later
//! by the collision monitor.

use bevy::prelude::*;

use crate::episode::{ObjectInView, ObjectPlacement};
use crate::events::{SimEvent, SimEventQueue};
use crate::randomizer::{TABLE_POSITIONS, TABLE_SIZE};

use super::SimClock;
use super::agent::{AGENT_RADIUS, AgentBody};

const GRAVITY: f32 = 9.81;

/// Half the horizontal field of view of the robot camera (radians)
pub const VIEW_HALF_ANGLE: f32 = 0.6;
/// Objects further away are not reported as in view
pub const VIEW_DISTANCE: f32 = 12.0;

/// Axis-aligned static collider
#[derive(Component, Debug, Clone)]
pub struct Obstacle {
    pub name: String,
    pub half_extents: Vec3,
}

/// A placed, movable prop
#[derive(Component, Debug, Clone)]
pub struct SceneObject {
    pub id: String,
    pub velocity: Vec3,
    pub linear_damping: f32,
}

/// Floor and outer walls of the building, plus the tables
pub fn building_colliders() -> Vec<(String, Vec3, Vec3)> {
    let mut colliders = vec![
        ("HallFloor".to_string(), Vec3::new(7.5, -0.05, 3.0), Vec3::new(14.0, 0.05, 17.0)),
        ("NorthWall".to_string(), Vec3::new(7.5, 1.5, -14.5), Vec3::new(14.0, 1.5, 0.25)),
        ("SouthWall".to_string(), Vec3::new(7.5, 1.5, 19.5), Vec3::new(14.0, 1.5, 0.25)),
        ("WestWall".to_string(), Vec3::new(-6.0, 1.5, 2.5), Vec3::new(0.25, 1.5, 17.0)),
        ("EastWall".to_string(), Vec3::new(21.0, 1.5, 2.5), Vec3::new(0.25, 1.5, 17.0)),
    ];
    for (i, table) in TABLE_POSITIONS.iter().enumerate() {
        let base = Vec3::from_array(*table);
        colliders.push((
            format!("Table{}", i),
            base + Vec3::Y * (TABLE_SIZE.y / 2.0),
            TABLE_SIZE / 2.0,
        ));
    }
    colliders
}

pub fn spawn_building(commands: &mut Commands) {
    for (name, center, half_extents) in building_colliders() {
        commands.spawn((
            Transform::from_translation(center),
            Obstacle { name, half_extents },
        ));
    }
}

/// Replace every prop with the given placements
pub fn place_objects(
    commands: &mut Commands,
    existing: impl IntoIterator<Item = Entity>,
    placements: &[ObjectPlacement],
) {
    for entity in existing {
        commands.entity(entity).despawn();
    }
    for placement in placements {
        commands.spawn((
            Transform::from_translation(placement.translation())
                .with_rotation(placement.orientation())
                .with_scale(Vec3::splat(placement.scale)),
            SceneObject {
                id: placement.id.clone(),
                velocity: Vec3::ZERO,
                linear_damping: placement.physics.linear_damping,
            },
        ));
    }
    debug!("Placed {} objects", placements.len());
}

/// Height of the surface under `position`: a table top or the floor
pub fn rest_height(position: Vec3) -> f32 {
    let half = TABLE_SIZE / 2.0;
    TABLE_POSITIONS
        .iter()
        .map(|t| Vec3::from_array(*t))
        .filter(|t| (position.x - t.x).abs() <= half.x && (position.z - t.z).abs() <= half.z)
        .map(|t| t.y + TABLE_SIZE.y)
        .filter(|top| *top <= position.y + 1e-3)
        .fold(0.0, f32::max)
}

/// One step of the damped drop
pub fn step_object(transform: &mut Transform, object: &mut SceneObject, dt: f32) {
    let floor = rest_height(transform.translation);
    if transform.translation.y <= floor && object.velocity == Vec3::ZERO {
        return;
    }
    object.velocity.y -= GRAVITY * dt;
    object.velocity *= (1.0 - object.linear_damping * dt).max(0.0);
    transform.translation += object.velocity * dt;
    if transform.translation.y <= floor {
        transform.translation.y = floor;
        object.velocity = Vec3::ZERO;
    }
}

pub fn step_objects(clock: Res<SimClock>, mut objects: Query<(&mut Transform, &mut SceneObject)>) {
    for (mut transform, mut object) in &mut objects {
        step_object(&mut transform, &mut object, clock.dt);
    }
}

fn overlaps(point: Vec3, radius: f32, center: Vec3, half_extents: Vec3) -> bool {
    let closest = point.clamp(center - half_extents, center + half_extents);
    closest.distance_squared(point) <= radius * radius
}

/// Report every collider the agent touches this tick
pub fn detect_contacts(
    agents: Query<&Transform, With<AgentBody>>,
    obstacles: Query<(&Transform, &Obstacle)>,
    mut queue: ResMut<SimEventQueue>,
) {
    for agent in &agents {
        for (transform, obstacle) in &obstacles {
            if overlaps(
                agent.translation,
                AGENT_RADIUS,
                transform.translation,
                obstacle.half_extents,
            ) {
                queue.emit(SimEvent::Contact {
                    collider: obstacle.name.clone(),
                });
            }
        }
    }
}

/// Objects inside the view cone, most central first
pub fn objects_in_view(agent: &Transform, objects: &[(String, Vec3)]) -> Vec<ObjectInView> {
    let forward = (agent.rotation * Vec3::NEG_Z).with_y(0.0).normalize_or_zero();
    let mut visible: Vec<ObjectInView> = objects
        .iter()
        .filter_map(|(id, position)| {
            let offset = (*position - agent.translation).with_y(0.0);
            let distance = offset.length();
            if distance <= f32::EPSILON || distance > VIEW_DISTANCE {
                return None;
            }
            let angle = forward.angle_between(offset);
            if !angle.is_finite() || angle > VIEW_HALF_ANGLE {
                return None;
            }
            Some(ObjectInView {
                id: id.clone(),
                distance,
                centrality: 1.0 - angle / VIEW_HALF_ANGLE,
            })
        })
        .collect();
    visible.sort_by(|a, b| b.centrality.total_cmp(&a.centrality));
    visible
}
