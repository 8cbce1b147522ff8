//! Kinematic agent - headless stand-in for the robot's rigid body
//!
//! Forward is local -Z. `w`/`s` drive along it, `a`/`d` turn about +Y.
//! There is no inertia: velocity is recomputed from the action set each tick.

use bevy::prelude::*;
use std::collections::BTreeSet;

use crate::constants::{
    ACTION_BACK, ACTION_FORWARD, ACTION_LEFT, ACTION_RIGHT, AGENT_MOVE_SPEED, AGENT_TURN_SPEED,
};
use crate::input::{ActionInput, ControlAuthority};

use super::SimClock;

/// Collision radius of the robot
pub const AGENT_RADIUS: f32 = 0.3;

#[derive(Component, Debug, Clone, Default)]
pub struct AgentBody {
    pub linear_velocity: Vec3,
    pub angular_velocity: f32,
}

impl AgentBody {
    pub fn stop(&mut self) {
        self.linear_velocity = Vec3::ZERO;
        self.angular_velocity = 0.0;
    }
}

/// Velocities the action set asks for, given the current orientation
pub fn velocities_for(actions: &BTreeSet<String>, rotation: Quat) -> (Vec3, f32) {
    let mut drive = 0.0;
    if actions.contains(ACTION_FORWARD) {
        drive += 1.0;
    }
    if actions.contains(ACTION_BACK) {
        drive -= 1.0;
    }
    let mut turn = 0.0;
    if actions.contains(ACTION_LEFT) {
        turn += 1.0;
    }
    if actions.contains(ACTION_RIGHT) {
        turn -= 1.0;
    }
    let forward = rotation * Vec3::NEG_Z;
    (
        forward * drive * AGENT_MOVE_SPEED,
        turn * AGENT_TURN_SPEED,
    )
}

/// Advance a transform by one step
pub fn integrate(transform: &mut Transform, body: &AgentBody, dt: f32) {
    transform.translation += body.linear_velocity * dt;
    transform.rotate_y(body.angular_velocity * dt);
}

pub fn spawn_pose(position: Vec3, yaw: f32) -> Transform {
    Transform::from_translation(position).with_rotation(Quat::from_rotation_y(yaw))
}

/// Drive the agent from the effective action set. Under playback the pose
/// comes only from overrides, so the body is held still between them.
pub fn drive_agent(
    clock: Res<SimClock>,
    input: Res<ActionInput>,
    authority: Res<ControlAuthority>,
    mut agents: Query<(&mut Transform, &mut AgentBody)>,
) {
    if *authority == ControlAuthority::Playback {
        for (_, mut body) in &mut agents {
            body.stop();
        }
        return;
    }
    let actions = input.effective(*authority);
    for (mut transform, mut body) in &mut agents {
        let (linear, angular) = velocities_for(&actions, transform.rotation);
        body.linear_velocity = linear;
        body.angular_velocity = angular;
        integrate(&mut transform, &body, clock.dt);
    }
}
