//! Per-tick systems connecting the session to the headless scene

use bevy::prelude::*;

use crate::events::{Command, SimEvent, SimEventQueue};
use crate::input::{ActionInput, ControlAuthority};
use crate::playback::SceneEffect;
use crate::session::{Session, SessionOutput, TickInputs};
use crate::settings::SimSettings;

use super::SimClock;
use super::agent::{AgentBody, spawn_pose};
use super::io::{PendingIo, StoreHandle, TransportHandle, send_message};
use super::scene::{SceneObject, objects_in_view, place_objects, spawn_building};

/// Spawn the building and the robot, and ask for the episode list
pub fn setup_scene(
    mut commands: Commands,
    settings: Res<SimSettings>,
    mut queue: ResMut<SimEventQueue>,
) {
    spawn_building(&mut commands);
    commands.spawn((
        spawn_pose(Vec3::from_array(settings.spawn_position), settings.spawn_yaw),
        AgentBody::default(),
    ));
    queue.command(Command::RefreshEpisodeList);
    info!("Scene ready, agent at {:?}", settings.spawn_position);
}

pub fn advance_clock(mut clock: ResMut<SimClock>, mut queue: ResMut<SimEventQueue>) {
    clock.advance();
    queue.update_time(clock.now_ms());
}

/// Apply everything queued since the last tick, in emission order
pub fn process_events(mut session: ResMut<Session>, mut queue: ResMut<SimEventQueue>) {
    for queued in queue.drain() {
        debug!("Event {} at {}ms", queued.event.label(), queued.time_ms);
        session.handle_event(queued.event, queued.time_ms);
    }
}

/// Sample, record, evaluate auto-stop and telemetry for this tick
pub fn tick_session(
    clock: Res<SimClock>,
    mut session: ResMut<Session>,
    input: Res<ActionInput>,
    mut authority: ResMut<ControlAuthority>,
    agents: Query<&Transform, With<AgentBody>>,
    objects: Query<(&Transform, &SceneObject)>,
) {
    let object_positions: Vec<(String, Vec3)> = objects
        .iter()
        .map(|(t, o)| (o.id.clone(), t.translation))
        .collect();
    let agent = agents.single().ok();

    let inputs = TickInputs {
        position: agent.map(|t| t.translation),
        rotation: agent.map(|t| t.rotation),
        actions: input.effective(*authority),
        objects_in_view: agent
            .map(|a| objects_in_view(a, &object_positions))
            .unwrap_or_default(),
        object_positions,
    };
    session.tick(&inputs, clock.now_ms(), clock.dt);
    authority.set_if_neq(session.control_authority());
}

/// Carry out scene effects and hand I/O requests to the task pool
#[allow(clippy::too_many_arguments)]
pub fn apply_session_outputs(
    mut commands: Commands,
    mut session: ResMut<Session>,
    settings: Res<SimSettings>,
    store: Res<StoreHandle>,
    mut pending: ResMut<PendingIo>,
    mut transport: ResMut<TransportHandle>,
    mut queue: ResMut<SimEventQueue>,
    mut input: ResMut<ActionInput>,
    mut agents: Query<(&mut Transform, &mut AgentBody)>,
    objects: Query<Entity, With<SceneObject>>,
) {
    for output in session.drain_outputs() {
        match output {
            SessionOutput::Effect(effect) => match effect {
                SceneEffect::PlaceObjects(placements) => {
                    place_objects(&mut commands, objects.iter(), &placements);
                }
                SceneEffect::ResetScene => {
                    let spawn =
                        spawn_pose(Vec3::from_array(settings.spawn_position), settings.spawn_yaw);
                    for (mut transform, mut body) in &mut agents {
                        *transform = spawn;
                        body.stop();
                    }
                    input.clear();
                    queue.emit(SimEvent::SceneResetDone);
                }
                SceneEffect::OverridePose { position, rotation } => {
                    for (mut transform, mut body) in &mut agents {
                        transform.translation = position;
                        transform.rotation = rotation;
                        body.stop();
                    }
                }
                SceneEffect::SetSyntheticActions(actions) => input.set_synthetic(actions),
                SceneEffect::ClearSyntheticActions => input.clear_synthetic(),
            },
            SessionOutput::Save(request) => pending.save(store.0.clone(), request),
            SessionOutput::Load { key, mode } => pending.load(store.0.clone(), key, mode),
            SessionOutput::Send(message) => send_message(&mut transport, &mut queue, &message),
            SessionOutput::ListEpisodes => pending.list(store.0.clone()),
        }
    }
}

/// Log recorder and player status whenever it changes
pub fn log_status(session: Res<Session>, mut last: Local<String>) {
    let status = format!("{} | {}", session.recorder.status(), session.player.status());
    if *last != status {
        info!("{}", session.status_line());
        *last = status;
    }
}
