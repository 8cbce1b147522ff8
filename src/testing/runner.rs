//! Scenario execution engine

use bevy::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::episode::{Episode, Frame, StopReason};
use crate::randomizer::ObjectRandomizer;
use crate::session::Session;
use crate::settings::SimSettings;
use crate::simulation::agent::{AgentBody, integrate, spawn_pose, velocities_for};
use crate::simulation::io::flush_io;
use crate::simulation::scene::SceneObject;
use crate::simulation::systems::advance_clock;
use crate::simulation::{HeadlessAppBuilder, SimSet};
use crate::store::{EpisodeStore, MemoryEpisodeStore};

use super::assertions::{AssertionError, CapturedEvent, WorldState, check_sequence, check_state};
use super::input::{ScriptedInputs, inject_script};
use super::parser::{SeedEpisode, TestDefinition};

/// Result of running a scenario
#[derive(Debug)]
pub enum TestResult {
    Pass { frames: u64 },
    Fail { error: AssertionError },
    Error { message: String },
}

/// Frames run when a scenario names none
const DEFAULT_FRAMES: u64 = 60;

/// Settings every scenario starts from
fn scenario_settings(test: &TestDefinition) -> SimSettings {
    let mut settings = SimSettings {
        episode_store: "memory".to_string(),
        placement_seed: test.setup.seed,
        ..default()
    };
    if let Some(limit) = test.setup.time_limit {
        settings.time_limit_secs = limit;
    }
    if let Some(target) = &test.setup.target {
        settings.target_object = target.clone();
    }
    settings
}

/// Build an episode of the agent holding `seed.actions` from the spawn pose
pub fn seed_episode(seed: &SeedEpisode, settings: &SimSettings) -> Episode {
    let actions: BTreeSet<String> = seed.actions.iter().cloned().collect();
    let dt = settings.tick_dt();
    let mut transform = spawn_pose(Vec3::from_array(settings.spawn_position), settings.spawn_yaw);
    let mut body = AgentBody::default();

    let frames = (0..seed.frames)
        .map(|i| {
            let frame = Frame {
                position: transform.translation.to_array(),
                rotation: transform.rotation.to_array(),
                active_actions: actions.clone(),
                target_object: settings.target_object.clone(),
                time_remaining: (settings.time_limit_secs - i as f32 * dt).max(0.0),
                frame_number: i,
                ..default()
            };
            let (linear, angular) = velocities_for(&actions, transform.rotation);
            body.linear_velocity = linear;
            body.angular_velocity = angular;
            integrate(&mut transform, &body, dt);
            frame
        })
        .collect();

    let placements = ObjectRandomizer::new(settings.placement_seed).generate();
    Episode::new(seed.key.clone(), frames, placements, Some(StopReason::Manual))
}

/// Run a single scenario and return the result
pub fn run_test(test: &TestDefinition) -> TestResult {
    let mut script = match ScriptedInputs::from_inputs(&test.input) {
        Ok(script) => script,
        Err(message) => return TestResult::Error { message },
    };
    for state in &test.expect.state {
        script.set_max_frame(state.after_frame);
    }
    if let Some(frames) = test.setup.frames {
        script.set_max_frame(frames);
    }
    if script.max_frame == 0 {
        script.max_frame = DEFAULT_FRAMES;
    }

    let settings = scenario_settings(test);
    let store = Arc::new(MemoryEpisodeStore::default());
    for seed in &test.setup.episodes {
        if let Err(e) = store.save(&seed.key, &seed_episode(seed, &settings)) {
            return TestResult::Error {
                message: format!("Failed to seed episode '{}': {}", seed.key, e),
            };
        }
    }

    let mut app = HeadlessAppBuilder::new()
        .with_settings(settings)
        .with_store(store.clone())
        .with_minimal_threads()
        .build();
    app.insert_resource(script);
    app.add_systems(
        Update,
        inject_script.in_set(SimSet::Input).after(advance_clock),
    );

    let mut captured = Vec::new();
    let mut last_recorder = "idle".to_string();
    let mut last_player = "idle".to_string();
    let mut world_state = WorldState::default();

    loop {
        let frame = {
            let script = app.world().resource::<ScriptedInputs>();
            if !script.should_continue() {
                break;
            }
            script.current_frame
        };

        app.update();
        // I/O results land on the next tick, independent of thread timing
        flush_io(app.world_mut());

        world_state = extract_world_state(app.world_mut(), store.as_ref());
        if world_state.recorder_state != last_recorder {
            last_recorder = world_state.recorder_state.clone();
            captured.push(CapturedEvent {
                frame,
                event_type: format!("recorder_{}", last_recorder),
            });
        }
        if world_state.player_state != last_player {
            last_player = world_state.player_state.clone();
            captured.push(CapturedEvent {
                frame,
                event_type: format!("player_{}", last_player),
            });
        }

        for assertion in test.expect.state.iter().filter(|a| a.after_frame == frame) {
            if let Err(error) = check_state(assertion, &world_state) {
                return TestResult::Fail { error };
            }
        }
    }

    let final_frame = app.world().resource::<ScriptedInputs>().current_frame;

    if let Err(error) = check_sequence(&test.expect.sequence, &captured) {
        return TestResult::Fail { error };
    }
    if let Err(error) = check_outcome(test, &world_state, store.as_ref()) {
        return TestResult::Fail { error };
    }

    TestResult::Pass {
        frames: final_frame,
    }
}

fn check_outcome(
    test: &TestDefinition,
    state: &WorldState,
    store: &dyn EpisodeStore,
) -> Result<(), AssertionError> {
    let expect = &test.expect;
    if let Some(reason) = &expect.stop_reason {
        let actual = state.stop_reason.as_deref().unwrap_or("none");
        if StopReason::from_str(reason).map(|r| r.as_str()) != Some(actual) {
            return Err(AssertionError {
                message: "Stop reason mismatch".to_string(),
                expected: reason.clone(),
                actual: actual.to_string(),
            });
        }
    }
    if let Some(min) = expect.frames_min
        && state.recorded_frames < min
    {
        return Err(AssertionError {
            message: "Too few recorded frames".to_string(),
            expected: format!(">= {}", min),
            actual: state.recorded_frames.to_string(),
        });
    }
    if let Some(max) = expect.frames_max
        && state.recorded_frames > max
    {
        return Err(AssertionError {
            message: "Too many recorded frames".to_string(),
            expected: format!("<= {}", max),
            actual: state.recorded_frames.to_string(),
        });
    }
    if !expect.saved.is_empty() {
        let keys = store.list().map_err(|e| AssertionError {
            message: "Failed to list the store".to_string(),
            expected: "episode list".to_string(),
            actual: e.to_string(),
        })?;
        for prefix in &expect.saved {
            if !keys.iter().any(|k| k.starts_with(prefix.as_str())) {
                return Err(AssertionError {
                    message: format!("No saved episode starting with '{}'", prefix),
                    expected: prefix.clone(),
                    actual: format!("{:?}", keys),
                });
            }
        }
    }
    Ok(())
}

fn extract_world_state(world: &mut World, store: &dyn EpisodeStore) -> WorldState {
    let (agent, agent_yaw) = {
        let mut query = world.query_filtered::<&Transform, With<AgentBody>>();
        match query.single(world) {
            Ok(t) => (
                t.translation.to_array(),
                t.rotation.to_euler(EulerRot::YXZ).0,
            ),
            Err(_) => ([0.0; 3], 0.0),
        }
    };
    let objects = world.query::<&SceneObject>().iter(world).count();
    let session = world.resource::<Session>();

    WorldState {
        agent,
        agent_yaw,
        recorder_state: session.recorder.state().as_str().to_string(),
        recorded_frames: session.recorder.frames().len(),
        stop_reason: session.recorder.stop_reason().map(|r| r.as_str().to_string()),
        player_state: session.player.state().as_str().to_string(),
        player_frame: session.player.progress().0,
        objects,
        episodes: store.list().map(|keys| keys.len()).unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario(toml: &str) -> TestDefinition {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn test_trigger_scenario_passes() {
        let test = scenario(
            r#"
name = "trigger"
[setup]
seed = 3

[[input]]
frame = 1
commands = ["start"]

[[input]]
frame = 30
hold = ["v"]

[expect]
stop_reason = "trigger_action"
frames_min = 28
frames_max = 33

[[expect.sequence]]
event = "recorder_recording"
frame_max = 2

[[expect.sequence]]
event = "recorder_stopped"
frame_min = 29
frame_max = 31
"#,
        );
        let result = run_test(&test);
        assert!(matches!(result, TestResult::Pass { .. }), "{:?}", result);
    }

    #[test]
    fn test_failed_check_is_reported() {
        let test = scenario(
            r#"
name = "wrong"
[setup]
seed = 3
[[expect.state]]
after_frame = 5
checks = ["recorder.state = recording"]
"#,
        );
        match run_test(&test) {
            TestResult::Fail { error } => assert_eq!(error.actual, "idle"),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_command_is_an_error() {
        let test = scenario(
            r#"
name = "bad"
[[input]]
frame = 1
commands = ["teleport"]
"#,
        );
        assert!(matches!(run_test(&test), TestResult::Error { .. }));
    }

    #[test]
    fn test_seed_episode_drives_forward() {
        let settings = SimSettings::default();
        let seed = SeedEpisode {
            key: "hall.json".into(),
            frames: 61,
            actions: vec!["w".into()],
        };
        let episode = seed_episode(&seed, &settings);
        assert!(episode.validate().is_ok());
        let last = episode.frames.last().unwrap();
        // One second at full throttle, facing +X
        assert!((last.position[0] - settings.spawn_position[0] - 4.0).abs() < 0.01);
        assert_eq!(episode.object_placements.len(), 11);
    }
}
