//! Session - single owner of recorder, player and their collaborators
//!
//! Everything that used to be a loose flag (recording active, replay active,
//! who controls the agent) is a field here. Events are applied through
//! [`Session::handle_event`]; once per tick [`Session::tick`] runs the
//! pipeline:
//!
//! 1. release the collision latch after its cooldown
//! 2. advance the player (settlement polling, stepping)
//! 3. count the episode timer down
//! 4. sample a frame and append it while recording
//! 5. check auto-stop; on a match append one final frame and stop
//! 6. hand the frame to the telemetry throttle
//!
//! I/O never happens here. Requests are queued as [`SessionOutput`]s and the
//! results come back later as events.

use bevy::prelude::*;
use std::collections::BTreeSet;

use crate::collision::CollisionMonitor;
use crate::countdown::EpisodeTimer;
use crate::episode::{Frame, ObjectInView, ObjectPlacement, StopReason};
use crate::events::{Command, SimEvent};
use crate::input::ControlAuthority;
use crate::playback::{Player, PlayerOutput, SceneEffect, SourceMode};
use crate::randomizer::ObjectRandomizer;
use crate::recorder::{AutoStopEvaluator, Recorder, RecorderState, SaveRequest};
use crate::sampler::{SampleInputs, StateSampler};
use crate::settings::SimSettings;
use crate::transport::{InboundMessage, OutboundMessage, ReplayStep, TelemetryThrottle};

/// Work the session wants done outside the tick
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutput {
    Effect(SceneEffect),
    Save(SaveRequest),
    Load { key: String, mode: SourceMode },
    Send(OutboundMessage),
    ListEpisodes,
}

/// Readings from the scene for one tick
#[derive(Debug, Clone, Default)]
pub struct TickInputs {
    pub position: Option<Vec3>,
    pub rotation: Option<Quat>,
    /// Effective action set (manual or synthetic)
    pub actions: BTreeSet<String>,
    pub objects_in_view: Vec<ObjectInView>,
    /// Current positions of tracked objects, for settlement
    pub object_positions: Vec<(String, Vec3)>,
}

#[derive(Resource)]
pub struct Session {
    pub sampler: StateSampler,
    pub recorder: Recorder,
    pub autostop: AutoStopEvaluator,
    pub player: Player,
    pub telemetry: TelemetryThrottle,
    pub timer: EpisodeTimer,
    pub collision: CollisionMonitor,
    randomizer: ObjectRandomizer,
    placements: Vec<ObjectPlacement>,
    configured_target: String,
    target_object: String,
    episodes: Vec<String>,
    last_frame: Option<Frame>,
    outbox: Vec<SessionOutput>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(&SimSettings::default())
    }
}

impl Session {
    pub fn new(settings: &SimSettings) -> Self {
        Self {
            sampler: StateSampler::default(),
            recorder: Recorder::default(),
            autostop: AutoStopEvaluator::new(settings.autostop_config()),
            player: Player::new(settings.player_config()),
            telemetry: TelemetryThrottle::new(settings.telemetry_config()),
            timer: EpisodeTimer::new(settings.time_limit_secs),
            collision: settings.collision_monitor(),
            randomizer: ObjectRandomizer::new(settings.placement_seed),
            placements: Vec::new(),
            configured_target: settings.target_object.clone(),
            target_object: settings.target_object.clone(),
            episodes: Vec::new(),
            last_frame: None,
            outbox: Vec::new(),
        }
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn control_authority(&self) -> ControlAuthority {
        if self.player.owns_pose() {
            ControlAuthority::Playback
        } else {
            ControlAuthority::Manual
        }
    }

    pub fn placements(&self) -> &[ObjectPlacement] {
        &self.placements
    }

    pub fn target_object(&self) -> &str {
        &self.target_object
    }

    /// Most recent episode listing from the store
    pub fn episodes(&self) -> &[String] {
        &self.episodes
    }

    pub fn last_frame(&self) -> Option<&Frame> {
        self.last_frame.as_ref()
    }

    /// One-line summary for logs and the HUD
    pub fn status_line(&self) -> String {
        format!(
            "recorder: {} ({} frames) | player: {} | time {}s",
            self.recorder.status(),
            self.recorder.frames().len(),
            self.player.status(),
            self.timer.display_seconds()
        )
    }

    pub fn drain_outputs(&mut self) -> Vec<SessionOutput> {
        std::mem::take(&mut self.outbox)
    }

    // ---------------------------------------------------------------------
    // Events
    // ---------------------------------------------------------------------

    pub fn handle_event(&mut self, event: SimEvent, now_ms: u64) {
        match event {
            SimEvent::Command(command) => self.handle_command(command),
            SimEvent::Contact { collider } => {
                self.collision.on_contact(&collider, now_ms);
            }
            SimEvent::SceneResetDone => self.player.on_reset_acknowledged(),
            SimEvent::SaveCompleted { key, result } => {
                let saved = result.is_ok();
                self.recorder.on_save_result(&key, result);
                if saved {
                    self.outbox.push(SessionOutput::ListEpisodes);
                }
            }
            SimEvent::EpisodeLoaded { key, result } => {
                if self.player.episode() == Some(key.as_str()) {
                    self.player.on_loaded(result);
                } else {
                    debug!("Dropping stale load result for {}", key);
                }
            }
            SimEvent::EpisodeList(result) => match result {
                Ok(episodes) => {
                    info!("{} episodes available", episodes.len());
                    self.episodes = episodes;
                }
                Err(e) => warn!("Failed to list episodes: {}", e),
            },
            SimEvent::VisionResult(result) => match result {
                Ok(detections) => self.sampler.merge_detections(detections),
                Err(e) => debug!("Vision request failed: {}", e),
            },
            SimEvent::Inbound(message) => self.handle_inbound(message),
            SimEvent::TransportLost(cause) => {
                warn!("Transport lost: {}", cause);
                self.player.on_transport_lost(&cause);
            }
        }
        self.forward_player_outputs();
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::StartRecording => self.start_recording(),
            Command::StopRecording => {
                if self.recorder.stop(StopReason::Manual) {
                    self.timer.stop();
                }
            }
            Command::SaveRecording { name } => match self.recorder.save(&name) {
                Ok(request) => {
                    self.timer.stop();
                    self.outbox.push(SessionOutput::Save(request));
                }
                Err(e) => warn!("{}", e),
            },
            Command::AbandonRecording => {
                if let Err(e) = self.recorder.abandon() {
                    warn!("{}", e);
                }
            }
            Command::SelectEpisode { key, mode } => self.select_episode(&key, mode),
            Command::Play => {
                if let Err(e) = self.player.play() {
                    warn!("{}", e);
                }
            }
            Command::CancelPlayback => {
                self.player.cancel();
            }
            Command::AcknowledgePlayback => {
                if let Err(e) = self.player.acknowledge() {
                    warn!("{}", e);
                }
            }
            Command::TogglePause => self.player.controls.toggle_pause(),
            Command::StepForward => self.player.controls.step_forward(),
            Command::SpeedUp => self.player.controls.speed_up(),
            Command::SpeedDown => self.player.controls.speed_down(),
            Command::ResetScene => {
                let randomize = !self.player.owns_pose();
                self.reset_scene(randomize);
            }
            Command::RefreshEpisodeList => self.outbox.push(SessionOutput::ListEpisodes),
        }
    }

    fn handle_inbound(&mut self, message: InboundMessage) {
        match message {
            InboundMessage::ReplayStep(step) => self.player.on_live_step(step),
            InboundMessage::ReplayFrame(frame) => {
                self.player.on_live_step(ReplayStep::from_frame(&frame, None));
            }
            InboundMessage::ReplayComplete => self.player.on_live_complete(),
            InboundMessage::ReplayStatus { status, message } => {
                info!("Replay status: {} {}", status, message);
            }
            InboundMessage::Other(event) => debug!("Ignoring inbound event {}", event),
        }
    }

    /// Scene reset, then Idle -> Recording. Refused while playback drives
    /// the agent.
    pub fn start_recording(&mut self) {
        if self.player.owns_pose() {
            warn!("Cannot start recording while playback is {}", self.player.state());
            return;
        }
        match self.recorder.state() {
            RecorderState::Recording => {
                warn!("Recording already active, ignoring start");
                return;
            }
            RecorderState::Stopped => {
                warn!("Save or abandon the stopped episode before recording again");
                return;
            }
            RecorderState::Idle => {}
        }

        self.reset_scene(true);
        if let Err(e) = self.recorder.start(self.placements.clone()) {
            warn!("{}", e);
            return;
        }
        self.autostop.begin_session();
        self.timer.start();
    }

    fn select_episode(&mut self, key: &str, mode: SourceMode) {
        let unsaved = self.recorder.state() == RecorderState::Stopped
            && !self.recorder.save_in_flight();
        if self.recorder.is_recording() || unsaved {
            warn!(
                "Cannot load {} while the recorder is {}",
                key,
                self.recorder.status()
            );
            return;
        }
        if let Err(e) = self.player.select(key, mode) {
            warn!("{}", e);
        }
    }

    /// Return agent, input and per-session state to the start. A fresh
    /// object layout is generated when `randomize` is set.
    pub fn reset_scene(&mut self, randomize: bool) {
        info!("Scene reset{}", if randomize { " (new layout)" } else { "" });
        self.sampler.reset();
        self.collision.reset();
        self.telemetry.reset();
        self.timer.reset();
        self.recorder.on_scene_reset();
        if self.recorder.is_recording() {
            self.autostop.begin_session();
        }
        self.last_frame = None;

        if randomize {
            self.placements = self.randomizer.generate();
            self.target_object = if self
                .placements
                .iter()
                .any(|p| p.id == self.configured_target)
            {
                self.configured_target.clone()
            } else {
                self.randomizer
                    .choose_target(&self.placements)
                    .unwrap_or_default()
            };
            self.outbox.push(SessionOutput::Effect(SceneEffect::PlaceObjects(
                self.placements.clone(),
            )));
        }
        self.outbox.push(SessionOutput::Effect(SceneEffect::ResetScene));
    }

    fn forward_player_outputs(&mut self) {
        for output in self.player.drain_outputs() {
            match output {
                PlayerOutput::Effect(SceneEffect::ResetScene) => self.reset_scene(false),
                PlayerOutput::Effect(SceneEffect::PlaceObjects(placements)) => {
                    self.placements = placements.clone();
                    self.outbox
                        .push(SessionOutput::Effect(SceneEffect::PlaceObjects(placements)));
                }
                PlayerOutput::Effect(effect) => self.outbox.push(SessionOutput::Effect(effect)),
                PlayerOutput::Load { key, mode } => {
                    self.outbox.push(SessionOutput::Load { key, mode })
                }
                PlayerOutput::Send(message) => self.outbox.push(SessionOutput::Send(message)),
            }
        }
    }

    // ---------------------------------------------------------------------
    // Tick
    // ---------------------------------------------------------------------

    pub fn tick(&mut self, inputs: &TickInputs, now_ms: u64, dt: f32) {
        self.collision.update(now_ms);

        self.player.tick_positioning(&inputs.object_positions);
        self.player.tick_playing();
        self.forward_player_outputs();

        self.timer.tick(dt);

        let sample_inputs = SampleInputs {
            position: inputs.position,
            rotation: inputs.rotation,
            active_actions: inputs.actions.clone(),
            collision: self.collision.is_colliding(),
            objects_in_view: inputs.objects_in_view.clone(),
            target_object: self.target_object.clone(),
            time_remaining: self.timer.remaining,
        };
        let mut frame = self.sampler.sample(&sample_inputs);

        if self.recorder.is_recording() {
            self.recorder.sample(frame.clone());
            if let Some(reason) = self.autostop.evaluate(&frame, now_ms) {
                let trigger = self.autostop.config.trigger_symbol.clone();
                frame = self.sampler.sample_final(&sample_inputs, reason, &trigger);
                self.recorder.sample(frame.clone());
                self.recorder.stop(reason);
                self.timer.stop();
            }
        }

        let decision = self.telemetry.evaluate(&frame);
        if decision.collision_onset {
            self.outbox
                .push(SessionOutput::Send(OutboundMessage::CollisionEvent {
                    frame: frame.clone(),
                    timestamp_ms: now_ms,
                }));
        }
        if decision.push_state {
            self.outbox
                .push(SessionOutput::Send(OutboundMessage::State(frame.clone())));
        }
        self.last_frame = Some(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ACTION_FORWARD;
    use crate::playback::{LoadedEpisode, PlaybackState};

    const DT: f32 = 1.0 / 60.0;

    fn settings() -> SimSettings {
        SimSettings {
            placement_seed: Some(11),
            ..default()
        }
    }

    fn inputs(actions: &[&str]) -> TickInputs {
        TickInputs {
            position: Some(Vec3::new(7.0, 0.1, 15.0)),
            rotation: Some(Quat::IDENTITY),
            actions: actions.iter().map(|s| s.to_string()).collect(),
            ..default()
        }
    }

    /// Run ticks, returning the simulated time afterwards
    fn run(session: &mut Session, start_ms: u64, ticks: u64, actions: &[&str]) -> u64 {
        let mut now = start_ms;
        for _ in 0..ticks {
            now += 16;
            session.tick(&inputs(actions), now, DT);
        }
        now
    }

    fn save_request(session: &mut Session, name: &str) -> SaveRequest {
        session.handle_event(
            SimEvent::Command(Command::SaveRecording { name: name.into() }),
            0,
        );
        session
            .drain_outputs()
            .into_iter()
            .find_map(|o| match o {
                SessionOutput::Save(request) => Some(request),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_forward_then_idle_hundred_frames() {
        let mut session = Session::new(&settings());
        session.handle_event(SimEvent::Command(Command::StartRecording), 0);
        let now = run(&mut session, 0, 50, &[ACTION_FORWARD]);
        run(&mut session, now, 50, &[]);

        let request = save_request(&mut session, "drive");
        let frames = &request.episode.frames;
        assert_eq!(frames.len(), 100);
        assert!(request.key.starts_with("drive_"));
        assert_eq!(request.episode.termination_reason, Some(StopReason::Manual));

        let forward: BTreeSet<String> = [ACTION_FORWARD.to_string()].into_iter().collect();
        assert_eq!(frames[49].active_actions, forward);
        assert!(frames[50].active_actions.is_empty());
        assert_eq!(frames[49].key_durations[ACTION_FORWARD], 50);
        assert_eq!(frames[50].key_durations[ACTION_FORWARD], 0);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.frame_number, i as u64);
        }
        assert!(!request.episode.object_placements.is_empty());
    }

    #[test]
    fn test_collision_stops_once_with_collision_frame() {
        let mut session = Session::new(&settings());
        session.handle_event(SimEvent::Command(Command::StartRecording), 0);
        let now = run(&mut session, 0, 10, &[ACTION_FORWARD]);

        session.handle_event(
            SimEvent::Contact {
                collider: "Wall".into(),
            },
            now,
        );
        let now = run(&mut session, now, 1, &[ACTION_FORWARD]);
        assert_eq!(session.recorder.stop_reason(), Some(StopReason::Collision));
        assert_eq!(session.recorder.frames().len(), 12);
        assert!(session.recorder.frames().last().unwrap().collision);

        // Further contacts and ticks change nothing
        session.handle_event(
            SimEvent::Contact {
                collider: "Chair".into(),
            },
            now + 5000,
        );
        run(&mut session, now + 5000, 10, &[]);
        assert_eq!(session.recorder.frames().len(), 12);
        assert_eq!(session.recorder.stop_reason(), Some(StopReason::Collision));
    }

    #[test]
    fn test_floor_contact_does_not_stop() {
        let mut session = Session::new(&settings());
        session.handle_event(SimEvent::Command(Command::StartRecording), 0);
        session.handle_event(
            SimEvent::Contact {
                collider: "RoomFloor".into(),
            },
            0,
        );
        run(&mut session, 0, 5, &[]);
        assert!(session.recorder.is_recording());
    }

    #[test]
    fn test_trigger_action_stops_with_trigger_in_last_frame() {
        let mut session = Session::new(&settings());
        session.handle_event(SimEvent::Command(Command::StartRecording), 0);
        let now = run(&mut session, 0, 3, &[]);
        run(&mut session, now, 1, &["v"]);
        assert_eq!(
            session.recorder.stop_reason(),
            Some(StopReason::TriggerAction)
        );
        assert!(session.recorder.frames().last().unwrap().has_action("v"));
    }

    #[test]
    fn test_timer_expiry_stops_once() {
        let mut session = Session::new(&SimSettings {
            time_limit_secs: 0.04,
            ..settings()
        });
        session.handle_event(SimEvent::Command(Command::StartRecording), 0);
        run(&mut session, 0, 10, &[]);
        assert_eq!(session.recorder.stop_reason(), Some(StopReason::TimeExpired));
        // 0.04s at 60 Hz crosses zero on the third tick, plus the final frame
        assert_eq!(session.recorder.frames().len(), 4);
        assert!(session.recorder.frames().last().unwrap().time_remaining <= 0.0);
    }

    #[test]
    fn test_save_failure_keeps_frames_and_success_clears() {
        let mut session = Session::new(&settings());
        session.handle_event(SimEvent::Command(Command::StartRecording), 0);
        run(&mut session, 0, 5, &[]);
        let request = save_request(&mut session, "keep");

        session.handle_event(
            SimEvent::SaveCompleted {
                key: request.key.clone(),
                result: Err(crate::error::TransportError::Status(500)),
            },
            0,
        );
        assert_eq!(session.recorder.state(), RecorderState::Stopped);
        assert_eq!(session.recorder.frames().len(), 5);

        let retry = save_request(&mut session, "keep");
        session.handle_event(
            SimEvent::SaveCompleted {
                key: retry.key,
                result: Ok(()),
            },
            0,
        );
        assert_eq!(session.recorder.state(), RecorderState::Idle);
        assert!(session.drain_outputs().contains(&SessionOutput::ListEpisodes));
    }

    #[test]
    fn test_reset_during_recording_restarts_buffer() {
        let mut session = Session::new(&settings());
        session.handle_event(SimEvent::Command(Command::StartRecording), 0);
        run(&mut session, 0, 5, &[]);
        session.handle_event(SimEvent::Command(Command::ResetScene), 100);
        assert!(session.recorder.is_recording());
        assert!(session.recorder.frames().is_empty());
        assert_eq!(session.sampler.frame_number(), 0);
    }

    #[test]
    fn test_start_recording_emits_layout_and_reset() {
        let mut session = Session::new(&settings());
        session.handle_event(SimEvent::Command(Command::StartRecording), 0);
        let outputs = session.drain_outputs();
        assert!(matches!(
            outputs[0],
            SessionOutput::Effect(SceneEffect::PlaceObjects(_))
        ));
        assert_eq!(outputs[1], SessionOutput::Effect(SceneEffect::ResetScene));
        assert!(!session.target_object().is_empty());
    }

    #[test]
    fn test_telemetry_pushes_state_and_collision_event() {
        let mut session = Session::new(&settings());
        run(&mut session, 0, 1, &[]);
        let outputs = session.drain_outputs();
        assert!(outputs
            .iter()
            .any(|o| matches!(o, SessionOutput::Send(OutboundMessage::State(_)))));

        session.handle_event(
            SimEvent::Contact {
                collider: "Wall".into(),
            },
            20,
        );
        let now = run(&mut session, 16, 1, &[]);
        let outputs = session.drain_outputs();
        let stamp = outputs.iter().find_map(|o| match o {
            SessionOutput::Send(OutboundMessage::CollisionEvent { timestamp_ms, .. }) => {
                Some(*timestamp_ms)
            }
            _ => None,
        });
        assert_eq!(stamp, Some(now));

        session.handle_event(
            SimEvent::Inbound(InboundMessage::ReplayStatus {
                status: "loading".into(),
                message: String::new(),
            }),
            now,
        );
        assert!(session.drain_outputs().is_empty());
        assert_eq!(session.player.state(), PlaybackState::Idle);
    }

    fn loaded_episode() -> LoadedEpisode {
        let frames = (0..4)
            .map(|i| Frame {
                position: [i as f32, 0.1, 0.0],
                active_actions: [ACTION_FORWARD.to_string()].into_iter().collect(),
                frame_number: i,
                ..default()
            })
            .collect();
        LoadedEpisode {
            placements: vec![ObjectPlacement::new("cup", Vec3::new(1.0, 1.0, 1.0))],
            frames,
        }
    }

    #[test]
    fn test_stored_playback_through_session() {
        let mut session = Session::new(&settings());
        session.handle_event(
            SimEvent::Command(Command::SelectEpisode {
                key: "ep.json".into(),
                mode: SourceMode::Stored,
            }),
            0,
        );
        assert!(session.drain_outputs().contains(&SessionOutput::Load {
            key: "ep.json".into(),
            mode: SourceMode::Stored,
        }));

        session.handle_event(
            SimEvent::EpisodeLoaded {
                key: "ep.json".into(),
                result: Ok(loaded_episode()),
            },
            0,
        );
        assert_eq!(session.player.state(), PlaybackState::Positioning);
        assert_eq!(session.control_authority(), ControlAuthority::Playback);

        // Recording is refused while playback drives the agent
        session.handle_event(SimEvent::Command(Command::StartRecording), 0);
        assert!(!session.recorder.is_recording());

        let resting = TickInputs {
            object_positions: vec![("cup".into(), Vec3::new(1.0, 1.0, 1.0))],
            ..inputs(&[])
        };
        for tick in 0..20 {
            session.tick(&resting, tick * 16, DT);
        }
        let outputs = session.drain_outputs();
        assert!(outputs.contains(&SessionOutput::Effect(SceneEffect::ResetScene)));

        session.handle_event(SimEvent::SceneResetDone, 400);
        assert_eq!(session.player.state(), PlaybackState::Loaded);

        session.handle_event(SimEvent::Command(Command::Play), 400);
        for tick in 0..4 {
            session.tick(&resting, 400 + tick * 16, DT);
        }
        assert_eq!(session.player.state(), PlaybackState::Complete);
        assert_eq!(session.player.status().to_string(), "complete: 4/4 frames");
        let outputs = session.drain_outputs();
        assert!(outputs.contains(&SessionOutput::Effect(SceneEffect::ClearSyntheticActions)));

        session.handle_event(SimEvent::Command(Command::AcknowledgePlayback), 500);
        assert_eq!(session.control_authority(), ControlAuthority::Manual);
    }

    #[test]
    fn test_live_stream_and_transport_loss() {
        let mut session = Session::new(&settings());
        session.handle_event(
            SimEvent::Command(Command::SelectEpisode {
                key: "live.json".into(),
                mode: SourceMode::Live,
            }),
            0,
        );
        session.handle_event(
            SimEvent::EpisodeLoaded {
                key: "live.json".into(),
                result: Ok(LoadedEpisode::default()),
            },
            0,
        );
        for tick in 0..20 {
            session.tick(&inputs(&[]), tick * 16, DT);
        }
        session.handle_event(SimEvent::SceneResetDone, 320);
        session.handle_event(SimEvent::Command(Command::Play), 320);
        assert!(session.drain_outputs().iter().any(|o| matches!(
            o,
            SessionOutput::Send(OutboundMessage::StartReplay { .. })
        )));

        session.handle_event(
            SimEvent::Inbound(InboundMessage::ReplayStep(ReplayStep {
                step: 0,
                total_steps: Some(10),
                action: [ACTION_FORWARD.to_string()].into_iter().collect(),
                state: vec![1.0, 0.1, 2.0, 0.0, 0.0, 0.0],
            })),
            330,
        );
        session.tick(&inputs(&[]), 336, DT);
        assert_eq!(session.player.progress(), (1, Some(10)));

        session.handle_event(SimEvent::TransportLost("socket closed".into()), 340);
        assert_eq!(session.player.state(), PlaybackState::Error);
    }

    #[test]
    fn test_stale_load_result_is_dropped() {
        let mut session = Session::new(&settings());
        session.handle_event(
            SimEvent::EpisodeLoaded {
                key: "other.json".into(),
                result: Ok(loaded_episode()),
            },
            0,
        );
        assert_eq!(session.player.state(), PlaybackState::Idle);
    }
}
