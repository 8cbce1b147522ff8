//! Player - drives the agent from a stored episode or a live step stream
//!
//! The player never touches the scene directly. Every transition queues
//! [`PlayerOutput`]s (scene effects, load requests, outbound messages) that
//! the session drains once per tick.

use bevy::prelude::*;
use std::collections::BTreeSet;

use super::settle::{SettleConfig, SettleProgress, SettlementTracker};
use super::source::{LiveSteps, SourceMode, StoredFrames};
use super::state::{PlaybackControls, PlaybackState, PlayerStatus};
use crate::constants::{SPAWN_POSITION, SPAWN_YAW};
use crate::episode::{Frame, ObjectPlacement, validate_frames};
use crate::error::{SessionStateError, StoreError};
use crate::store::EpisodeStore;
use crate::transport::{OutboundMessage, ReplayStep};

/// Commands for the scene collaborator
#[derive(Debug, Clone, PartialEq)]
pub enum SceneEffect {
    PlaceObjects(Vec<ObjectPlacement>),
    ResetScene,
    /// Teleport the agent; linear and angular velocity are zeroed
    OverridePose { position: Vec3, rotation: Quat },
    SetSyntheticActions(BTreeSet<String>),
    ClearSyntheticActions,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerOutput {
    Effect(SceneEffect),
    /// Fetch placements and frames off-tick, then call `on_loaded`
    Load { key: String, mode: SourceMode },
    Send(OutboundMessage),
}

/// Result of a load request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedEpisode {
    pub placements: Vec<ObjectPlacement>,
    pub frames: Vec<Frame>,
}

/// Blocking fetch used by the I/O task. Live mode tolerates missing frames;
/// they only provide the initial pose.
pub fn fetch_episode(
    store: &dyn EpisodeStore,
    key: &str,
    mode: SourceMode,
) -> Result<LoadedEpisode, StoreError> {
    let placements = store.load_object_placements(key)?;
    let frames = match mode {
        SourceMode::Stored => store.load_frames(key)?,
        SourceMode::Live => store.load_frames(key).unwrap_or_else(|e| {
            warn!("No frames for live replay {} ({}), using spawn pose", key, e);
            Vec::new()
        }),
    };
    Ok(LoadedEpisode { placements, frames })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerConfig {
    pub settle: SettleConfig,
    pub spawn_position: Vec3,
    pub spawn_yaw: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            settle: SettleConfig::default(),
            spawn_position: SPAWN_POSITION,
            spawn_yaw: SPAWN_YAW,
        }
    }
}

#[derive(Debug, Default)]
pub struct Player {
    pub config: PlayerConfig,
    pub controls: PlaybackControls,
    state: PlaybackState,
    detail: Option<String>,
    episode: Option<String>,
    mode: SourceMode,
    stored: StoredFrames,
    live: LiveSteps,
    live_started: bool,
    initial_pose: (Vec3, Quat),
    settle: Option<SettlementTracker>,
    awaiting_reset: bool,
    outbox: Vec<PlayerOutput>,
}

impl Player {
    pub fn new(config: PlayerConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn mode(&self) -> SourceMode {
        self.mode
    }

    pub fn episode(&self) -> Option<&str> {
        self.episode.as_deref()
    }

    pub fn owns_pose(&self) -> bool {
        self.state.owns_pose()
    }

    pub fn status(&self) -> PlayerStatus {
        PlayerStatus {
            state: self.state,
            detail: self.detail.clone(),
        }
    }

    /// `(frames applied, total)`; total is unknown for live streams without `total_steps`
    pub fn progress(&self) -> (u64, Option<u64>) {
        match self.mode {
            SourceMode::Stored => (self.stored.cursor() as u64, Some(self.stored.len() as u64)),
            SourceMode::Live => (
                self.live.last_applied().map(|s| s + 1).unwrap_or(0),
                self.live.total_steps,
            ),
        }
    }

    /// Tracked object ids while positioning
    pub fn is_positioning(&self) -> bool {
        self.state == PlaybackState::Positioning && !self.awaiting_reset
    }

    pub fn drain_outputs(&mut self) -> Vec<PlayerOutput> {
        std::mem::take(&mut self.outbox)
    }

    fn effect(&mut self, effect: SceneEffect) {
        self.outbox.push(PlayerOutput::Effect(effect));
    }

    fn transition(&mut self, state: PlaybackState, detail: Option<String>) {
        info!(
            "Player: {} -> {}{}",
            self.state,
            state,
            detail
                .as_deref()
                .map(|d| format!(" ({})", d))
                .unwrap_or_default()
        );
        self.state = state;
        self.detail = detail;
    }

    /// Idle -> Loading
    pub fn select(&mut self, key: &str, mode: SourceMode) -> Result<(), SessionStateError> {
        if self.state != PlaybackState::Idle {
            return Err(SessionStateError::new("select an episode", self.state));
        }
        self.episode = Some(key.to_string());
        self.mode = mode;
        self.stored = StoredFrames::default();
        self.live = LiveSteps::default();
        self.live_started = false;
        self.settle = None;
        self.awaiting_reset = false;
        self.controls.is_paused = false;
        self.controls.step_pending = false;
        self.transition(
            PlaybackState::Loading,
            Some(format!("{} ({})", key, mode.as_str())),
        );
        self.outbox.push(PlayerOutput::Load {
            key: key.to_string(),
            mode,
        });
        Ok(())
    }

    /// Loading -> Positioning, or Error
    pub fn on_loaded(&mut self, result: Result<LoadedEpisode, StoreError>) {
        if self.state != PlaybackState::Loading {
            debug!("Player: dropping load result while {}", self.state);
            return;
        }
        let loaded = match result {
            Ok(loaded) => loaded,
            Err(e) => {
                self.fail(format!("loading failed: {}", e));
                return;
            }
        };
        if self.mode == SourceMode::Stored
            && let Err(e) = validate_frames(&loaded.frames)
        {
            self.fail(format!("loading failed: {}", e));
            return;
        }

        self.initial_pose = match loaded.frames.first() {
            Some(first) => (first.translation(), first.orientation()),
            None => (
                self.config.spawn_position,
                Quat::from_rotation_y(self.config.spawn_yaw),
            ),
        };
        self.settle = Some(SettlementTracker::new(
            self.config.settle,
            loaded
                .placements
                .iter()
                .map(|p| (p.id.clone(), p.translation())),
        ));
        info!(
            "Player: loaded {} frames, {} objects",
            loaded.frames.len(),
            loaded.placements.len()
        );

        let (position, rotation) = self.initial_pose;
        self.effect(SceneEffect::PlaceObjects(loaded.placements));
        self.effect(SceneEffect::OverridePose { position, rotation });
        if self.mode == SourceMode::Stored {
            self.stored = StoredFrames::new(loaded.frames);
        }
        self.transition(PlaybackState::Positioning, None);
    }

    /// Feed polled object positions while positioning
    pub fn tick_positioning(&mut self, positions: &[(String, Vec3)]) {
        if !self.is_positioning() {
            return;
        }
        let Some(tracker) = self.settle.as_mut() else {
            return;
        };
        match tracker.observe(positions) {
            SettleProgress::Waiting => {}
            SettleProgress::Settled => {
                info!("Player: objects settled after {} ticks", tracker.elapsed_ticks());
                self.request_reset();
            }
            SettleProgress::TimedOut(e) => {
                warn!("Player: {}, continuing", e);
                self.detail = Some(e.to_string());
                self.request_reset();
            }
        }
    }

    fn request_reset(&mut self) {
        self.awaiting_reset = true;
        self.effect(SceneEffect::ResetScene);
    }

    /// Scene reset finished; re-apply the initial pose and become Loaded
    pub fn on_reset_acknowledged(&mut self) {
        if self.state != PlaybackState::Positioning || !self.awaiting_reset {
            return;
        }
        self.awaiting_reset = false;
        let (position, rotation) = self.initial_pose;
        self.effect(SceneEffect::OverridePose { position, rotation });
        let detail = self.detail.take();
        self.transition(PlaybackState::Loaded, detail);
    }

    /// Loaded -> Playing
    pub fn play(&mut self) -> Result<(), SessionStateError> {
        if self.state != PlaybackState::Loaded {
            return Err(SessionStateError::new("play", self.state));
        }
        if self.mode == SourceMode::Live {
            let filename = self.episode.clone().unwrap_or_default();
            self.outbox
                .push(PlayerOutput::Send(OutboundMessage::StartReplay { filename }));
            self.live_started = true;
        }
        self.transition(PlaybackState::Playing, None);
        Ok(())
    }

    /// Queue a live step; ignored unless playing a live stream
    pub fn on_live_step(&mut self, step: ReplayStep) {
        if self.state != PlaybackState::Playing || self.mode != SourceMode::Live {
            debug!("Player: ignoring replay step {} while {}", step.step, self.state);
            return;
        }
        if !self.live.push(step) {
            debug!("Player: dropped late or duplicate replay step");
        }
    }

    pub fn on_live_complete(&mut self) {
        if self.state == PlaybackState::Playing && self.mode == SourceMode::Live {
            // Apply whatever is still queued first
            if let Some(step) = self.live.take_latest() {
                self.apply(&step.to_frame());
            }
            self.complete();
        }
    }

    /// Advance playback by one tick
    pub fn tick_playing(&mut self) {
        if self.state != PlaybackState::Playing {
            return;
        }
        match self.mode {
            SourceMode::Stored => {
                let frame = if self.controls.is_paused {
                    if self.controls.step_pending {
                        self.controls.step_pending = false;
                        self.stored.skip(1).cloned()
                    } else {
                        None
                    }
                } else {
                    self.stored.advance(self.controls.playback_speed).cloned()
                };
                if let Some(frame) = frame {
                    self.apply(&frame);
                }
                if self.stored.is_finished() {
                    self.complete();
                }
            }
            SourceMode::Live => {
                if let Some(step) = self.live.take_latest() {
                    self.apply(&step.to_frame());
                }
                if self.live.reached_end() {
                    self.complete();
                }
            }
        }
    }

    fn apply(&mut self, frame: &Frame) {
        self.effect(SceneEffect::OverridePose {
            position: frame.translation(),
            rotation: frame.orientation(),
        });
        self.effect(SceneEffect::SetSyntheticActions(frame.active_actions.clone()));
    }

    fn complete(&mut self) {
        self.effect(SceneEffect::ClearSyntheticActions);
        let (applied, total) = self.progress();
        let detail = match total {
            Some(total) => format!("{}/{} frames", applied, total),
            None => format!("{} frames", applied),
        };
        self.transition(PlaybackState::Complete, Some(detail));
    }

    /// Abort from any non-terminal, non-idle state. Idempotent.
    pub fn cancel(&mut self) -> bool {
        let cancellable = matches!(
            self.state,
            PlaybackState::Loading
                | PlaybackState::Positioning
                | PlaybackState::Loaded
                | PlaybackState::Playing
        );
        if !cancellable {
            return false;
        }
        if self.live_started {
            self.outbox.push(PlayerOutput::Send(OutboundMessage::StopReplay));
            self.live_started = false;
        }
        self.effect(SceneEffect::ClearSyntheticActions);
        self.transition(PlaybackState::Cancelled, None);
        true
    }

    /// Unrecoverable I/O failure (e.g. the live stream dropped)
    pub fn on_transport_lost(&mut self, cause: &str) {
        if self.state == PlaybackState::Playing && self.mode == SourceMode::Live {
            self.live_started = false;
            self.fail(format!("transport lost: {}", cause));
        }
    }

    fn fail(&mut self, detail: String) {
        error!("Player: {}", detail);
        if self.state.owns_pose() {
            self.effect(SceneEffect::ClearSyntheticActions);
        }
        self.transition(PlaybackState::Error, Some(detail));
    }

    /// Dismiss a terminal session
    pub fn acknowledge(&mut self) -> Result<(), SessionStateError> {
        if !self.state.is_terminal() {
            return Err(SessionStateError::new("acknowledge", self.state));
        }
        self.episode = None;
        self.settle = None;
        self.stored = StoredFrames::default();
        self.live = LiveSteps::default();
        self.transition(PlaybackState::Idle, None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{InvalidEpisodeError, TransportError};
    use crate::playback::settle::SettleConfig;

    fn frames(n: u64) -> Vec<Frame> {
        (0..n)
            .map(|i| {
                let mut f = Frame {
                    frame_number: i,
                    position: [i as f32, 0.1, 0.0],
                    ..default()
                };
                if i < n / 2 {
                    f.active_actions.insert("w".into());
                }
                f
            })
            .collect()
    }

    fn loaded(n: u64) -> LoadedEpisode {
        LoadedEpisode {
            placements: vec![ObjectPlacement::new("cup", Vec3::new(1.0, 1.0, 1.0))],
            frames: frames(n),
        }
    }

    fn settled_positions() -> Vec<(String, Vec3)> {
        vec![("cup".to_string(), Vec3::new(1.0, 1.0, 1.0))]
    }

    /// Drive a player through loading and positioning to Loaded
    fn loaded_player(n: u64, mode: SourceMode) -> Player {
        let mut player = Player::default();
        player.select("t1", mode).unwrap();
        player.on_loaded(Ok(loaded(n)));
        for _ in 0..SettleConfig::default().stable_ticks {
            player.tick_positioning(&settled_positions());
        }
        player.on_reset_acknowledged();
        assert_eq!(player.state(), PlaybackState::Loaded);
        player.drain_outputs();
        player
    }

    #[test]
    fn test_select_requests_load() {
        let mut player = Player::default();
        player.select("t1", SourceMode::Stored).unwrap();
        assert_eq!(player.state(), PlaybackState::Loading);
        assert_eq!(
            player.drain_outputs(),
            vec![PlayerOutput::Load {
                key: "t1".into(),
                mode: SourceMode::Stored
            }]
        );
        assert!(player.select("t2", SourceMode::Stored).is_err());
    }

    #[test]
    fn test_load_places_objects_and_sets_initial_pose() {
        let mut player = Player::default();
        player.select("t1", SourceMode::Stored).unwrap();
        player.drain_outputs();
        player.on_loaded(Ok(loaded(4)));
        assert_eq!(player.state(), PlaybackState::Positioning);
        assert!(player.owns_pose());
        let outputs = player.drain_outputs();
        assert!(matches!(
            &outputs[0],
            PlayerOutput::Effect(SceneEffect::PlaceObjects(p)) if p.len() == 1
        ));
        assert_eq!(
            outputs[1],
            PlayerOutput::Effect(SceneEffect::OverridePose {
                position: Vec3::new(0.0, 0.1, 0.0),
                rotation: Quat::IDENTITY,
            })
        );
    }

    #[test]
    fn test_load_failures_become_error() {
        let mut player = Player::default();
        player.select("t1", SourceMode::Stored).unwrap();
        player.on_loaded(Err(StoreError::Transport(TransportError::NotFound(
            "t1".into(),
        ))));
        assert_eq!(player.state(), PlaybackState::Error);
        assert_eq!(
            player.status().to_string(),
            "error: loading failed: episode 't1' not found"
        );

        let mut player = Player::default();
        player.select("t1", SourceMode::Stored).unwrap();
        player.on_loaded(Err(InvalidEpisodeError::Empty.into()));
        assert_eq!(player.state(), PlaybackState::Error);
        player.acknowledge().unwrap();
        assert_eq!(player.state(), PlaybackState::Idle);
    }

    #[test]
    fn test_live_mode_without_frames_uses_spawn_pose() {
        let mut player = Player::default();
        player.select("t1", SourceMode::Live).unwrap();
        player.drain_outputs();
        player.on_loaded(Ok(LoadedEpisode::default()));
        assert_eq!(player.state(), PlaybackState::Positioning);
        let outputs = player.drain_outputs();
        let PlayerOutput::Effect(SceneEffect::OverridePose { position, rotation }) = &outputs[1]
        else {
            panic!("expected a pose override");
        };
        assert_eq!(*position, SPAWN_POSITION);
        assert!(rotation.dot(Quat::from_rotation_y(SPAWN_YAW)).abs() > 1.0 - 1e-6);
    }

    #[test]
    fn test_settlement_then_reset_then_loaded() {
        let mut player = Player::default();
        player.select("t1", SourceMode::Stored).unwrap();
        player.on_loaded(Ok(loaded(4)));
        player.drain_outputs();

        for _ in 0..19 {
            player.tick_positioning(&settled_positions());
        }
        assert!(player.drain_outputs().is_empty());
        player.tick_positioning(&settled_positions());
        assert_eq!(
            player.drain_outputs(),
            vec![PlayerOutput::Effect(SceneEffect::ResetScene)]
        );
        // Still positioning until the reset is acknowledged
        assert_eq!(player.state(), PlaybackState::Positioning);
        assert!(player.play().is_err());
        player.on_reset_acknowledged();
        assert_eq!(player.state(), PlaybackState::Loaded);
    }

    #[test]
    fn test_settlement_timeout_proceeds_with_warning() {
        let mut player = Player::new(PlayerConfig {
            settle: SettleConfig {
                max_ticks: 10,
                ..default()
            },
            ..default()
        });
        player.select("t1", SourceMode::Stored).unwrap();
        player.on_loaded(Ok(loaded(4)));
        for i in 0..10 {
            let y = if i % 2 == 0 { 2.0 } else { 1.0 };
            player.tick_positioning(&[("cup".to_string(), Vec3::new(1.0, y, 1.0))]);
        }
        player.on_reset_acknowledged();
        assert_eq!(player.state(), PlaybackState::Loaded);
        assert!(player.status().to_string().contains("did not settle"));
    }

    #[test]
    fn test_stored_playback_applies_every_frame_then_completes() {
        let mut player = loaded_player(4, SourceMode::Stored);
        player.play().unwrap();
        let mut overrides = 0;
        let mut actions = Vec::new();
        for _ in 0..4 {
            player.tick_playing();
            for out in player.drain_outputs() {
                match out {
                    PlayerOutput::Effect(SceneEffect::OverridePose { .. }) => overrides += 1,
                    PlayerOutput::Effect(SceneEffect::SetSyntheticActions(a)) => actions.push(a),
                    _ => {}
                }
            }
        }
        assert_eq!(overrides, 4);
        assert_eq!(actions.len(), 4);
        assert!(actions[0].contains("w"));
        assert!(actions[3].is_empty());
        assert_eq!(player.state(), PlaybackState::Complete);
        assert_eq!(player.status().to_string(), "complete: 4/4 frames");
    }

    #[test]
    fn test_pause_and_step() {
        let mut player = loaded_player(10, SourceMode::Stored);
        player.play().unwrap();
        player.controls.toggle_pause();
        player.tick_playing();
        assert_eq!(player.progress().0, 0);
        player.controls.step_forward();
        player.tick_playing();
        player.tick_playing();
        assert_eq!(player.progress().0, 1);
        player.controls.toggle_pause();
        player.controls.speed_up();
        player.tick_playing();
        assert_eq!(player.progress().0, 3);
    }

    #[test]
    fn test_cancel_is_idempotent_and_clears_actions() {
        let mut player = loaded_player(10, SourceMode::Stored);
        player.play().unwrap();
        player.tick_playing();
        player.drain_outputs();
        assert!(player.cancel());
        assert_eq!(
            player.drain_outputs(),
            vec![PlayerOutput::Effect(SceneEffect::ClearSyntheticActions)]
        );
        assert!(!player.cancel());
        assert!(player.drain_outputs().is_empty());
        assert_eq!(player.state(), PlaybackState::Cancelled);
        assert!(!player.owns_pose());
    }

    #[test]
    fn test_live_stream_order_and_completion() {
        let mut player = loaded_player(0, SourceMode::Live);
        player.play().unwrap();
        assert_eq!(
            player.drain_outputs(),
            vec![PlayerOutput::Send(OutboundMessage::StartReplay {
                filename: "t1".into()
            })]
        );

        let step = |n: u64| ReplayStep {
            step: n,
            total_steps: Some(5),
            action: ["w".to_string()].into_iter().collect(),
            state: vec![n as f32, 0.1, 0.0, 0.0, 0.0, 0.0],
        };
        player.on_live_step(step(0));
        player.tick_playing();
        player.on_live_step(step(2));
        player.on_live_step(step(1));
        player.on_live_step(step(0));
        player.tick_playing();
        assert_eq!(player.progress(), (3, Some(5)));
        let poses: Vec<_> = player
            .drain_outputs()
            .into_iter()
            .filter_map(|o| match o {
                PlayerOutput::Effect(SceneEffect::OverridePose { position, .. }) => Some(position.x),
                _ => None,
            })
            .collect();
        assert_eq!(poses, vec![0.0, 2.0]);

        player.on_live_step(step(4));
        player.tick_playing();
        assert_eq!(player.state(), PlaybackState::Complete);
    }

    #[test]
    fn test_live_cancel_sends_stop() {
        let mut player = loaded_player(0, SourceMode::Live);
        player.play().unwrap();
        player.drain_outputs();
        player.cancel();
        let outputs = player.drain_outputs();
        assert!(outputs.contains(&PlayerOutput::Send(OutboundMessage::StopReplay)));
    }

    #[test]
    fn test_live_transport_loss_is_terminal_error() {
        let mut player = loaded_player(0, SourceMode::Live);
        player.play().unwrap();
        player.on_transport_lost("socket closed");
        assert_eq!(player.state(), PlaybackState::Error);
        assert!(!player.cancel());
    }
}
