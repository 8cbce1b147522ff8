//! Recorder - captures frames into episodes
//!
//! Lifecycle: Idle -> Recording -> Stopped -> (save) -> Idle. Saving only
//! produces a [`SaveRequest`]; the caller performs the I/O off-tick and reports
//! back through [`Recorder::on_save_result`].

mod autostop;
mod session;

pub use autostop::{AutoStopConfig, AutoStopEvaluator};
pub use session::{RecorderState, RecorderStatus, RecordingSession};

use bevy::prelude::*;

use crate::episode::{Episode, Frame, ObjectPlacement, StopReason, unique_key};
use crate::error::{SessionStateError, TransportError};

/// Episode ready to be written under `key`
#[derive(Debug, Clone, PartialEq)]
pub struct SaveRequest {
    pub key: String,
    pub episode: Episode,
}

#[derive(Debug, Default)]
pub struct Recorder {
    session: RecordingSession,
    status: RecorderStatus,
}

impl Recorder {
    pub fn state(&self) -> RecorderState {
        self.session.state
    }

    pub fn status(&self) -> &RecorderStatus {
        &self.status
    }

    pub fn is_recording(&self) -> bool {
        self.session.state == RecorderState::Recording
    }

    pub fn frames(&self) -> &[Frame] {
        &self.session.buffer
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.session.stop_reason
    }

    pub fn save_in_flight(&self) -> bool {
        self.session.saving.is_some()
    }

    /// Idle -> Recording. Already recording is a no-op; a stopped, unsaved
    /// buffer must be saved or abandoned first.
    pub fn start(
        &mut self,
        object_placements: Vec<ObjectPlacement>,
    ) -> Result<(), SessionStateError> {
        match self.session.state {
            RecorderState::Idle => {
                self.session = RecordingSession::begin(object_placements);
                self.status = RecorderStatus::Recording;
                info!("Recording started");
                Ok(())
            }
            RecorderState::Recording => {
                warn!("Recording already active, ignoring start");
                Ok(())
            }
            RecorderState::Stopped => Err(SessionStateError::new(
                "start recording",
                "an unsaved episode is stopped",
            )),
        }
    }

    /// Append a frame while recording; ignored otherwise
    pub fn sample(&mut self, frame: Frame) {
        if self.session.state == RecorderState::Recording {
            self.session.buffer.push(frame);
        }
    }

    /// Recording -> Stopped. Returns false if nothing changed.
    pub fn stop(&mut self, reason: StopReason) -> bool {
        if self.session.state != RecorderState::Recording {
            return false;
        }
        self.session.state = RecorderState::Stopped;
        self.session.stop_reason = Some(reason);
        self.status = RecorderStatus::Stopped(reason);
        info!(
            "Recording stopped ({}) after {} frames, {:.1}s",
            reason,
            self.session.buffer.len(),
            self.session.duration_secs()
        );
        true
    }

    /// Build a save request for the current buffer. Recording is stopped
    /// first with a manual reason.
    pub fn save(&mut self, name: &str) -> Result<SaveRequest, SessionStateError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionStateError::new("save", "the episode name is empty"));
        }
        if let Some(key) = &self.session.saving {
            return Err(SessionStateError::new(
                "save",
                format!("'{}' is still being saved", key),
            ));
        }
        match self.session.state {
            RecorderState::Idle => return Err(SessionStateError::new("save", "idle")),
            RecorderState::Recording => {
                self.stop(StopReason::Manual);
            }
            RecorderState::Stopped => {}
        }
        if self.session.buffer.is_empty() {
            return Err(SessionStateError::new("save", "the buffer is empty"));
        }

        let key = unique_key(name);
        let mut episode = Episode::new(
            key.clone(),
            self.session.buffer.clone(),
            self.session.object_placements.clone(),
            self.session.stop_reason,
        );
        if let Some(started) = self.session.started_at {
            episode.recorded_at = started.to_rfc3339();
        }
        self.session.saving = Some(key.clone());
        self.status = RecorderStatus::Saving(key.clone());
        info!("Saving {} frames as {}", episode.frames.len(), key);
        Ok(SaveRequest { key, episode })
    }

    /// Completion of a save request. Success clears the buffer; failure keeps it.
    pub fn on_save_result(&mut self, key: &str, result: Result<(), TransportError>) {
        if self.session.saving.as_deref() != Some(key) {
            warn!("Ignoring save result for unknown request {}", key);
            return;
        }
        self.session.saving = None;
        match result {
            Ok(()) => {
                info!("Saved episode {}", key);
                self.session = RecordingSession::default();
                self.status = RecorderStatus::Saved(key.to_string());
            }
            Err(e) => {
                error!("Failed to save episode {}: {}", key, e);
                self.status = RecorderStatus::SaveFailed(e.to_string());
            }
        }
    }

    /// Discard a stopped, unsaved buffer
    pub fn abandon(&mut self) -> Result<(), SessionStateError> {
        if self.session.saving.is_some() {
            return Err(SessionStateError::new("abandon", "a save is in flight"));
        }
        match self.session.state {
            RecorderState::Stopped => {
                info!(
                    "Discarding {} unsaved frames",
                    self.session.buffer.len()
                );
                self.session = RecordingSession::default();
                self.status = RecorderStatus::Discarded;
                Ok(())
            }
            state => Err(SessionStateError::new("abandon", state)),
        }
    }

    /// Scene reset: an active recording restarts with an empty buffer, a
    /// stopped one is discarded unless its save is still in flight.
    pub fn on_scene_reset(&mut self) {
        match self.session.state {
            RecorderState::Idle => {}
            RecorderState::Recording => {
                self.session.buffer.clear();
                self.session.started_at = Some(chrono::Utc::now());
            }
            RecorderState::Stopped => {
                if self.session.saving.is_some() {
                    debug!("Scene reset while saving, keeping buffer until the save resolves");
                } else {
                    self.session = RecordingSession::default();
                    self.status = RecorderStatus::Idle;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(n: u64) -> Frame {
        Frame {
            frame_number: n,
            ..default()
        }
    }

    fn recording_with(frames: u64) -> Recorder {
        let mut recorder = Recorder::default();
        recorder.start(Vec::new()).unwrap();
        for n in 0..frames {
            recorder.sample(frame(n));
        }
        recorder
    }

    #[test]
    fn test_start_from_idle_and_repeat_is_noop() {
        let mut recorder = recording_with(3);
        assert!(recorder.start(Vec::new()).is_ok());
        assert_eq!(recorder.frames().len(), 3);
        assert_eq!(recorder.status().to_string(), "recording");
    }

    #[test]
    fn test_start_rejected_while_stopped() {
        let mut recorder = recording_with(2);
        recorder.stop(StopReason::Collision);
        assert!(recorder.start(Vec::new()).is_err());
        recorder.abandon().unwrap();
        assert_eq!(recorder.state(), RecorderState::Idle);
        assert!(recorder.start(Vec::new()).is_ok());
        assert!(recorder.frames().is_empty());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut recorder = recording_with(2);
        assert!(recorder.stop(StopReason::Collision));
        assert!(!recorder.stop(StopReason::Manual));
        assert_eq!(recorder.stop_reason(), Some(StopReason::Collision));
        assert_eq!(recorder.status().to_string(), "stopped: collision");
        recorder.sample(frame(9));
        assert_eq!(recorder.frames().len(), 2);
    }

    #[test]
    fn test_save_success_clears_buffer() {
        let mut recorder = recording_with(4);
        let request = recorder.save("t1").unwrap();
        assert_eq!(recorder.state(), RecorderState::Stopped);
        assert_eq!(request.episode.termination_reason, Some(StopReason::Manual));
        assert_eq!(request.episode.frames.len(), 4);
        assert!(request.key.starts_with("t1_"));

        recorder.on_save_result(&request.key, Ok(()));
        assert_eq!(recorder.state(), RecorderState::Idle);
        assert!(recorder.frames().is_empty());
    }

    #[test]
    fn test_save_failure_keeps_frames() {
        let mut recorder = recording_with(4);
        let request = recorder.save("t1").unwrap();
        recorder.on_save_result(&request.key, Err(TransportError::Status(500)));
        assert_eq!(recorder.state(), RecorderState::Stopped);
        assert_eq!(recorder.frames().len(), 4);
        assert!(recorder.status().to_string().starts_with("save failed"));
        // Retry is allowed
        assert!(recorder.save("t1").is_ok());
    }

    #[test]
    fn test_save_rejections_have_no_side_effects() {
        let mut recorder = Recorder::default();
        assert!(recorder.save("t1").is_err());

        let mut recorder = recording_with(2);
        assert!(recorder.save("   ").is_err());
        assert_eq!(recorder.state(), RecorderState::Recording);

        let mut recorder = recording_with(0);
        recorder.stop(StopReason::Manual);
        assert!(recorder.save("t1").is_err());

        let mut recorder = recording_with(1);
        let first = recorder.save("t1").unwrap();
        assert!(recorder.save("t2").is_err());
        assert!(recorder.save_in_flight());
        recorder.on_save_result("someone-else", Ok(()));
        assert!(recorder.save_in_flight());
        recorder.on_save_result(&first.key, Ok(()));
        assert!(!recorder.save_in_flight());
    }

    #[test]
    fn test_scene_reset() {
        let mut recorder = recording_with(5);
        recorder.on_scene_reset();
        assert!(recorder.is_recording());
        assert!(recorder.frames().is_empty());

        let mut recorder = recording_with(5);
        recorder.stop(StopReason::TimeExpired);
        recorder.on_scene_reset();
        assert_eq!(recorder.state(), RecorderState::Idle);

        let mut recorder = recording_with(5);
        let request = recorder.save("t1").unwrap();
        recorder.on_scene_reset();
        recorder.on_save_result(&request.key, Err(TransportError::Disconnected));
        assert_eq!(recorder.frames().len(), 5);
    }
}
