//! Event queue - the single inbox for everything that happens between ticks
//!
//! Input capture, the physics stand-in, I/O task polling and the socket all
//! emit here. The session drains the queue exactly once per tick, in
//! emission order.

use bevy::prelude::*;

use super::types::{Command, SimEvent};

/// Timestamped event
#[derive(Debug)]
pub struct QueuedEvent {
    /// Simulated time in milliseconds when the event was emitted
    pub time_ms: u64,
    pub event: SimEvent,
}

#[derive(Resource, Default)]
pub struct SimEventQueue {
    pending: Vec<QueuedEvent>,
    elapsed_ms: u64,
    processed: u64,
}

impl SimEventQueue {
    /// Update the timestamp used for new events
    pub fn update_time(&mut self, elapsed_ms: u64) {
        self.elapsed_ms = elapsed_ms;
    }

    pub fn emit(&mut self, event: SimEvent) {
        self.pending.push(QueuedEvent {
            time_ms: self.elapsed_ms,
            event,
        });
    }

    pub fn command(&mut self, command: Command) {
        self.emit(SimEvent::Command(command));
    }

    pub fn emit_all(&mut self, events: impl IntoIterator<Item = SimEvent>) {
        for event in events {
            self.emit(event);
        }
    }

    /// Take every pending event, oldest first
    pub fn drain(&mut self) -> Vec<QueuedEvent> {
        let events = std::mem::take(&mut self.pending);
        self.processed += events.len() as u64;
        events
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Total events drained so far
    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_and_drain() {
        let mut queue = SimEventQueue::default();
        queue.update_time(1500);
        queue.command(Command::StartRecording);
        queue.emit(SimEvent::Contact {
            collider: "Wall".into(),
        });

        assert_eq!(queue.pending_count(), 2);
        let events = queue.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].time_ms, 1500);
        assert!(matches!(
            events[0].event,
            SimEvent::Command(Command::StartRecording)
        ));
        assert_eq!(events[1].event.label(), "contact");
        assert!(!queue.has_pending());
        assert_eq!(queue.processed(), 2);
    }

    #[test]
    fn test_events_emitted_during_processing_wait_for_next_drain() {
        let mut queue = SimEventQueue::default();
        queue.emit(SimEvent::SceneResetDone);
        let first = queue.drain();
        queue.emit(SimEvent::SceneResetDone);
        assert_eq!(first.len(), 1);
        assert_eq!(queue.drain().len(), 1);
    }
}
