//! Off-tick I/O - store, vision and transport work kept out of the tick
//!
//! Blocking store and HTTP calls run as tasks on the `IoTaskPool`. Each task
//! resolves to a [`SimEvent`]; `poll_io_tasks` checks them once per tick with
//! `poll_once` and forwards finished results to the event queue.

use bevy::prelude::*;
use bevy::tasks::{IoTaskPool, Task, TaskPool, block_on};
use futures_lite::future;
use std::sync::Arc;

use crate::error::TransportError;
use crate::events::{SimEvent, SimEventQueue};
use crate::playback::{SourceMode, fetch_episode};
use crate::recorder::SaveRequest;
use crate::store::EpisodeStore;
use crate::transport::{OutboundMessage, Transport};
use crate::vision::{VisionClient, VisionThrottle, encode_png, render_overhead};

use super::SimClock;
use super::agent::AgentBody;
use super::scene::SceneObject;

/// Shared handle to the configured episode store
#[derive(Resource, Clone)]
pub struct StoreHandle(pub Arc<dyn EpisodeStore>);

/// Live socket, if one is connected
#[derive(Resource, Default)]
pub struct TransportHandle(pub Option<Box<dyn Transport>>);

/// In-flight I/O tasks
#[derive(Resource, Default)]
pub struct PendingIo {
    tasks: Vec<Task<SimEvent>>,
}

impl PendingIo {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn spawn(&mut self, work: impl FnOnce() -> SimEvent + Send + 'static) {
        let pool = IoTaskPool::get_or_init(TaskPool::new);
        self.tasks.push(pool.spawn(async move { work() }));
    }

    pub fn save(&mut self, store: Arc<dyn EpisodeStore>, request: SaveRequest) {
        self.spawn(move || {
            let result = store.save(&request.key, &request.episode);
            SimEvent::SaveCompleted {
                key: request.key,
                result,
            }
        });
    }

    pub fn load(&mut self, store: Arc<dyn EpisodeStore>, key: String, mode: SourceMode) {
        self.spawn(move || {
            let result = fetch_episode(store.as_ref(), &key, mode);
            SimEvent::EpisodeLoaded { key, result }
        });
    }

    pub fn list(&mut self, store: Arc<dyn EpisodeStore>) {
        self.spawn(move || SimEvent::EpisodeList(store.list()));
    }

    pub fn detect(&mut self, client: Arc<VisionClient>, png: Vec<u8>) {
        self.spawn(move || SimEvent::VisionResult(client.detect(&png)));
    }
}

/// Forward finished tasks to the event queue
pub fn poll_io_tasks(
    mut pending: ResMut<PendingIo>,
    mut vision: ResMut<VisionState>,
    mut queue: ResMut<SimEventQueue>,
) {
    let mut finished = Vec::new();
    pending.tasks.retain_mut(|task| {
        match block_on(future::poll_once(task)) {
            Some(event) => {
                finished.push(event);
                false
            }
            None => true,
        }
    });
    for event in finished {
        if matches!(event, SimEvent::VisionResult(_)) {
            vision.throttle.finish();
        }
        queue.emit(event);
    }
}

/// Block until every in-flight task finishes and forward the results.
/// Scripted runs call this after each update so results land on the next
/// tick regardless of thread timing.
pub fn flush_io(world: &mut World) {
    let tasks = std::mem::take(&mut world.resource_mut::<PendingIo>().tasks);
    for event in tasks.into_iter().map(block_on) {
        if matches!(event, SimEvent::VisionResult(_)) {
            world.resource_mut::<VisionState>().throttle.finish();
        }
        world.resource_mut::<SimEventQueue>().emit(event);
    }
}

/// Vision service client plus its request throttle
#[derive(Resource, Default)]
pub struct VisionState {
    pub client: Option<Arc<VisionClient>>,
    pub throttle: VisionThrottle,
}

/// Capture and send one camera image when the throttle allows
pub fn dispatch_vision(
    clock: Res<SimClock>,
    mut vision: ResMut<VisionState>,
    mut pending: ResMut<PendingIo>,
    agents: Query<&Transform, With<AgentBody>>,
    objects: Query<(&Transform, &SceneObject)>,
) {
    let Some(client) = vision.client.clone() else {
        return;
    };
    let Ok(agent) = agents.single() else {
        return;
    };
    if !vision.throttle.try_begin(clock.now_ms()) {
        return;
    }
    let positions: Vec<(String, Vec3)> = objects
        .iter()
        .map(|(t, o)| (o.id.clone(), t.translation))
        .collect();
    let image = render_overhead(agent.translation, &positions);
    match encode_png(&image) {
        Ok(png) => pending.detect(client, png),
        Err(e) => {
            warn!("Failed to encode camera image: {}", e);
            vision.throttle.finish();
        }
    }
}

/// Drain inbound socket messages; a dropped socket is reported once
pub fn poll_transport(mut transport: ResMut<TransportHandle>, mut queue: ResMut<SimEventQueue>) {
    let Some(socket) = transport.0.as_mut() else {
        return;
    };
    for message in socket.poll() {
        queue.emit(SimEvent::Inbound(message));
    }
    if !socket.is_connected() {
        queue.emit(SimEvent::TransportLost(TransportError::Disconnected.to_string()));
        transport.0 = None;
    }
}

/// Push one outbound message. Failures never reach the recorder.
///
/// Telemetry without a socket is dropped quietly; a live replay request
/// without one is reported as a lost transport so the player can fail.
pub fn send_message(
    transport: &mut TransportHandle,
    queue: &mut SimEventQueue,
    message: &OutboundMessage,
) {
    let Some(socket) = transport.0.as_mut() else {
        if matches!(message, OutboundMessage::StartReplay { .. }) {
            warn!("Cannot send {}: no transport", message.event_name());
            queue.emit(SimEvent::TransportLost(TransportError::NotConnected.to_string()));
        }
        return;
    };
    if let Err(e) = socket.send(message) {
        warn!("Failed to send {}: {}", message.event_name(), e);
        if matches!(e, TransportError::Disconnected) {
            queue.emit(SimEvent::TransportLost(e.to_string()));
            transport.0 = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::episode::{Episode, Frame};
    use crate::store::MemoryEpisodeStore;
    use crate::transport::LoopbackTransport;

    fn wait_for(pending: &mut PendingIo) -> Vec<SimEvent> {
        let mut app = App::new();
        app.insert_resource(std::mem::take(pending));
        app.init_resource::<VisionState>();
        app.init_resource::<SimEventQueue>();
        app.add_systems(Update, poll_io_tasks);
        for _ in 0..1000 {
            app.update();
            if app.world().resource::<PendingIo>().is_empty() {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        app.world_mut()
            .resource_mut::<SimEventQueue>()
            .drain()
            .into_iter()
            .map(|q| q.event)
            .collect()
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let store: Arc<dyn EpisodeStore> = Arc::new(MemoryEpisodeStore::default());
        let frames = (0..3)
            .map(|i| Frame {
                frame_number: i,
                ..default()
            })
            .collect();
        let episode = Episode::new("a.json", frames, Vec::new(), None);

        let mut pending = PendingIo::default();
        pending.save(
            store.clone(),
            SaveRequest {
                key: "a.json".into(),
                episode,
            },
        );
        let events = wait_for(&mut pending);
        assert!(matches!(
            &events[..],
            [SimEvent::SaveCompleted { result: Ok(()), .. }]
        ));

        pending.load(store.clone(), "a.json".into(), SourceMode::Stored);
        pending.list(store);
        let events = wait_for(&mut pending);
        assert_eq!(events.len(), 2);
        for event in events {
            match event {
                SimEvent::EpisodeLoaded { result, .. } => {
                    assert_eq!(result.unwrap().frames.len(), 3)
                }
                SimEvent::EpisodeList(list) => assert_eq!(list.unwrap(), vec!["a.json"]),
                other => panic!("unexpected {}", other.label()),
            }
        }
    }

    #[test]
    fn test_live_replay_without_transport_reports_loss() {
        let mut transport = TransportHandle(None);
        let mut queue = SimEventQueue::default();
        send_message(&mut transport, &mut queue, &OutboundMessage::StopReplay);
        assert!(queue.drain().is_empty());

        let start = OutboundMessage::StartReplay {
            filename: "t1.json".into(),
        };
        send_message(&mut transport, &mut queue, &start);
        let events = queue.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.label(), "transport_lost");
    }

    #[test]
    fn test_dropped_transport_is_reported_once() {
        let mut app = App::new();
        let loopback = LoopbackTransport {
            disconnected: true,
            ..default()
        };
        app.insert_resource(TransportHandle(Some(Box::new(loopback))));
        app.init_resource::<SimEventQueue>();
        app.add_systems(Update, poll_transport);
        app.update();
        app.update();
        let events = app.world_mut().resource_mut::<SimEventQueue>().drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.label(), "transport_lost");
    }
}
