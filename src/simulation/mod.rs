//! Headless simulation - Bevy wiring around the session
//!
//! Runs the recorder/player core without a renderer: a kinematic agent, a
//! damped drop model for props, and I/O on the task pool.

pub mod agent;
pub mod app_builder;
pub mod io;
pub mod scene;
pub mod systems;

pub use app_builder::HeadlessAppBuilder;
pub use io::{PendingIo, StoreHandle, TransportHandle, VisionState};

use bevy::prelude::*;

use crate::input::{ActionInput, ControlAuthority, KeyBindings, capture_input};

/// Simulated clock, advanced by a fixed step every tick
#[derive(Resource, Debug, Clone)]
pub struct SimClock {
    pub dt: f32,
    pub elapsed_secs: f64,
    pub ticks: u64,
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_TICK_HZ)
    }
}

impl SimClock {
    pub fn new(tick_hz: f32) -> Self {
        Self {
            dt: 1.0 / tick_hz,
            elapsed_secs: 0.0,
            ticks: 0,
        }
    }

    pub fn advance(&mut self) {
        self.ticks += 1;
        self.elapsed_secs += self.dt as f64;
    }

    pub fn now_ms(&self) -> u64 {
        (self.elapsed_secs * 1000.0).round() as u64
    }
}

/// Tick phases, run in this order every Update
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimSet {
    /// Clock, operator input, scripted input
    Input,
    /// Finished I/O tasks and inbound socket messages
    Io,
    /// Agent motion, prop drop, contacts
    Physics,
    /// Events, then the session tick
    Session,
    /// Outbound requests and vision capture
    Output,
}

/// Installs the session systems. Resources are expected from
/// [`HeadlessAppBuilder`]; anything missing falls back to defaults.
pub struct SimulationPlugin;

impl Plugin for SimulationPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<crate::settings::SimSettings>();
        let tick_hz = app.world().resource::<crate::settings::SimSettings>().tick_hz;
        if !app.world().contains_resource::<SimClock>() {
            app.insert_resource(SimClock::new(tick_hz));
        }
        app.init_resource::<crate::events::SimEventQueue>()
            .init_resource::<crate::session::Session>()
            .init_resource::<ActionInput>()
            .init_resource::<ControlAuthority>()
            .init_resource::<KeyBindings>()
            .init_resource::<PendingIo>()
            .init_resource::<TransportHandle>()
            .init_resource::<VisionState>();

        app.configure_sets(
            Update,
            (
                SimSet::Input,
                SimSet::Io,
                SimSet::Physics,
                SimSet::Session,
                SimSet::Output,
            )
                .chain(),
        );

        app.add_systems(Startup, systems::setup_scene)
            .add_systems(
                Update,
                (
                    systems::advance_clock,
                    capture_input.run_if(resource_exists::<ButtonInput<KeyCode>>),
                )
                    .chain()
                    .in_set(SimSet::Input),
            )
            .add_systems(
                Update,
                (io::poll_io_tasks, io::poll_transport).in_set(SimSet::Io),
            )
            .add_systems(
                Update,
                (agent::drive_agent, scene::step_objects, scene::detect_contacts)
                    .chain()
                    .in_set(SimSet::Physics),
            )
            .add_systems(
                Update,
                (
                    systems::process_events,
                    systems::apply_session_outputs,
                    systems::tick_session,
                    systems::apply_session_outputs,
                )
                    .chain()
                    .in_set(SimSet::Session),
            )
            .add_systems(
                Update,
                (io::dispatch_vision, systems::log_status).in_set(SimSet::Output),
            );
    }
}
