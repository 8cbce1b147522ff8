//! Headless App Builder
//!
//! One place that assembles a headless simulator app. Used by the main
//! binary, the scenario runner and the tests.

use bevy::app::ScheduleRunnerPlugin;
use bevy::prelude::*;
use std::sync::Arc;
use std::time::Duration;

use crate::session::Session;
use crate::settings::SimSettings;
use crate::store::{EpisodeStore, MemoryEpisodeStore};
use crate::transport::Transport;
use crate::vision::{VisionClient, VisionThrottle};

use super::io::{StoreHandle, TransportHandle, VisionState};
use super::{SimClock, SimulationPlugin};

/// Builder for creating headless simulator apps
pub struct HeadlessAppBuilder {
    settings: SimSettings,
    store: Option<Arc<dyn EpisodeStore>>,
    transport: Option<Box<dyn Transport>>,
    minimal_threads: bool,
    keyboard: bool,
    logging: bool,
}

impl Default for HeadlessAppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessAppBuilder {
    pub fn new() -> Self {
        Self {
            settings: SimSettings::default(),
            store: None,
            transport: None,
            minimal_threads: false,
            keyboard: false,
            logging: false,
        }
    }

    pub fn with_settings(mut self, settings: SimSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Use this store instead of the one named in the settings
    pub fn with_store(mut self, store: Arc<dyn EpisodeStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_transport(mut self, transport: Box<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Enable minimal thread mode (task pools = 1)
    ///
    /// Use this when running many apps at once, e.g. the scenario runner.
    pub fn with_minimal_threads(mut self) -> Self {
        self.minimal_threads = true;
        self
    }

    /// Read operator keys from `ButtonInput<KeyCode>`
    pub fn with_keyboard(mut self) -> Self {
        self.keyboard = true;
        self
    }

    pub fn with_logging(mut self) -> Self {
        self.logging = true;
        self
    }

    fn resolve_store(&mut self) -> Arc<dyn EpisodeStore> {
        if let Some(store) = self.store.take() {
            return store;
        }
        match self.settings.store_kind() {
            Some(kind) => match kind.open() {
                Ok(store) => store,
                Err(e) => {
                    warn!(
                        "Failed to open episode store '{}': {}, keeping episodes in memory",
                        self.settings.episode_store, e
                    );
                    Arc::new(MemoryEpisodeStore::default())
                }
            },
            None => {
                warn!(
                    "Unknown episode store '{}', keeping episodes in memory",
                    self.settings.episode_store
                );
                Arc::new(MemoryEpisodeStore::default())
            }
        }
    }

    /// Build the app with minimal plugins and every simulator resource
    ///
    /// Drive it with `app.update()` for deterministic stepping, or
    /// `app.run()` to tick at the configured rate.
    pub fn build(mut self) -> App {
        let mut app = App::new();
        let tick = Duration::from_secs_f32(self.settings.tick_dt());

        if self.minimal_threads {
            app.add_plugins(
                MinimalPlugins
                    .set(ScheduleRunnerPlugin::run_loop(tick))
                    .set(TaskPoolPlugin {
                        task_pool_options: TaskPoolOptions::with_num_threads(1),
                    }),
            );
        } else {
            app.add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(tick)));
        }
        if self.logging {
            app.add_plugins(bevy::log::LogPlugin::default());
        }
        if self.keyboard {
            app.add_plugins(bevy::input::InputPlugin);
        }

        let store = self.resolve_store();
        info!("Episode store: {}", store.describe());

        let vision = if self.settings.vision_enabled {
            VisionState {
                client: Some(Arc::new(VisionClient::new(&self.settings.vision_url()))),
                throttle: VisionThrottle::new(self.settings.vision_interval_ms),
            }
        } else {
            VisionState::default()
        };

        app.insert_resource(SimClock::new(self.settings.tick_hz))
            .insert_resource(Session::new(&self.settings))
            .insert_resource(crate::input::KeyBindings::from_settings(&self.settings))
            .insert_resource(StoreHandle(store))
            .insert_resource(TransportHandle(self.transport))
            .insert_resource(vision)
            .insert_resource(self.settings);

        app.add_plugins(SimulationPlugin);
        app
    }
}
