//! navsim - episode recorder and player for a robot-navigation simulator
//!
//! Records per-tick robot state into episodes, auto-stops on collision,
//! capture trigger or timeout, persists episodes to pluggable stores, and
//! replays them (stored, or streamed live by the training backend) with the
//! scene reconstructed first.

// Episode model and persistence
pub mod episode;
pub mod error;
pub mod store;

// Session core
pub mod collision;
pub mod constants;
pub mod countdown;
pub mod events;
pub mod input;
pub mod playback;
pub mod randomizer;
pub mod recorder;
pub mod sampler;
pub mod session;
pub mod settings;

// Outer surfaces
pub mod simulation;
pub mod testing;
pub mod transport;
pub mod vision;

pub use constants::*;
pub use episode::{Episode, Frame, ObjectPlacement, StopReason};
pub use error::{InvalidEpisodeError, SessionStateError, StoreError, TransportError};
pub use events::{Command, SimEvent, SimEventQueue};
pub use playback::{PlaybackState, Player, SourceMode};
pub use recorder::{Recorder, RecorderState};
pub use session::{Session, SessionOutput};
pub use settings::SimSettings;
pub use simulation::{HeadlessAppBuilder, SimClock, SimulationPlugin};
pub use store::{EpisodeStore, StoreKind};
