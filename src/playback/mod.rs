//! Playback of recorded episodes, from a store or streamed live by the backend.
//!
//! Lifecycle: Idle -> Loading -> Positioning -> Loaded -> Playing -> Complete,
//! with Cancelled and Error as the other terminal states.

mod player;
mod settle;
mod source;
mod state;

pub use player::{
    LoadedEpisode, Player, PlayerConfig, PlayerOutput, SceneEffect, fetch_episode,
};
pub use settle::{SettleConfig, SettleProgress, SettlementTracker};
pub use source::{LiveSteps, SourceMode, StoredFrames};
pub use state::{PLAYBACK_SPEEDS, PlaybackControls, PlaybackState, PlayerStatus};
