//! Internal event queue
//!
//! Replaces broadcast-style notifications with one typed queue that the
//! session drains once per tick.

mod bus;
mod types;

pub use bus::{QueuedEvent, SimEventQueue};
pub use types::{Command, SimEvent};
