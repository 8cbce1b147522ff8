//! Transport boundary: socket messages, the socket client and the telemetry throttle

mod messages;
mod socket;
mod telemetry;

pub use messages::{Envelope, InboundMessage, OutboundMessage, ReplayStep};
pub use socket::{LoopbackTransport, SocketTransport, Transport};
pub use telemetry::{TelemetryConfig, TelemetryDecision, TelemetryThrottle};
