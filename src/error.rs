//! Error taxonomy for the recorder, player and their I/O boundaries

use thiserror::Error;

/// Save/load/network failure. Recoverable: retry or surface to the operator.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http request failed: {0}")]
    Http(String),
    #[error("backend returned status {0}")]
    Status(u16),
    #[error("socket error: {0}")]
    Socket(String),
    #[error("transport disconnected")]
    Disconnected,
    #[error("transport not connected")]
    NotConnected,
    #[error("episode '{0}' not found")]
    NotFound(String),
    #[error("episode '{0}' already exists")]
    AlreadyExists(String),
    #[error("invalid episode key '{0}'")]
    InvalidKey(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

impl From<ureq::Error> for TransportError {
    fn from(e: ureq::Error) -> Self {
        match e {
            ureq::Error::StatusCode(code) => TransportError::Status(code),
            other => TransportError::Http(other.to_string()),
        }
    }
}

impl From<tungstenite::Error> for TransportError {
    fn from(e: tungstenite::Error) -> Self {
        match e {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                TransportError::Disconnected
            }
            other => TransportError::Socket(other.to_string()),
        }
    }
}

/// Malformed or empty frame sequence
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidEpisodeError {
    #[error("episode has no frames")]
    Empty,
    #[error("frame {index}: non-finite {field}")]
    NonFinite { index: usize, field: &'static str },
    #[error("frame {index}: rotation is not a usable quaternion")]
    DegenerateRotation { index: usize },
    #[error("frame {index}: frame number {frame_number} does not follow {previous}")]
    OutOfOrder {
        index: usize,
        frame_number: u64,
        previous: u64,
    },
    #[error("malformed episode document: {0}")]
    Malformed(String),
}

/// Objects never came to rest within the tick budget
#[derive(Debug, Clone, PartialEq, Error)]
#[error("objects did not settle within {ticks} ticks ({unsettled} still moving)")]
pub struct SettlementTimeoutError {
    pub ticks: u32,
    pub unsettled: usize,
}

/// An operation was invoked in a state that does not allow it
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot {operation} while {state}")]
pub struct SessionStateError {
    pub operation: &'static str,
    pub state: String,
}

impl SessionStateError {
    pub fn new(operation: &'static str, state: impl ToString) -> Self {
        Self {
            operation,
            state: state.to_string(),
        }
    }
}

/// Failure on a store load path
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    InvalidEpisode(#[from] InvalidEpisodeError),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Transport(TransportError::Json(e))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Transport(TransportError::Io(e))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Transport(TransportError::Sqlite(e))
    }
}

impl From<ureq::Error> for StoreError {
    fn from(e: ureq::Error) -> Self {
        StoreError::Transport(e.into())
    }
}
