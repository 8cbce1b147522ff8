//! Episode store boundary
//!
//! Episodes are immutable once saved and addressed by a key unique within
//! the store. Loading normalizes whatever document shape the store holds.

mod file;
mod http;
mod memory;
mod sqlite;

pub use file::FileEpisodeStore;
pub use http::HttpEpisodeStore;
pub use memory::MemoryEpisodeStore;
pub use sqlite::SqliteEpisodeStore;

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use crate::episode::{
    DOCUMENT_VERSION, Episode, Frame, ObjectPlacement, frames_from_value, normalize_placements,
};
use crate::error::{StoreError, TransportError};

pub trait EpisodeStore: Send + Sync {
    fn list(&self) -> Result<Vec<String>, TransportError>;
    fn save(&self, key: &str, episode: &Episode) -> Result<(), TransportError>;
    fn load_object_placements(&self, key: &str) -> Result<Vec<ObjectPlacement>, StoreError>;
    fn load_frames(&self, key: &str) -> Result<Vec<Frame>, StoreError>;
    /// Human-readable location, for logs
    fn describe(&self) -> String;

    /// Full episode. Stores that only serve frames and placements leave the
    /// metadata empty.
    fn load_episode(&self, key: &str) -> Result<Episode, StoreError> {
        Ok(Episode {
            version: DOCUMENT_VERSION,
            name: key.to_string(),
            recorded_at: String::new(),
            termination_reason: None,
            object_placements: self.load_object_placements(key)?,
            frames: self.load_frames(key)?,
        })
    }
}

/// Which backend to open, parsed from `file:<dir>`, `sqlite:<path>`,
/// `http:<url>` or `memory`
#[derive(Debug, Clone, PartialEq)]
pub enum StoreKind {
    File(PathBuf),
    Sqlite(PathBuf),
    Http(String),
    Memory,
}

impl StoreKind {
    pub fn from_str(s: &str) -> Option<Self> {
        let s = s.trim();
        if s == "memory" {
            return Some(StoreKind::Memory);
        }
        if s.starts_with("http://") || s.starts_with("https://") {
            return Some(StoreKind::Http(s.to_string()));
        }
        let (kind, rest) = s.split_once(':')?;
        if rest.is_empty() {
            return None;
        }
        match kind {
            "file" => Some(StoreKind::File(PathBuf::from(rest))),
            "sqlite" => Some(StoreKind::Sqlite(PathBuf::from(rest))),
            "http" => Some(StoreKind::Http(rest.to_string())),
            _ => None,
        }
    }

    pub fn open(&self) -> Result<Arc<dyn EpisodeStore>, TransportError> {
        Ok(match self {
            StoreKind::File(dir) => Arc::new(FileEpisodeStore::open(dir)?),
            StoreKind::Sqlite(path) => Arc::new(SqliteEpisodeStore::open(path)?),
            StoreKind::Http(url) => Arc::new(HttpEpisodeStore::new(url)),
            StoreKind::Memory => Arc::new(MemoryEpisodeStore::default()),
        })
    }
}

/// Keys become file names and URL payloads; keep them to one plain segment
pub(crate) fn check_key(key: &str) -> Result<(), TransportError> {
    let bad = key.is_empty()
        || key.contains(['/', '\\'])
        || key.starts_with('.')
        || key.chars().any(char::is_control);
    if bad {
        Err(TransportError::InvalidKey(key.to_string()))
    } else {
        Ok(())
    }
}

pub(crate) fn document_to_value(episode: &Episode) -> Result<Value, TransportError> {
    Ok(serde_json::to_value(episode)?)
}

/// Parse a whole stored document, metadata included
pub(crate) fn episode_from_document(key: &str, text: &str) -> Result<Episode, StoreError> {
    let mut episode = Episode::from_json(text)?;
    if episode.name.is_empty() {
        episode.name = key.to_string();
    }
    Ok(episode)
}

pub(crate) fn frames_from_document(text: &str) -> Result<Vec<Frame>, StoreError> {
    let value: Value = serde_json::from_str(text)?;
    Ok(frames_from_value(&value)?)
}

pub(crate) fn placements_from_document(text: &str) -> Result<Vec<ObjectPlacement>, StoreError> {
    let value: Value = serde_json::from_str(text)?;
    Ok(normalize_placements(&value))
}
