//! In-memory episode store

use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{
    EpisodeStore, check_key, episode_from_document, frames_from_document,
    placements_from_document,
};
use crate::episode::{Episode, Frame, ObjectPlacement};
use crate::error::{StoreError, TransportError};

/// Documents kept as JSON text, exactly as a persistent store would hold them
#[derive(Default)]
pub struct MemoryEpisodeStore {
    documents: Mutex<BTreeMap<String, String>>,
}

impl MemoryEpisodeStore {
    /// Insert a raw document in any shape (legacy fixtures, imports)
    pub fn insert_raw(&self, key: &str, json: impl Into<String>) {
        if let Ok(mut docs) = self.documents.lock() {
            docs.insert(key.to_string(), json.into());
        }
    }

    fn document(&self, key: &str) -> Result<String, TransportError> {
        let docs = self
            .documents
            .lock()
            .map_err(|_| TransportError::Http("memory store poisoned".to_string()))?;
        docs.get(key)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(key.to_string()))
    }
}

impl EpisodeStore for MemoryEpisodeStore {
    fn list(&self) -> Result<Vec<String>, TransportError> {
        let docs = self
            .documents
            .lock()
            .map_err(|_| TransportError::Http("memory store poisoned".to_string()))?;
        Ok(docs.keys().cloned().collect())
    }

    fn save(&self, key: &str, episode: &Episode) -> Result<(), TransportError> {
        check_key(key)?;
        let json = episode.to_json()?;
        let mut docs = self
            .documents
            .lock()
            .map_err(|_| TransportError::Http("memory store poisoned".to_string()))?;
        if docs.contains_key(key) {
            return Err(TransportError::AlreadyExists(key.to_string()));
        }
        docs.insert(key.to_string(), json);
        Ok(())
    }

    fn load_object_placements(&self, key: &str) -> Result<Vec<ObjectPlacement>, StoreError> {
        placements_from_document(&self.document(key)?)
    }

    fn load_frames(&self, key: &str) -> Result<Vec<Frame>, StoreError> {
        frames_from_document(&self.document(key)?)
    }

    fn load_episode(&self, key: &str) -> Result<Episode, StoreError> {
        episode_from_document(key, &self.document(key)?)
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
