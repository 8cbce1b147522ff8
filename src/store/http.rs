//! Training backend episode store (HTTP)
//!
//! - `GET  /list_replays`                    -> `{"replays": [...]}`
//! - `POST /save_replay {filename, data}`
//! - `POST /get_replay_objects {filename}`   -> placements in any known shape
//! - `POST /load_replay {filename}`          -> episode document

use bevy::prelude::*;
use serde_json::{Value, json};
use std::time::Duration;

use super::{EpisodeStore, check_key, document_to_value};
use crate::episode::{Episode, Frame, ObjectPlacement, frames_from_value, normalize_placements};
use crate::error::{StoreError, TransportError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub struct HttpEpisodeStore {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpEpisodeStore {
    pub fn new(base_url: &str) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .build()
            .into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn post(&self, path: &str, key: &str, body: Value) -> Result<Value, TransportError> {
        let mut response = self
            .agent
            .post(&self.url(path))
            .send_json(&body)
            .map_err(|e| not_found_as(e, key))?;
        Ok(response.body_mut().read_json::<Value>()?)
    }
}

/// 404 from the backend means the key does not exist
fn not_found_as(e: ureq::Error, key: &str) -> TransportError {
    match e {
        ureq::Error::StatusCode(404) => TransportError::NotFound(key.to_string()),
        other => other.into(),
    }
}

impl EpisodeStore for HttpEpisodeStore {
    fn list(&self) -> Result<Vec<String>, TransportError> {
        let mut response = self.agent.get(&self.url("list_replays")).call()?;
        let body: Value = response.body_mut().read_json()?;
        let replays = body
            .get("replays")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(replays)
    }

    fn save(&self, key: &str, episode: &Episode) -> Result<(), TransportError> {
        check_key(key)?;
        let data = document_to_value(episode)?;
        let response = self.post("save_replay", key, json!({ "filename": key, "data": data }))?;
        debug!("save_replay response: {}", response);
        Ok(())
    }

    fn load_object_placements(&self, key: &str) -> Result<Vec<ObjectPlacement>, StoreError> {
        let body = self.post("get_replay_objects", key, json!({ "filename": key }))?;
        Ok(normalize_placements(&body))
    }

    fn load_frames(&self, key: &str) -> Result<Vec<Frame>, StoreError> {
        let body = self.post("load_replay", key, json!({ "filename": key }))?;
        Ok(frames_from_value(&body)?)
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let store = HttpEpisodeStore::new("http://localhost:5001/");
        assert_eq!(store.url("list_replays"), "http://localhost:5001/list_replays");
        assert_eq!(store.describe(), "http://localhost:5001");
    }

    #[test]
    fn test_unreachable_backend_is_transport_error() {
        let store = HttpEpisodeStore::new("http://127.0.0.1:9");
        assert!(store.list().is_err());
        assert!(matches!(
            store.load_frames("x.json"),
            Err(StoreError::Transport(_))
        ));
    }
}
