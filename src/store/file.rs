//! Directory of JSON episode documents

use bevy::prelude::*;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{
    EpisodeStore, check_key, episode_from_document, frames_from_document,
    placements_from_document,
};
use crate::episode::{Episode, Frame, ObjectPlacement};
use crate::error::{StoreError, TransportError};

pub struct FileEpisodeStore {
    dir: PathBuf,
}

impl FileEpisodeStore {
    /// Open a directory store, creating the directory if needed
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, TransportError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, TransportError> {
        check_key(key)?;
        Ok(self.dir.join(key))
    }

    fn read(&self, key: &str) -> Result<String, TransportError> {
        let path = self.path_for(key)?;
        fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => TransportError::NotFound(key.to_string()),
            _ => TransportError::Io(e),
        })
    }
}

impl EpisodeStore for FileEpisodeStore {
    fn list(&self) -> Result<Vec<String>, TransportError> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    keys.push(name.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn save(&self, key: &str, episode: &Episode) -> Result<(), TransportError> {
        let path = self.path_for(key)?;
        let json = episode.to_json()?;

        // create_new keeps saved episodes immutable
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => TransportError::AlreadyExists(key.to_string()),
                _ => TransportError::Io(e),
            })?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        info!("Wrote episode {}", path.display());
        Ok(())
    }

    fn load_object_placements(&self, key: &str) -> Result<Vec<ObjectPlacement>, StoreError> {
        placements_from_document(&self.read(key)?)
    }

    fn load_frames(&self, key: &str) -> Result<Vec<Frame>, StoreError> {
        frames_from_document(&self.read(key)?)
    }

    fn load_episode(&self, key: &str) -> Result<Episode, StoreError> {
        episode_from_document(key, &self.read(key)?)
    }

    fn describe(&self) -> String {
        format!("file:{}", self.dir.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::episode::StopReason;

    fn episode(frames: u64) -> Episode {
        let frames = (0..frames)
            .map(|i| Frame {
                frame_number: i,
                time_remaining: 350.0 - i as f32,
                ..default()
            })
            .collect();
        Episode::new("run", frames, Vec::new(), Some(StopReason::TimeExpired))
    }

    #[test]
    fn test_round_trip_through_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEpisodeStore::open(dir.path().join("replays")).unwrap();
        let original = episode(5);
        store.save("run_1.json", &original).unwrap();

        assert_eq!(store.list().unwrap(), vec!["run_1.json".to_string()]);
        assert_eq!(store.load_frames("run_1.json").unwrap(), original.frames);
        let loaded = store.load_episode("run_1.json").unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_existing_file_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileEpisodeStore::open(dir.path()).unwrap();
        store.save("a.json", &episode(2)).unwrap();
        assert!(matches!(
            store.save("a.json", &episode(3)),
            Err(TransportError::AlreadyExists(_))
        ));
        assert_eq!(store.load_frames("a.json").unwrap().len(), 2);
    }

    #[test]
    fn test_list_ignores_other_files_and_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        let store = FileEpisodeStore::open(dir.path()).unwrap();
        assert!(store.list().unwrap().is_empty());
        assert!(matches!(
            store.load_frames("missing.json"),
            Err(StoreError::Transport(TransportError::NotFound(_)))
        ));
        assert!(matches!(
            store.save("../escape.json", &episode(1)),
            Err(TransportError::InvalidKey(_))
        ));
    }
}
