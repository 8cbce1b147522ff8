//! SQLite episode store
//!
//! One row per episode holding the JSON document plus a few columns for
//! listing without parsing. Uses WAL mode so a recorder and an inspector can
//! share the file.

use bevy::prelude::*;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;

use super::{
    EpisodeStore, check_key, episode_from_document, frames_from_document,
    placements_from_document,
};
use crate::episode::{Episode, Frame, ObjectPlacement};
use crate::error::{StoreError, TransportError};

pub struct SqliteEpisodeStore {
    conn: Mutex<Connection>,
    label: String,
}

impl SqliteEpisodeStore {
    pub fn open(path: &Path) -> Result<Self, TransportError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        let store = Self {
            conn: Mutex::new(conn),
            label: format!("sqlite:{}", path.display()),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, TransportError> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            label: "sqlite::memory:".to_string(),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), TransportError> {
        self.with_conn(|conn| {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS episodes (
                    key TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    recorded_at TEXT NOT NULL,
                    termination_reason TEXT,
                    frame_count INTEGER NOT NULL,
                    document TEXT NOT NULL,
                    created_at TEXT DEFAULT CURRENT_TIMESTAMP
                );

                CREATE INDEX IF NOT EXISTS idx_episodes_recorded ON episodes(recorded_at);
                "#,
            )?;
            Ok(())
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, TransportError>,
    ) -> Result<T, TransportError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| TransportError::Http("sqlite connection poisoned".to_string()))?;
        f(&conn)
    }

    fn document(&self, key: &str) -> Result<String, TransportError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT document FROM episodes WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .ok_or_else(|| TransportError::NotFound(key.to_string()))
        })
    }

    /// Termination reason per key, for listings
    pub fn summaries(&self) -> Result<Vec<(String, usize, Option<String>)>, TransportError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT key, frame_count, termination_reason FROM episodes ORDER BY key",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)? as usize,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }
}

impl EpisodeStore for SqliteEpisodeStore {
    fn list(&self) -> Result<Vec<String>, TransportError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT key FROM episodes ORDER BY key")?;
            let keys = stmt.query_map([], |row| row.get::<_, String>(0))?;
            Ok(keys.collect::<Result<Vec<_>, _>>()?)
        })
    }

    fn save(&self, key: &str, episode: &Episode) -> Result<(), TransportError> {
        check_key(key)?;
        let document = episode.to_json()?;
        self.with_conn(|conn| {
            let exists: Option<i64> = conn
                .query_row("SELECT 1 FROM episodes WHERE key = ?1", params![key], |row| {
                    row.get(0)
                })
                .optional()?;
            if exists.is_some() {
                return Err(TransportError::AlreadyExists(key.to_string()));
            }
            conn.execute(
                r#"INSERT INTO episodes
                   (key, name, recorded_at, termination_reason, frame_count, document)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
                params![
                    key,
                    episode.name,
                    episode.recorded_at,
                    episode.termination_reason.map(|r| r.as_str()),
                    episode.frames.len() as i64,
                    document,
                ],
            )?;
            Ok(())
        })?;
        info!("Stored episode {} in {}", key, self.label);
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
        self.label.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::episode::StopReason;

    fn episode() -> Episode {
        let frames = (0..4)
            .map(|i| Frame {
                frame_number: i,
                collision: i == 3,
                ..default()
            })
            .collect();
        Episode::new(
            "crash",
            frames,
            vec![ObjectPlacement::new("vase", Vec3::new(2.0, 1.5, -1.0))],
            Some(StopReason::Collision),
        )
    }

    #[test]
    fn test_round_trip_in_memory() {
        let store = SqliteEpisodeStore::open_in_memory().unwrap();
        let original = episode();
        store.save("crash_1.json", &original).unwrap();

        assert_eq!(store.list().unwrap(), vec!["crash_1.json".to_string()]);
        assert_eq!(store.load_episode("crash_1.json").unwrap(), original);
        assert_eq!(
            store.summaries().unwrap(),
            vec![("crash_1.json".to_string(), 4, Some("collision".to_string()))]
        );
        assert!(matches!(
            store.save("crash_1.json", &original),
            Err(TransportError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("episodes.db");
        {
            let store = SqliteEpisodeStore::open(&path).unwrap();
            store.save("a.json", &episode()).unwrap();
        }
        let store = SqliteEpisodeStore::open(&path).unwrap();
        assert_eq!(store.load_frames("a.json").unwrap().len(), 4);
        assert!(matches!(
            store.load_frames("b.json"),
            Err(StoreError::Transport(TransportError::NotFound(_)))
        ));
    }
}
