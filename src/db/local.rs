// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Durable on-device slot holding the in-progress session.
//!
//! Writes are synchronous and complete (flushed and renamed into place)
//! before returning, because callers include app-background hooks after which
//! the process may be killed without further notice.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::ActiveSession;

/// Current version of the state file format.
const STATE_FILE_VERSION: u32 = 1;

/// On-disk record format.
#[derive(Debug, Serialize, Deserialize)]
struct StoredSlot {
    version: u32,
    has_active_session: bool,
    session: Option<ActiveSession>,
}

/// File-backed session state store. The lifecycle controller is its only writer.
#[derive(Debug, Clone)]
pub struct SessionStateStore {
    path: PathBuf,
}

impl SessionStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored session.
    ///
    /// A missing, undecodable or inconsistent record reads as `None`; corrupt
    /// files are removed so they cannot fail the next launch either.
    pub fn load(&self) -> Option<ActiveSession> {
        let content = match fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read session record");
                return None;
            }
        };

        match serde_json::from_slice::<StoredSlot>(&content) {
            Ok(StoredSlot {
                has_active_session: true,
                session: Some(session),
                ..
            }) => Some(session),
            Ok(StoredSlot {
                has_active_session: false,
                session: None,
                ..
            }) => None,
            Ok(_) => {
                tracing::warn!(path = %self.path.display(), "Inconsistent session record, discarding");
                self.discard();
                None
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Corrupt session record, discarding");
                self.discard();
                None
            }
        }
    }

    /// Persist `session`, replacing whatever was stored.
    pub fn save(&self, session: &ActiveSession) -> Result<()> {
        let slot = StoredSlot {
            version: STATE_FILE_VERSION,
            has_active_session: true,
            session: Some(session.clone()),
        };
        let content = serde_json::to_vec(&slot)
            .map_err(|e| anyhow::anyhow!("Failed to encode session record: {}", e))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write-then-rename so a crash mid-write leaves the previous record intact.
        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(&content)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Remove the stored session.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// True if a record file exists, decodable or not.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    fn discard(&self) {
        match self.clear() {
            Ok(()) => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove session record");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExerciseRecord, RoutePoint, SetEntry, Split};
    use chrono::Utc;

    fn store_in(dir: &tempfile::TempDir) -> SessionStateStore {
        SessionStateStore::new(dir.path().join("state").join("session.json"))
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(store_in(&dir).load().is_none());
    }

    #[test]
    fn test_save_and_load_preserves_sequences() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let now = Utc::now();
        let mut session = ActiveSession::new("gym", now);
        session.accumulated_duration = 1234;
        session.accumulated_distance = 42.5;
        session.route_points = vec![
            RoutePoint { lat: 37.1, lon: -122.2, timestamp: now },
            RoutePoint { lat: 37.2, lon: -122.3, timestamp: now },
        ];
        session.splits = vec![Split { index: 0, duration_secs: 300, distance: 1000.0 }];
        session.exercises = Some(vec![ExerciseRecord {
            exercise_id: "row".to_string(),
            name: "Barbell Row".to_string(),
            muscle_group: "back".to_string(),
            sets: vec![SetEntry { reps: 10, weight: 50.0 }],
            notes: Some("slow eccentric".to_string()),
        }]);

        store.save(&session).unwrap();
        assert_eq!(store.load(), Some(session));
    }

    #[test]
    fn test_corrupt_file_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), b"{ not json").unwrap();

        assert!(store.load().is_none());
        assert!(!store.exists());
    }

    #[test]
    fn test_flag_without_session_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(
            store.path(),
            br#"{"version":1,"has_active_session":true,"session":null}"#,
        )
        .unwrap();

        assert!(store.load().is_none());
        assert!(!store.exists());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&ActiveSession::new("run", Utc::now())).unwrap();
        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.load().is_none());
    }
}
