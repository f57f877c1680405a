// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process live-sync store.
//!
//! Rows are kept as raw JSON, like documents in the remote store, so decoding
//! and malformed-row handling follow the same path as the Firestore backend.
//! Used for tests and for running without a remote backend.

use crate::db::{scoped_doc_id, LiveStore};
use crate::error::{AppError, Result};
use crate::models::{CheerEvent, PresenceRecord, SessionExerciseSnapshot};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Per-operation call counters.
#[derive(Debug, Default)]
pub struct StoreCalls {
    pub inserts: AtomicU64,
    pub updates: AtomicU64,
    pub deletes: AtomicU64,
    pub reads: AtomicU64,
}

/// In-memory implementation of [`LiveStore`].
#[derive(Default)]
pub struct MemoryStore {
    snapshots: DashMap<String, Value>,
    presence: DashMap<String, Value>,
    cheers: DashMap<String, Value>,
    offline: AtomicBool,
    pub calls: StoreCalls,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail as if the network were down.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of snapshot rows currently stored, across all sessions.
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }

    /// Store a raw row under the given snapshot key (for corruption tests).
    pub fn insert_raw_snapshot(&self, session_id: &str, exercise_id: &str, row: Value) {
        self.snapshots
            .insert(scoped_doc_id(session_id, exercise_id), row);
    }

    /// Total number of remote calls of any kind.
    pub fn total_calls(&self) -> u64 {
        self.calls.inserts.load(Ordering::SeqCst)
            + self.calls.updates.load(Ordering::SeqCst)
            + self.calls.deletes.load(Ordering::SeqCst)
            + self.calls.reads.load(Ordering::SeqCst)
    }

    fn check_online(&self, counter: &AtomicU64) -> Result<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(AppError::Store("Store unreachable (offline)".to_string()));
        }
        Ok(())
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Row encode failed: {}", e)))
}

fn decode_or_skip<T: DeserializeOwned>(key: &str, row: &Value) -> Option<T> {
    match serde_json::from_value(row.clone()) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, error = %e, "Skipping malformed row");
            None
        }
    }
}

fn in_session(row: &Value, session_id: &str) -> bool {
    row.get("session_id").and_then(Value::as_str) == Some(session_id)
}

#[async_trait]
impl LiveStore for MemoryStore {
    async fn get_snapshot(
        &self,
        session_id: &str,
        exercise_id: &str,
    ) -> Result<Option<SessionExerciseSnapshot>> {
        self.check_online(&self.calls.reads)?;
        let key = scoped_doc_id(session_id, exercise_id);
        Ok(self
            .snapshots
            .get(&key)
            .and_then(|row| decode_or_skip(&key, row.value())))
    }

    async fn insert_snapshot(&self, snapshot: &SessionExerciseSnapshot) -> Result<()> {
        self.check_online(&self.calls.inserts)?;
        let key = scoped_doc_id(&snapshot.session_id, &snapshot.exercise_id);
        let row = encode(snapshot)?;
        match self.snapshots.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(entry) => Err(AppError::Store(format!(
                "Document already exists: {}",
                entry.key()
            ))),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(row);
                Ok(())
            }
        }
    }

    async fn update_snapshot(&self, snapshot: &SessionExerciseSnapshot) -> Result<()> {
        self.check_online(&self.calls.updates)?;
        let key = scoped_doc_id(&snapshot.session_id, &snapshot.exercise_id);
        self.snapshots.insert(key, encode(snapshot)?);
        Ok(())
    }

    async fn delete_snapshot(&self, session_id: &str, exercise_id: &str) -> Result<()> {
        self.check_online(&self.calls.deletes)?;
        self.snapshots
            .remove(&scoped_doc_id(session_id, exercise_id));
        Ok(())
    }

    async fn delete_session_snapshots(&self, session_id: &str) -> Result<usize> {
        self.check_online(&self.calls.deletes)?;
        let before = self.snapshots.len();
        self.snapshots.retain(|_, row| !in_session(row, session_id));
        Ok(before - self.snapshots.len())
    }

    async fn list_snapshots(&self, session_id: &str) -> Result<Vec<SessionExerciseSnapshot>> {
        self.check_online(&self.calls.reads)?;
        let mut snapshots: Vec<SessionExerciseSnapshot> = self
            .snapshots
            .iter()
            .filter(|entry| in_session(entry.value(), session_id))
            .filter_map(|entry| decode_or_skip(entry.key(), entry.value()))
            .collect();
        snapshots.sort_by_key(|s| s.order_index);
        Ok(snapshots)
    }

    async fn upsert_presence(&self, presence: &PresenceRecord) -> Result<()> {
        self.check_online(&self.calls.updates)?;
        let key = scoped_doc_id(&presence.session_id, &presence.spectator_id);
        self.presence.insert(key, encode(presence)?);
        Ok(())
    }

    async fn delete_presence(&self, session_id: &str, spectator_id: &str) -> Result<()> {
        self.check_online(&self.calls.deletes)?;
        self.presence
            .remove(&scoped_doc_id(session_id, spectator_id));
        Ok(())
    }

    async fn list_presence(&self, session_id: &str) -> Result<Vec<PresenceRecord>> {
        self.check_online(&self.calls.reads)?;
        Ok(self
            .presence
            .iter()
            .filter(|entry| in_session(entry.value(), session_id))
            .filter_map(|entry| decode_or_skip(entry.key(), entry.value()))
            .collect())
    }

    async fn insert_cheer(&self, cheer: &CheerEvent) -> Result<()> {
        self.check_online(&self.calls.inserts)?;
        self.cheers
            .insert(scoped_doc_id(&cheer.session_id, &cheer.id), encode(cheer)?);
        Ok(())
    }

    async fn recent_cheers(&self, session_id: &str, limit: u32) -> Result<Vec<CheerEvent>> {
        self.check_online(&self.calls.reads)?;
        let mut cheers: Vec<CheerEvent> = self
            .cheers
            .iter()
            .filter(|entry| in_session(entry.value(), session_id))
            .filter_map(|entry| decode_or_skip(entry.key(), entry.value()))
            .collect();
        cheers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        cheers.truncate(limit as usize);
        Ok(cheers)
    }
}
