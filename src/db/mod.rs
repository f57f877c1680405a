// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Storage layer: the shared live-sync store and the local session record.

pub mod firestore;
pub mod local;
pub mod memory;

pub use firestore::FirestoreStore;
pub use local::SessionStateStore;
pub use memory::MemoryStore;

use crate::error::Result;
use crate::models::{CheerEvent, PresenceRecord, SessionExerciseSnapshot};
use async_trait::async_trait;

/// Collection names as constants.
pub mod collections {
    pub const SESSION_EXERCISES: &str = "live_session_exercises";
    pub const PRESENCE: &str = "live_session_spectators";
    pub const CHEERS: &str = "live_session_cheers";
}

/// Document ID for a row scoped to a session.
pub fn scoped_doc_id(session_id: &str, id: &str) -> String {
    format!(
        "{}_{}",
        urlencoding::encode(session_id),
        urlencoding::encode(id)
    )
}

/// Remote store shared by a session owner and its spectators.
///
/// Only equality filters and ordering are assumed. Rows that fail to decode
/// are skipped by implementations, never returned as errors.
#[async_trait]
pub trait LiveStore: Send + Sync {
    // ─── Exercise snapshots ──────────────────────────────────────

    async fn get_snapshot(
        &self,
        session_id: &str,
        exercise_id: &str,
    ) -> Result<Option<SessionExerciseSnapshot>>;

    async fn insert_snapshot(&self, snapshot: &SessionExerciseSnapshot) -> Result<()>;

    async fn update_snapshot(&self, snapshot: &SessionExerciseSnapshot) -> Result<()>;

    async fn delete_snapshot(&self, session_id: &str, exercise_id: &str) -> Result<()>;

    /// Delete every snapshot of a session, returning how many were removed.
    async fn delete_session_snapshots(&self, session_id: &str) -> Result<usize>;

    /// All snapshots of a session, ordered by `order_index`.
    async fn list_snapshots(&self, session_id: &str) -> Result<Vec<SessionExerciseSnapshot>>;

    // ─── Presence ────────────────────────────────────────────────

    async fn upsert_presence(&self, presence: &PresenceRecord) -> Result<()>;

    async fn delete_presence(&self, session_id: &str, spectator_id: &str) -> Result<()>;

    async fn list_presence(&self, session_id: &str) -> Result<Vec<PresenceRecord>>;

    // ─── Cheers ──────────────────────────────────────────────────

    async fn insert_cheer(&self, cheer: &CheerEvent) -> Result<()>;

    /// Most recent cheers of a session, newest first.
    async fn recent_cheers(&self, session_id: &str, limit: u32) -> Result<Vec<CheerEvent>>;
}
