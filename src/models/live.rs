// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Rows shared between a session owner and its spectators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::session::{ExerciseRecord, SetEntry};
use crate::time_utils::rfc3339_millis;

/// Published state of one exercise within a live session.
///
/// Written only by the session owner. Identity is `(session_id, exercise_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionExerciseSnapshot {
    pub session_id: String,
    pub exercise_id: String,
    pub exercise_name: String,
    pub muscle_group: String,
    pub order_index: u32,
    #[serde(default)]
    pub sets: Vec<SetEntry>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Freshness hint for spectators; not used for conflict resolution
    #[serde(with = "rfc3339_millis")]
    pub updated_at: DateTime<Utc>,
}

impl SessionExerciseSnapshot {
    pub fn from_exercise(
        session_id: &str,
        exercise: &ExerciseRecord,
        order_index: u32,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            exercise_id: exercise.exercise_id.clone(),
            exercise_name: exercise.name.clone(),
            muscle_group: exercise.muscle_group.clone(),
            order_index,
            sets: exercise.sets.clone(),
            notes: exercise.notes.clone(),
            updated_at,
        }
    }

    /// True if the published content matches, ignoring `updated_at`.
    pub fn same_content(&self, other: &SessionExerciseSnapshot) -> bool {
        self.exercise_name == other.exercise_name
            && self.muscle_group == other.muscle_group
            && self.order_index == other.order_index
            && self.sets == other.sets
            && self.notes == other.notes
    }
}

/// A spectator's liveness record. One per spectator per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub session_id: String,
    pub spectator_id: String,
    #[serde(with = "rfc3339_millis")]
    pub last_ping_at: DateTime<Utc>,
}

impl PresenceRecord {
    pub fn is_active(&self, now: DateTime<Utc>, timeout: std::time::Duration) -> bool {
        let timeout = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX);
        now - self.last_ping_at < timeout
    }
}

/// Reaction sent from a spectator to the session owner. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheerEvent {
    pub id: String,
    pub session_id: String,
    pub from_user_id: String,
    pub to_user_id: String,
    pub emoji: String,
    #[serde(with = "rfc3339_millis")]
    pub created_at: DateTime<Utc>,
}

impl CheerEvent {
    pub fn new(session_id: &str, from_user_id: &str, to_user_id: &str, emoji: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            from_user_id: from_user_id.to_string(),
            to_user_id: to_user_id.to_string(),
            emoji: emoji.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Signals surfaced to the session owner while spectators watch.
#[derive(Debug, Clone, PartialEq)]
pub enum OwnerEvent {
    SpectatorCount(usize),
    Cheer(CheerEvent),
}
