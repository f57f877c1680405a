// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-progress workout session, persisted locally while it runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The single in-progress activity on this device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveSession {
    /// Activity tag ("gym", "run", ...)
    pub activity_kind: String,
    /// When the session began; never changes afterwards
    pub start_time: DateTime<Utc>,
    pub paused: bool,
    /// Elapsed active time in seconds
    pub accumulated_duration: u64,
    /// Distance covered, in meters
    pub accumulated_distance: f64,
    #[serde(default)]
    pub route_points: Vec<RoutePoint>,
    #[serde(default)]
    pub splits: Vec<Split>,
    /// Present only for strength sessions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exercises: Option<Vec<ExerciseRecord>>,
}

impl ActiveSession {
    pub fn new(activity_kind: &str, start_time: DateTime<Utc>) -> Self {
        Self {
            activity_kind: activity_kind.to_string(),
            start_time,
            paused: false,
            accumulated_duration: 0,
            accumulated_distance: 0.0,
            route_points: Vec::new(),
            splits: Vec::new(),
            exercises: None,
        }
    }

    /// Bring a replacement record in line with the one it overwrites.
    ///
    /// `start_time` is immutable, accumulated values never go backwards and
    /// the route is append-only, so a stale writer cannot undo progress.
    pub fn normalize_against(&mut self, previous: &ActiveSession) {
        self.start_time = previous.start_time;

        if self.accumulated_duration < previous.accumulated_duration {
            tracing::warn!(
                incoming = self.accumulated_duration,
                stored = previous.accumulated_duration,
                "Ignoring decrease in accumulated duration"
            );
            self.accumulated_duration = previous.accumulated_duration;
        }

        if self.accumulated_distance < previous.accumulated_distance {
            tracing::warn!(
                incoming = self.accumulated_distance,
                stored = previous.accumulated_distance,
                "Ignoring decrease in accumulated distance"
            );
            self.accumulated_distance = previous.accumulated_distance;
        }

        if self.route_points.len() < previous.route_points.len() {
            tracing::warn!(
                incoming = self.route_points.len(),
                stored = previous.route_points.len(),
                "Ignoring truncated route"
            );
            self.route_points = previous.route_points.clone();
        }
    }
}

/// A recorded GPS fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePoint {
    pub lat: f64,
    pub lon: f64,
    pub timestamp: DateTime<Utc>,
}

/// A completed interval (e.g. one kilometer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub index: u32,
    pub duration_secs: u64,
    pub distance: f64,
}

/// One exercise of a strength session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseRecord {
    pub exercise_id: String,
    pub name: String,
    pub muscle_group: String,
    #[serde(default)]
    pub sets: Vec<SetEntry>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Reps and weight of a single set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetEntry {
    pub reps: u32,
    pub weight: f64,
}

/// Lifecycle state as seen from outside the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
    Paused,
}

/// Notifications emitted by the lifecycle controller.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The session was torn down; `activity_kind` is `None` if nothing was running.
    Finalized { activity_kind: Option<String> },
}
