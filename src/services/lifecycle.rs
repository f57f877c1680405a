// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session lifecycle controller.
//!
//! Authoritative state machine for "is the user currently doing an activity":
//!
//! ```text
//! Idle ──begin──▶ Active ◀──pause/resume──▶ Paused
//!   ▲                │                        │
//!   └────finalize────┴────────────────────────┘
//! ```
//!
//! The in-memory mirror and the accept-writes gate live behind one mutex, so
//! the gate check and the durable write of an `update` happen as a unit and a
//! concurrent `finalize` either runs before it (update dropped) or after it
//! (record cleared). Durable writes are synchronous: callers include the
//! app-background hook, after which the process may be killed.

use crate::db::SessionStateStore;
use crate::error::{AppError, Result};
use crate::models::{ActiveSession, ExerciseRecord, SessionEvent, SessionState};
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Mirror of the durable record plus the admission gate.
struct Mirror {
    accepting_writes: bool,
    session: Option<ActiveSession>,
}

/// Owns the in-progress session. Construct once per process and share by reference.
pub struct SessionController {
    store: SessionStateStore,
    mirror: Mutex<Mirror>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    /// Create an idle controller. Call [`load_on_launch`](Self::load_on_launch)
    /// to pick up a session persisted by a previous process.
    pub fn new(store: SessionStateStore) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            mirror: Mutex::new(Mirror {
                accepting_writes: false,
                session: None,
            }),
            events,
        }
    }

    fn mirror(&self) -> MutexGuard<'_, Mirror> {
        self.mirror
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Receive lifecycle notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> SessionState {
        match &self.mirror().session {
            None => SessionState::Idle,
            Some(session) if session.paused => SessionState::Paused,
            Some(_) => SessionState::Active,
        }
    }

    pub fn has_active_session(&self) -> bool {
        self.mirror().session.is_some()
    }

    /// Copy of the current session, if any.
    pub fn snapshot(&self) -> Option<ActiveSession> {
        self.mirror().session.clone()
    }

    /// Restore a session persisted by a previous process.
    pub fn load_on_launch(&self) -> SessionState {
        let mut mirror = self.mirror();
        match self.store.load() {
            Some(session) => {
                tracing::info!(
                    activity_kind = %session.activity_kind,
                    paused = session.paused,
                    duration = session.accumulated_duration,
                    "Restored in-progress session"
                );
                let state = if session.paused {
                    SessionState::Paused
                } else {
                    SessionState::Active
                };
                mirror.accepting_writes = true;
                mirror.session = Some(session);
                state
            }
            None => {
                tracing::debug!("No in-progress session to restore");
                mirror.accepting_writes = false;
                mirror.session = None;
                SessionState::Idle
            }
        }
    }

    /// Start a new session. Rejected if one is already in progress.
    pub fn begin(&self, activity_kind: &str, start_time: DateTime<Utc>) -> Result<()> {
        let mut mirror = self.mirror();
        if mirror.session.is_some() {
            tracing::warn!(activity_kind, "Refusing to begin while a session is active");
            return Err(AppError::SessionAlreadyActive);
        }

        let session = ActiveSession::new(activity_kind, start_time);
        self.store.save(&session)?;
        mirror.accepting_writes = true;
        mirror.session = Some(session);

        tracing::info!(activity_kind, start_time = %start_time, "Session started");
        Ok(())
    }

    /// Overwrite the whole session record.
    ///
    /// A no-op once the gate is closed, so a late update from a finalized
    /// session cannot bring it back. Returns once the record is on disk.
    pub fn update(&self, session: ActiveSession) -> Result<()> {
        let mut mirror = self.mirror();
        let Some(previous) = mirror.session.as_ref().filter(|_| mirror.accepting_writes) else {
            tracing::debug!("Dropping update, session is not accepting writes");
            return Ok(());
        };

        let mut next = session;
        next.normalize_against(previous);
        self.store.save(&next)?;
        mirror.session = Some(next);
        Ok(())
    }

    /// Apply `change` to the current record and persist it, under the same
    /// exclusion as [`update`](Self::update).
    pub fn update_with<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut ActiveSession),
    {
        let mut mirror = self.mirror();
        let Some(previous) = mirror.session.as_ref().filter(|_| mirror.accepting_writes) else {
            tracing::debug!("Dropping update, session is not accepting writes");
            return Ok(());
        };

        let mut next = previous.clone();
        change(&mut next);
        next.normalize_against(previous);
        self.store.save(&next)?;
        mirror.session = Some(next);
        Ok(())
    }

    pub fn pause(&self) -> Result<()> {
        self.update_with(|session| session.paused = true)?;
        tracing::info!("Session paused");
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        self.update_with(|session| session.paused = false)?;
        tracing::info!("Session resumed");
        Ok(())
    }

    /// Re-persist the mirror. Called from the app-background hook.
    pub fn on_background(&self) -> Result<()> {
        let mirror = self.mirror();
        match (&mirror.session, mirror.accepting_writes) {
            (Some(session), true) => self.store.save(session),
            _ => Ok(()),
        }
    }

    /// Tear down the session. Valid from any state.
    ///
    /// Order matters: the gate closes before storage is cleared so an update
    /// queued behind this call finds it closed.
    ///
    /// The in-memory session is dropped even when the record cannot be
    /// removed; the error is still returned so the caller can retry the
    /// cleanup, and a `begin` in the meantime overwrites the stale record.
    pub fn finalize(&self) -> Result<()> {
        let (activity_kind, cleared) = {
            let mut mirror = self.mirror();
            mirror.accepting_writes = false;
            let cleared = self.store.clear();
            (mirror.session.take().map(|s| s.activity_kind), cleared)
        };

        match &cleared {
            Ok(()) => tracing::info!(activity_kind = ?activity_kind, "Session finalized"),
            Err(e) => tracing::error!(
                activity_kind = ?activity_kind,
                error = %e,
                "Session finalized but its record could not be removed"
            ),
        }

        match self.events.send(SessionEvent::Finalized { activity_kind }) {
            Ok(receivers) => tracing::debug!(receivers, "Delivered finalized event"),
            Err(_) => tracing::debug!("No listeners for finalized event"),
        }
        cleared
    }
}

/// Supplies the exercises the publisher republishes on each tick.
pub trait ExerciseSource: Send + Sync {
    fn current_exercises(&self) -> Vec<ExerciseRecord>;
}

impl ExerciseSource for SessionController {
    fn current_exercises(&self) -> Vec<ExerciseRecord> {
        self.mirror()
            .session
            .as_ref()
            .and_then(|s| s.exercises.clone())
            .unwrap_or_default()
    }
}
