// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Spectator side of live sync.
//!
//! A spectator polls the owner's published snapshots, keeps its own presence
//! record fresh so the owner can count viewers, and sends cheers. Nothing here
//! writes to rows owned by the session owner.

use crate::config::SyncConfig;
use crate::db::LiveStore;
use crate::error::{AppError, Result};
use crate::models::{CheerEvent, PresenceRecord, SessionExerciseSnapshot};
use crate::services::keepalive::Keepalive;
use crate::services::poller::{stop_all, PollLoop};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

/// The session currently being watched.
struct Watching {
    session_id: String,
    spectator_id: String,
    loops: Vec<PollLoop>,
}

/// Watches one live session at a time.
#[derive(Clone)]
pub struct Spectator {
    inner: Arc<SpectatorInner>,
}

struct SpectatorInner {
    store: Arc<dyn LiveStore>,
    keepalive: Keepalive,
    config: SyncConfig,
    watching: Mutex<Option<Watching>>,
    snapshots: watch::Sender<Vec<SessionExerciseSnapshot>>,
}

impl Spectator {
    pub fn new(store: Arc<dyn LiveStore>, keepalive: Keepalive, config: SyncConfig) -> Self {
        let (snapshots, _) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(SpectatorInner {
                store,
                keepalive,
                config,
                watching: Mutex::new(None),
                snapshots,
            }),
        }
    }

    /// Latest snapshots of the watched session, ordered by `order_index`.
    pub fn subscribe(&self) -> watch::Receiver<Vec<SessionExerciseSnapshot>> {
        self.inner.snapshots.subscribe()
    }

    /// Session currently being watched, if any.
    pub async fn watching(&self) -> Option<String> {
        self.inner
            .watching
            .lock()
            .await
            .as_ref()
            .map(|w| w.session_id.clone())
    }

    /// Register presence and start the snapshot and presence loops.
    ///
    /// Watching a different session first stops the current one.
    pub async fn start_spectating(&self, session_id: &str, spectator_id: &str) -> Result<()> {
        let mut watching = self.inner.watching.lock().await;
        if let Some(previous) = watching.take() {
            self.wind_down(previous).await;
        }

        // Only a missing or rejected credential stops us here; anything else
        // is retried by the presence loop.
        match self.ping_presence(session_id, spectator_id).await {
            Ok(()) => {}
            Err(e) if e.is_fatal_auth() || matches!(e, AppError::KeepaliveExhausted { .. }) => {
                return Err(e);
            }
            Err(e) => tracing::warn!(
                session_id,
                error = %e,
                "Initial presence ping failed, retrying on next tick"
            ),
        }
        self.inner.snapshots.send_replace(Vec::new());

        let spectator = self.clone();
        let poll_session = session_id.to_string();
        let snapshot_loop = PollLoop::spawn(
            "exercise_poll",
            self.inner.config.exercise_poll_interval,
            move |token| {
                let spectator = spectator.clone();
                let session_id = poll_session.clone();
                async move {
                    if token.is_cancelled() {
                        return;
                    }
                    match spectator.poll_once(&session_id).await {
                        Ok(snapshots) if !token.is_cancelled() => {
                            spectator.inner.snapshots.send_replace(snapshots);
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!(
                            session_id = %session_id,
                            error = %e,
                            "Snapshot poll failed, retrying next tick"
                        ),
                    }
                }
            },
        );

        let spectator = self.clone();
        let ping_session = session_id.to_string();
        let ping_spectator = spectator_id.to_string();
        let presence_period = self.inner.config.presence_ping_interval;
        let presence_loop = PollLoop::spawn("presence_ping", presence_period, move |token| {
            let spectator = spectator.clone();
            let session_id = ping_session.clone();
            let spectator_id = ping_spectator.clone();
            async move {
                if token.is_cancelled() {
                    return;
                }
                match spectator.ping_presence(&session_id, &spectator_id).await {
                    Ok(()) => {}
                    Err(e) => tracing::warn!(error = %e, "Presence ping failed"),
                }
            }
        });

        tracing::info!(session_id, spectator_id, "Started spectating");
        *watching = Some(Watching {
            session_id: session_id.to_string(),
            spectator_id: spectator_id.to_string(),
            loops: vec![snapshot_loop, presence_loop],
        });
        Ok(())
    }

    /// Stop both loops, then best-effort remove the presence record.
    ///
    /// Returns once the loops have ended; no further poll is issued after.
    pub async fn stop_spectating(&self, spectator_id: &str) {
        let mut watching = self.inner.watching.lock().await;
        match watching.take() {
            Some(current) if current.spectator_id == spectator_id => {
                self.wind_down(current).await;
            }
            Some(other) => {
                tracing::warn!(
                    spectator_id,
                    watching_as = %other.spectator_id,
                    "Stop requested for a different spectator, ignoring"
                );
                *watching = Some(other);
            }
            None => tracing::debug!(spectator_id, "Not spectating"),
        }
    }

    async fn wind_down(&self, watching: Watching) {
        stop_all(watching.loops).await;

        // Presence that fails to delete ages out through the presence timeout.
        match self
            .remove_presence(&watching.session_id, &watching.spectator_id)
            .await
        {
            Ok(()) => {}
            Err(e) => tracing::warn!(
                session_id = %watching.session_id,
                error = %e,
                "Failed to delete presence record"
            ),
        }

        tracing::info!(
            session_id = %watching.session_id,
            spectator_id = %watching.spectator_id,
            "Stopped spectating"
        );
    }

    /// One fetch of a session's snapshots. An ended session yields an empty list.
    pub async fn poll_once(&self, session_id: &str) -> Result<Vec<SessionExerciseSnapshot>> {
        self.inner
            .keepalive
            .ensure_valid(self.inner.config.network_leeway)
            .await?;
        self.inner.store.list_snapshots(session_id).await
    }

    async fn remove_presence(&self, session_id: &str, spectator_id: &str) -> Result<()> {
        self.inner
            .keepalive
            .ensure_valid(self.inner.config.network_leeway)
            .await?;
        self.inner
            .store
            .delete_presence(session_id, spectator_id)
            .await
    }

    async fn ping_presence(&self, session_id: &str, spectator_id: &str) -> Result<()> {
        self.inner
            .keepalive
            .ensure_valid(self.inner.config.network_leeway)
            .await?;
        let presence = PresenceRecord {
            session_id: session_id.to_string(),
            spectator_id: spectator_id.to_string(),
            last_ping_at: Utc::now(),
        };
        self.inner.store.upsert_presence(&presence).await
    }

    /// Send a cheer to the session owner. Fire-and-forget: failures are logged.
    pub async fn send_cheer(
        &self,
        session_id: &str,
        from_user_id: &str,
        to_user_id: &str,
        emoji: &str,
    ) {
        let cheer = CheerEvent::new(session_id, from_user_id, to_user_id, emoji);

        let result = match self
            .inner
            .keepalive
            .ensure_valid(self.inner.config.network_leeway)
            .await
        {
            Ok(()) => self.inner.store.insert_cheer(&cheer).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => tracing::debug!(session_id, emoji, "Cheer sent"),
            Err(e) => tracing::warn!(session_id, error = %e, "Cheer not delivered"),
        }
    }
}
