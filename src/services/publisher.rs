// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Owner side of live sync.
//!
//! Handles:
//! - Publishing exercise snapshots (insert-or-update, driven by a timer)
//! - Retracting removed exercises
//! - Polling spectator count and cheers for the owner
//! - Tearing everything down when the session ends

use crate::config::SyncConfig;
use crate::db::LiveStore;
use crate::error::Result;
use crate::models::{CheerEvent, ExerciseRecord, OwnerEvent, SessionExerciseSnapshot};
use crate::services::keepalive::Keepalive;
use crate::services::lifecycle::ExerciseSource;
use crate::services::poller::{stop_all, PollLoop};
use chrono::Utc;
use futures_util::{stream, StreamExt};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

const OWNER_EVENT_CAPACITY: usize = 64;

/// Max concurrent snapshot writes per publish tick.
const MAX_CONCURRENT_PUBLISHES: usize = 4;

/// What a call to [`LivePublisher::publish`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Inserted,
    Updated,
    /// Row already held identical content.
    Unchanged,
}

/// Publishes one session's exercises and watches its audience.
#[derive(Clone)]
pub struct LivePublisher {
    inner: Arc<PublisherInner>,
}

struct PublisherInner {
    session_id: String,
    store: Arc<dyn LiveStore>,
    keepalive: Keepalive,
    config: SyncConfig,
    loops: tokio::sync::Mutex<Vec<PollLoop>>,
    seen_cheers: Mutex<HashSet<String>>,
    events: broadcast::Sender<OwnerEvent>,
}

impl LivePublisher {
    pub fn new(
        session_id: &str,
        store: Arc<dyn LiveStore>,
        keepalive: Keepalive,
        config: SyncConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(OWNER_EVENT_CAPACITY);
        Self {
            inner: Arc::new(PublisherInner {
                session_id: session_id.to_string(),
                store,
                keepalive,
                config,
                loops: tokio::sync::Mutex::new(Vec::new()),
                seen_cheers: Mutex::new(HashSet::new()),
                events,
            }),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    /// Spectator counts and new cheers.
    pub fn subscribe(&self) -> broadcast::Receiver<OwnerEvent> {
        self.inner.events.subscribe()
    }

    /// Insert or update the snapshot of `exercise`. Safe to repeat.
    pub async fn publish(
        &self,
        exercise: &ExerciseRecord,
        order_index: u32,
    ) -> Result<PublishOutcome> {
        let inner = &self.inner;
        inner
            .keepalive
            .ensure_valid(inner.config.network_leeway)
            .await?;

        let snapshot = SessionExerciseSnapshot::from_exercise(
            &inner.session_id,
            exercise,
            order_index,
            Utc::now(),
        );

        let existing = inner
            .store
            .get_snapshot(&inner.session_id, &exercise.exercise_id)
            .await?;

        let outcome = match existing {
            Some(current) if current.same_content(&snapshot) => PublishOutcome::Unchanged,
            Some(_) => {
                inner.store.update_snapshot(&snapshot).await?;
                PublishOutcome::Updated
            }
            None => {
                inner.store.insert_snapshot(&snapshot).await?;
                PublishOutcome::Inserted
            }
        };

        tracing::debug!(
            session_id = %inner.session_id,
            exercise_id = %exercise.exercise_id,
            sets = exercise.sets.len(),
            outcome = ?outcome,
            "Published exercise"
        );
        Ok(outcome)
    }

    /// Remove one exercise from the live view.
    pub async fn retract(&self, exercise_id: &str) -> Result<()> {
        let inner = &self.inner;
        inner
            .keepalive
            .ensure_valid(inner.config.network_leeway)
            .await?;
        inner
            .store
            .delete_snapshot(&inner.session_id, exercise_id)
            .await?;
        tracing::info!(session_id = %inner.session_id, exercise_id, "Retracted exercise");
        Ok(())
    }

    /// Start the publish loop and the two audience polls.
    ///
    /// Calling again while running restarts the loops.
    pub async fn start_syncing(&self, source: Arc<dyn ExerciseSource>) {
        let mut loops = self.inner.loops.lock().await;
        stop_all(std::mem::take(&mut *loops)).await;

        let publisher = self.clone();
        loops.push(PollLoop::spawn(
            "publish",
            self.inner.config.publish_interval,
            move |token| {
                let publisher = publisher.clone();
                let source = source.clone();
                async move {
                    let exercises = source.current_exercises();
                    stream::iter(exercises.into_iter().enumerate())
                        .map(|(index, exercise)| {
                            let publisher = &publisher;
                            let token = &token;
                            async move {
                                if token.is_cancelled() {
                                    return;
                                }
                                match publisher.publish(&exercise, index as u32).await {
                                    Ok(_) => {}
                                    Err(e) => tracing::warn!(
                                        exercise_id = %exercise.exercise_id,
                                        error = %e,
                                        "Publish failed, retrying next tick"
                                    ),
                                }
                            }
                        })
                        .buffer_unordered(MAX_CONCURRENT_PUBLISHES)
                        .collect::<Vec<()>>()
                        .await;
                }
            },
        ));

        let publisher = self.clone();
        loops.push(PollLoop::spawn(
            "spectator_count",
            self.inner.config.spectator_count_interval,
            move |token| {
                let publisher = publisher.clone();
                async move {
                    if token.is_cancelled() {
                        return;
                    }
                    match publisher.refresh_spectator_count().await {
                        Ok(_) => {}
                        Err(e) => tracing::debug!(error = %e, "Spectator count refresh failed"),
                    }
                }
            },
        ));

        let publisher = self.clone();
        loops.push(PollLoop::spawn(
            "cheers",
            self.inner.config.cheer_poll_interval,
            move |token| {
                let publisher = publisher.clone();
                async move {
                    if token.is_cancelled() {
                        return;
                    }
                    match publisher.poll_cheers().await {
                        Ok(_) => {}
                        Err(e) => tracing::debug!(error = %e, "Cheer poll failed"),
                    }
                }
            },
        ));

        tracing::info!(session_id = %self.inner.session_id, "Live sync started");
    }

    /// Count spectators whose presence is fresh and notify observers.
    pub async fn refresh_spectator_count(&self) -> Result<usize> {
        let inner = &self.inner;
        inner
            .keepalive
            .ensure_valid(inner.config.network_leeway)
            .await?;

        let now = Utc::now();
        let count = inner
            .store
            .list_presence(&inner.session_id)
            .await?
            .iter()
            .filter(|p| p.is_active(now, inner.config.presence_timeout))
            .count();

        match inner.events.send(OwnerEvent::SpectatorCount(count)) {
            Ok(_) => {}
            Err(_) => tracing::debug!(count, "No listeners for spectator count"),
        }
        Ok(count)
    }

    /// Fetch recent cheers and surface the ones not seen before, oldest first.
    pub async fn poll_cheers(&self) -> Result<Vec<CheerEvent>> {
        let inner = &self.inner;
        inner
            .keepalive
            .ensure_valid(inner.config.network_leeway)
            .await?;

        let recent = inner
            .store
            .recent_cheers(&inner.session_id, inner.config.recent_cheer_limit)
            .await?;

        let fresh: Vec<CheerEvent> = {
            let mut seen = inner
                .seen_cheers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            recent
                .into_iter()
                .rev()
                .filter(|cheer| seen.insert(cheer.id.clone()))
                .collect()
        };

        for cheer in &fresh {
            tracing::debug!(from = %cheer.from_user_id, emoji = %cheer.emoji, "New cheer");
            match inner.events.send(OwnerEvent::Cheer(cheer.clone())) {
                Ok(_) => {}
                Err(_) => tracing::debug!(cheer_id = %cheer.id, "No listeners for cheer"),
            }
        }
        Ok(fresh)
    }

    /// Stop all loops, then delete every published row of the session.
    ///
    /// The loops are fully stopped before the delete is issued, so no late
    /// tick can republish afterwards.
    pub async fn teardown(&self) -> Result<()> {
        let loops = std::mem::take(&mut *self.inner.loops.lock().await);
        stop_all(loops).await;

        let inner = &self.inner;
        inner
            .keepalive
            .ensure_valid(inner.config.network_leeway)
            .await?;
        let removed = inner
            .store
            .delete_session_snapshots(&inner.session_id)
            .await?;

        tracing::info!(session_id = %inner.session_id, removed, "Live session torn down");
        Ok(())
    }

    /// True while the sync loops are running.
    pub async fn is_syncing(&self) -> bool {
        self.inner
            .loops
            .lock()
            .await
            .iter()
            .any(PollLoop::is_running)
    }
}
