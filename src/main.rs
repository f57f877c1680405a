// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Workout-Live agent
//!
//! Restores any in-progress session left by a previous run, keeps the remote
//! credential alive, and optionally watches another user's live session.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use workout_live::{
    config::Config,
    db::FirestoreStore,
    models::SessionState,
    services::{ExerciseSource, TokenClient},
    LiveServices,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(
        project = %config.gcp_project_id,
        state_path = %config.session_state_path.display(),
        "Starting Workout-Live"
    );

    let token_client = match &config.auth_refresh_token {
        Some(refresh_token) => TokenClient::with_refresh_token(
            config.auth_token_url.clone(),
            config.auth_client_id.clone(),
            refresh_token.clone(),
        ),
        None => TokenClient::new(config.auth_token_url.clone(), config.auth_client_id.clone()),
    };

    // Initialize Firestore live store
    let store = FirestoreStore::new(&config.gcp_project_id).await?;

    let services = LiveServices::new(config, Arc::new(token_client), Arc::new(store));

    // Pick up a session that a previous process left in progress
    match services.controller.load_on_launch() {
        SessionState::Idle => tracing::info!("No session in progress"),
        state => tracing::info!(
            state = ?state,
            exercises = services.controller.current_exercises().len(),
            "Resumed in-progress session"
        ),
    }

    if !services.keepalive.quick_health_check().await {
        tracing::warn!("Credential not healthy, remote features will retry on demand");
    }

    match std::env::var("SPECTATE_SESSION_ID") {
        Ok(session_id) => spectate(&services, &session_id).await?,
        Err(_) => {
            tracing::info!("SPECTATE_SESSION_ID not set, waiting for shutdown");
            tokio::signal::ctrl_c().await?;
        }
    }

    // Persist whatever is in progress before exiting
    services.controller.on_background()?;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Watch `session_id` and log each snapshot change until Ctrl-C.
async fn spectate(
    services: &LiveServices,
    session_id: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let spectator_id =
        std::env::var("SPECTATOR_ID").unwrap_or_else(|_| uuid::Uuid::new_v4().to_string());

    let spectator = services.spectator();
    spectator.start_spectating(session_id, &spectator_id).await?;

    let mut updates = spectator.subscribe();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshots = updates.borrow_and_update().clone();
                for snapshot in &snapshots {
                    tracing::info!(
                        exercise = %snapshot.exercise_name,
                        muscle_group = %snapshot.muscle_group,
                        sets = snapshot.sets.len(),
                        updated_at = %snapshot.updated_at,
                        "Live exercise"
                    );
                }
                if snapshots.is_empty() {
                    tracing::info!(session_id, "Session has no live exercises");
                }
            }
        }
    }

    spectator.stop_spectating(&spectator_id).await;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("workout_live=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
