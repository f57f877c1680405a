// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Workout-Live: crash-safe workout sessions with live spectator sync
//!
//! This crate provides the session lifecycle state machine, the credential
//! keepalive that guards every remote call, and the polling publisher and
//! spectator that share a live session through a remote store.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod time_utils;

use config::Config;
use db::{LiveStore, SessionStateStore};
use services::{CredentialBackend, Keepalive, LivePublisher, SessionController, Spectator};
use std::sync::Arc;

/// Shared application services.
///
/// One controller and one keepalive per process; publishers and spectators
/// are created per live session from these.
pub struct LiveServices {
    pub config: Config,
    pub keepalive: Keepalive,
    pub controller: Arc<SessionController>,
    pub store: Arc<dyn LiveStore>,
}

impl LiveServices {
    pub fn new(
        config: Config,
        backend: Arc<dyn CredentialBackend>,
        store: Arc<dyn LiveStore>,
    ) -> Self {
        let keepalive = Keepalive::new(backend, config.keepalive.clone());
        let controller = Arc::new(SessionController::new(SessionStateStore::new(
            config.session_state_path.clone(),
        )));
        Self {
            config,
            keepalive,
            controller,
            store,
        }
    }

    /// Publisher for a session owned by this user.
    pub fn publisher(&self, session_id: &str) -> LivePublisher {
        LivePublisher::new(
            session_id,
            self.store.clone(),
            self.keepalive.clone(),
            self.config.sync.clone(),
        )
    }

    /// Spectator for watching other users' sessions.
    pub fn spectator(&self) -> Spectator {
        Spectator::new(
            self.store.clone(),
            self.keepalive.clone(),
            self.config.sync.clone(),
        )
    }
}
