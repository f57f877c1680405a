// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use workout_live::config::{KeepaliveConfig, SyncConfig};
use workout_live::db::{FirestoreStore, MemoryStore, SessionStateStore};
use workout_live::error::{AppError, Result};
use workout_live::models::{Credential, ExerciseRecord, SetEntry};
use workout_live::services::{CredentialBackend, Keepalive, SessionController};

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a Firestore store against the emulator.
#[allow(dead_code)]
pub async fn test_firestore() -> FirestoreStore {
    FirestoreStore::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// How [`ScriptedBackend::refresh`] behaves.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy)]
pub enum RefreshMode {
    Succeed,
    Transient,
    Fatal,
    /// Fail transiently this many times, then succeed.
    FailTimes(u32),
}

/// Credential backend double with scripted refresh behaviour.
pub struct ScriptedBackend {
    access_token: Mutex<String>,
    expires_at: Mutex<Option<DateTime<Utc>>>,
    mode: Mutex<RefreshMode>,
    refresh_delay: Mutex<Duration>,
    pub refresh_calls: AtomicU32,
    pub attempt_times: Mutex<Vec<Instant>>,
}

#[allow(dead_code)]
impl ScriptedBackend {
    /// Signed in with a credential valid for `ttl`.
    pub fn valid_for(ttl: ChronoDuration) -> Arc<Self> {
        Arc::new(Self {
            access_token: Mutex::new("initial-token".to_string()),
            expires_at: Mutex::new(Some(Utc::now() + ttl)),
            mode: Mutex::new(RefreshMode::Succeed),
            refresh_delay: Mutex::new(Duration::ZERO),
            refresh_calls: AtomicU32::new(0),
            attempt_times: Mutex::new(Vec::new()),
        })
    }

    /// Signed in, but the credential is about to expire.
    pub fn expiring() -> Arc<Self> {
        Self::valid_for(ChronoDuration::seconds(5))
    }

    pub fn signed_out() -> Arc<Self> {
        let backend = Self::expiring();
        *backend.expires_at.lock().unwrap() = None;
        backend
    }

    pub fn set_mode(&self, mode: RefreshMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock().unwrap() = delay;
    }

    pub fn refreshes(&self) -> u32 {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Gaps between consecutive refresh attempts.
    pub fn attempt_gaps(&self) -> Vec<Duration> {
        self.attempt_times
            .lock()
            .unwrap()
            .windows(2)
            .map(|w| w[1] - w[0])
            .collect()
    }
}

#[async_trait]
impl CredentialBackend for ScriptedBackend {
    async fn current(&self) -> Result<Option<Credential>> {
        let access_token = self.access_token.lock().unwrap().clone();
        Ok(self
            .expires_at
            .lock()
            .unwrap()
            .map(|expires_at| Credential {
                access_token,
                expires_at,
            }))
    }

    async fn refresh(&self) -> Result<Credential> {
        let call = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.attempt_times.lock().unwrap().push(Instant::now());

        let delay = *self.refresh_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mode = *self.mode.lock().unwrap();
        match mode {
            RefreshMode::Transient => Err(AppError::Transient("503 from token endpoint".into())),
            RefreshMode::Fatal => Err(AppError::Unauthenticated("invalid_grant".into())),
            RefreshMode::FailTimes(n) if call <= n => {
                Err(AppError::Transient("connection reset".into()))
            }
            RefreshMode::Succeed | RefreshMode::FailTimes(_) => {
                let access_token = format!("refreshed-{}", call);
                let expires_at = Utc::now() + ChronoDuration::hours(1);
                *self.access_token.lock().unwrap() = access_token.clone();
                *self.expires_at.lock().unwrap() = Some(expires_at);
                Ok(Credential {
                    access_token,
                    expires_at,
                })
            }
        }
    }
}

/// Keepalive config with short, deterministic delays.
#[allow(dead_code)]
pub fn test_keepalive_config() -> KeepaliveConfig {
    KeepaliveConfig {
        retry_attempts: 3,
        backoff_base: Duration::from_millis(100),
        backoff_jitter: Duration::ZERO,
        ..KeepaliveConfig::default()
    }
}

/// Keepalive over a backend holding a long-lived credential.
#[allow(dead_code)]
pub fn test_keepalive() -> Keepalive {
    Keepalive::new(
        ScriptedBackend::valid_for(ChronoDuration::hours(1)),
        test_keepalive_config(),
    )
}

/// Fast polling intervals for live-sync tests.
#[allow(dead_code)]
pub fn test_sync_config() -> SyncConfig {
    SyncConfig {
        publish_interval: Duration::from_secs(1),
        exercise_poll_interval: Duration::from_secs(1),
        presence_ping_interval: Duration::from_secs(5),
        spectator_count_interval: Duration::from_secs(2),
        cheer_poll_interval: Duration::from_secs(1),
        ..SyncConfig::default()
    }
}

#[allow(dead_code)]
pub fn test_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new())
}

/// Controller persisting into `dir`.
#[allow(dead_code)]
pub fn test_controller(dir: &tempfile::TempDir) -> SessionController {
    SessionController::new(SessionStateStore::new(dir.path().join("session.json")))
}

#[allow(dead_code)]
pub fn bench_press(sets: &[(u32, f64)]) -> ExerciseRecord {
    ExerciseRecord {
        exercise_id: "bench".to_string(),
        name: "Bench Press".to_string(),
        muscle_group: "chest".to_string(),
        sets: sets
            .iter()
            .map(|&(reps, weight)| SetEntry { reps, weight })
            .collect(),
        notes: None,
    }
}
