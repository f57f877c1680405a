// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Remote credential keepalive.
//!
//! Every remote operation calls [`Keepalive::ensure_valid`] first. The policy
//! favors availability: transient refresh failures are tolerated up to a
//! configured number of consecutive cycles, and only a missing or rejected
//! credential fails immediately.

use crate::config::KeepaliveConfig;
use crate::error::{AppError, Result};
use crate::models::{Credential, CredentialHealth};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Source of the remote credential.
#[async_trait]
pub trait CredentialBackend: Send + Sync {
    /// The credential currently held, or `None` if signed out.
    async fn current(&self) -> Result<Option<Credential>>;

    /// Exchange for a fresh credential.
    async fn refresh(&self) -> Result<Credential>;
}

/// Outcome of one refresh cycle, shared with callers that joined it.
#[derive(Debug, Clone)]
enum CycleFailure {
    Fatal(String),
    Transient(String),
}

type CycleOutcome = std::result::Result<(), CycleFailure>;

#[derive(Default)]
struct KeepaliveState {
    expires_at: Option<DateTime<Utc>>,
    last_refresh: Option<Instant>,
    last_check: Option<Instant>,
    consecutive_failures: u32,
    healthy: bool,
    /// Bumped at the end of every refresh cycle.
    refresh_generation: u64,
    last_outcome: Option<CycleOutcome>,
}

struct KeepaliveInner {
    backend: Arc<dyn CredentialBackend>,
    config: KeepaliveConfig,
    state: Mutex<KeepaliveState>,
    /// Held for the whole refresh cycle so concurrent callers queue behind it.
    refresh_lock: tokio::sync::Mutex<()>,
}

/// Keeps the remote credential alive. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Keepalive {
    inner: Arc<KeepaliveInner>,
}

impl Keepalive {
    pub fn new(backend: Arc<dyn CredentialBackend>, config: KeepaliveConfig) -> Self {
        Self {
            inner: Arc::new(KeepaliveInner {
                backend,
                config,
                state: Mutex::new(KeepaliveState::default()),
                refresh_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &KeepaliveConfig {
        &self.inner.config
    }

    fn state(&self) -> MutexGuard<'_, KeepaliveState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current health summary. Advisory only.
    pub fn health(&self) -> CredentialHealth {
        let state = self.state();
        CredentialHealth {
            healthy: state.healthy,
            consecutive_failures: state.consecutive_failures,
            expires_at: state.expires_at,
        }
    }

    /// Make sure the credential is usable for at least `leeway`.
    ///
    /// Returns `Ok` when the credential is valid, was refreshed, or a transient
    /// refresh failure is still below the consecutive-failure threshold.
    pub async fn ensure_valid(&self, leeway: Duration) -> Result<()> {
        let generation = self.state().refresh_generation;

        let needs_refresh = match self.inner.backend.current().await {
            Ok(Some(credential)) => {
                let mut state = self.state();
                state.expires_at = Some(credential.expires_at);
                let remaining = credential.remaining(Utc::now());
                let stale = state
                    .last_refresh
                    .map_or(true, |at| at.elapsed() >= self.inner.config.min_refresh_interval);
                remaining < leeway || stale || !state.healthy
            }
            Ok(None) => {
                self.state().healthy = false;
                tracing::error!("No credential present, re-authentication required");
                return Err(AppError::Unauthenticated(
                    "No credential present".to_string(),
                ));
            }
            Err(e) if e.is_fatal_auth() => {
                self.state().healthy = false;
                tracing::error!(error = %e, "Credential rejected");
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not read credential, attempting refresh");
                true
            }
        };

        if !needs_refresh {
            self.state().last_check = Some(Instant::now());
            return Ok(());
        }

        let outcome = self.refresh_single_flight(generation).await;
        self.settle(outcome)
    }

    /// Refresh now, ignoring the minimum refresh interval.
    pub async fn force_refresh(&self) -> Result<()> {
        let generation = {
            let mut state = self.state();
            state.healthy = false;
            state.refresh_generation
        };
        tracing::info!("Forcing credential refresh");
        let outcome = self.refresh_single_flight(generation).await;
        self.settle(outcome)
    }

    /// Cheap liveness check that never fails.
    pub async fn quick_health_check(&self) -> bool {
        {
            let state = self.state();
            let recent = state
                .last_check
                .is_some_and(|at| at.elapsed() < self.inner.config.quick_check_window);
            if state.healthy && recent {
                return true;
            }
        }

        match self.ensure_valid(self.inner.config.quick_check_leeway).await {
            Ok(()) => self.health().healthy,
            Err(e) => {
                tracing::debug!(error = %e, "Quick health check failed");
                false
            }
        }
    }

    /// A credential valid for at least the default leeway.
    pub async fn credential(&self) -> Result<Credential> {
        self.ensure_valid(self.inner.config.default_leeway).await?;
        self.inner
            .backend
            .current()
            .await?
            .ok_or_else(|| AppError::Unauthenticated("No credential present".to_string()))
    }

    /// Turn a cycle outcome into the caller-visible result.
    fn settle(&self, outcome: CycleOutcome) -> Result<()> {
        match outcome {
            Ok(()) => Ok(()),
            Err(CycleFailure::Fatal(msg)) => Err(AppError::Unauthenticated(msg)),
            Err(CycleFailure::Transient(msg)) => {
                let failures = self.state().consecutive_failures;
                if failures >= self.inner.config.max_consecutive_failures {
                    tracing::error!(failures, error = %msg, "Credential refresh keeps failing");
                    Err(AppError::KeepaliveExhausted { failures })
                } else {
                    tracing::warn!(
                        failures,
                        error = %msg,
                        "Credential refresh failed, continuing with possibly stale credential"
                    );
                    Ok(())
                }
            }
        }
    }

    /// Run a refresh cycle, or join the one already running.
    ///
    /// `seen_generation` is the cycle count observed before deciding to
    /// refresh; if it moved while waiting for the lock, another caller's
    /// cycle covered this request and its outcome is returned instead.
    async fn refresh_single_flight(&self, seen_generation: u64) -> CycleOutcome {
        let _guard = self.inner.refresh_lock.lock().await;

        {
            let state = self.state();
            if state.refresh_generation != seen_generation {
                tracing::debug!("Joined in-flight credential refresh");
                return state.last_outcome.clone().unwrap_or(Ok(()));
            }
        }

        let result = self.refresh_with_retry().await;

        let mut state = self.state();
        state.refresh_generation += 1;
        let outcome = match result {
            Ok(credential) => {
                state.expires_at = Some(credential.expires_at);
                state.last_refresh = Some(Instant::now());
                state.last_check = Some(Instant::now());
                state.consecutive_failures = 0;
                state.healthy = true;
                tracing::info!(expires_at = %credential.expires_at, "Credential refreshed");
                Ok(())
            }
            Err(CycleFailure::Fatal(msg)) => {
                state.healthy = false;
                Err(CycleFailure::Fatal(msg))
            }
            Err(CycleFailure::Transient(msg)) => {
                state.healthy = false;
                state.consecutive_failures += 1;
                Err(CycleFailure::Transient(msg))
            }
        };
        state.last_outcome = Some(outcome.clone());
        outcome
    }

    /// Up to `retry_attempts` refresh attempts with exponential backoff.
    async fn refresh_with_retry(&self) -> std::result::Result<Credential, CycleFailure> {
        let config = &self.inner.config;
        let attempts = config.retry_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match tokio::time::timeout(config.refresh_timeout, self.inner.backend.refresh()).await
            {
                Ok(Ok(credential)) => return Ok(credential),
                Ok(Err(AppError::Unauthenticated(msg))) => {
                    tracing::error!(attempt, error = %msg, "Refresh rejected, not retrying");
                    return Err(CycleFailure::Fatal(msg));
                }
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => last_error = format!("refresh timed out after {:?}", config.refresh_timeout),
            }

            tracing::warn!(attempt, attempts, error = %last_error, "Credential refresh attempt failed");

            if attempt < attempts {
                tokio::time::sleep(self.jittered_delay(attempt)).await;
            }
        }

        Err(CycleFailure::Transient(last_error))
    }

    fn jittered_delay(&self, attempt: u32) -> Duration {
        let jitter_ms = self.inner.config.effective_jitter().as_millis() as u64;
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms));
        backoff_delay(self.inner.config.backoff_base, attempt) + jitter
    }
}

/// Backoff before the next attempt after failed attempt `attempt` (1-based):
/// `base * 2^(attempt - 1)`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exponent)
}
