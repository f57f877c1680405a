// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Retry thresholds and polling intervals are deployment-dependent, so every
//! one of them can be overridden from the environment.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// OAuth token endpoint used to refresh the user credential
    pub auth_token_url: String,
    /// OAuth client ID (public)
    pub auth_client_id: String,
    /// Refresh token to seed the credential with, if already signed in
    pub auth_refresh_token: Option<String>,
    /// GCP project ID hosting the live-sync collections
    pub gcp_project_id: String,
    /// Where the in-progress session record is persisted
    pub session_state_path: PathBuf,
    pub keepalive: KeepaliveConfig,
    pub sync: SyncConfig,
}

/// Tuning for the credential keepalive.
#[derive(Debug, Clone)]
pub struct KeepaliveConfig {
    /// Refresh at least this often even if the credential is not near expiry.
    pub min_refresh_interval: Duration,
    /// Failed refresh cycles tolerated before `ensure_valid` gives up.
    pub max_consecutive_failures: u32,
    /// Attempts per refresh cycle.
    pub retry_attempts: u32,
    pub backoff_base: Duration,
    /// Upper bound on random jitter; clamped to `backoff_base`.
    pub backoff_jitter: Duration,
    /// Timeout applied to each individual refresh attempt.
    pub refresh_timeout: Duration,
    /// A positive check younger than this short-circuits `quick_health_check`.
    pub quick_check_window: Duration,
    pub quick_check_leeway: Duration,
    pub default_leeway: Duration,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            min_refresh_interval: Duration::from_secs(120),
            max_consecutive_failures: 3,
            retry_attempts: 5,
            backoff_base: Duration::from_millis(500),
            backoff_jitter: Duration::from_millis(250),
            refresh_timeout: Duration::from_secs(10),
            quick_check_window: Duration::from_secs(30),
            quick_check_leeway: Duration::from_secs(30),
            default_leeway: Duration::from_secs(5 * 60),
        }
    }
}

impl KeepaliveConfig {
    /// Jitter bound actually used; never larger than the base delay so the
    /// backoff schedule stays non-decreasing.
    pub fn effective_jitter(&self) -> Duration {
        self.backoff_jitter.min(self.backoff_base)
    }
}

/// Polling intervals for the live-sync loops.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Owner: how often the current exercises are republished
    pub publish_interval: Duration,
    /// Spectator: how often snapshots are fetched
    pub exercise_poll_interval: Duration,
    /// Spectator: how often presence is refreshed
    pub presence_ping_interval: Duration,
    /// Presence older than this no longer counts as watching
    pub presence_timeout: Duration,
    /// Owner: how often the spectator count is refreshed
    pub spectator_count_interval: Duration,
    /// Owner: how often recent cheers are fetched
    pub cheer_poll_interval: Duration,
    pub recent_cheer_limit: u32,
    /// Leeway passed to the keepalive before each network call
    pub network_leeway: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            publish_interval: Duration::from_secs(5),
            exercise_poll_interval: Duration::from_secs(2),
            presence_ping_interval: Duration::from_secs(30),
            presence_timeout: Duration::from_secs(90),
            spectator_count_interval: Duration::from_secs(15),
            cheer_poll_interval: Duration::from_secs(3),
            recent_cheer_limit: 25,
            network_leeway: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            auth_token_url: "http://localhost:9099/oauth/token".to_string(),
            auth_client_id: "test_client_id".to_string(),
            auth_refresh_token: None,
            gcp_project_id: "test-project".to_string(),
            session_state_path: env::temp_dir().join("workout-live-test-session.json"),
            keepalive: KeepaliveConfig::default(),
            sync: SyncConfig::default(),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let keepalive_defaults = KeepaliveConfig::default();
        let sync_defaults = SyncConfig::default();

        Ok(Self {
            auth_token_url: env::var("AUTH_TOKEN_URL")
                .map_err(|_| ConfigError::Missing("AUTH_TOKEN_URL"))?,
            auth_client_id: env::var("AUTH_CLIENT_ID")
                .map_err(|_| ConfigError::Missing("AUTH_CLIENT_ID"))?,
            auth_refresh_token: env::var("AUTH_REFRESH_TOKEN")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            session_state_path: env::var("SESSION_STATE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_state_path()),
            keepalive: KeepaliveConfig {
                min_refresh_interval: env_secs(
                    "KEEPALIVE_MIN_REFRESH_SECS",
                    keepalive_defaults.min_refresh_interval,
                ),
                max_consecutive_failures: env_parse(
                    "KEEPALIVE_MAX_FAILURES",
                    keepalive_defaults.max_consecutive_failures,
                ),
                retry_attempts: env_parse(
                    "KEEPALIVE_RETRY_ATTEMPTS",
                    keepalive_defaults.retry_attempts,
                ),
                backoff_base: env_millis("KEEPALIVE_BACKOFF_MS", keepalive_defaults.backoff_base),
                backoff_jitter: env_millis(
                    "KEEPALIVE_JITTER_MS",
                    keepalive_defaults.backoff_jitter,
                ),
                refresh_timeout: env_secs(
                    "KEEPALIVE_REFRESH_TIMEOUT_SECS",
                    keepalive_defaults.refresh_timeout,
                ),
                ..keepalive_defaults
            },
            sync: SyncConfig {
                publish_interval: env_secs("SYNC_PUBLISH_SECS", sync_defaults.publish_interval),
                exercise_poll_interval: env_secs(
                    "SYNC_EXERCISE_POLL_SECS",
                    sync_defaults.exercise_poll_interval,
                ),
                presence_ping_interval: env_secs(
                    "SYNC_PRESENCE_PING_SECS",
                    sync_defaults.presence_ping_interval,
                ),
                presence_timeout: env_secs(
                    "SYNC_PRESENCE_TIMEOUT_SECS",
                    sync_defaults.presence_timeout,
                ),
                ..sync_defaults
            },
        })
    }
}

fn default_state_path() -> PathBuf {
    PathBuf::from(env::var("HOME").unwrap_or_else(|_| ".".to_string()))
        .join(".workout-live")
        .join("active_session.json")
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Interval or timeout in seconds. Zero is not a usable period and falls back
/// to the default.
fn env_secs(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .map(Duration::from_secs)
        .filter(|d| !d.is_zero())
        .unwrap_or(default)
}

fn env_millis(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
