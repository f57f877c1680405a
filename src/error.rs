// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types.
//!
//! Only [`AppError::Unauthenticated`] and [`AppError::KeepaliveExhausted`] are
//! meant to reach the UI as hard failures. Everything else is absorbed by the
//! service that hit it and surfaced as a health flag or an empty result.

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Credential missing or explicitly rejected; the user must sign in again.
    #[error("Not authenticated: {0}")]
    Unauthenticated(String),

    /// Timeouts, unreachable host, 5xx. Safe to retry.
    #[error("Transient network error: {0}")]
    Transient(String),

    #[error("Remote store error: {0}")]
    Store(String),

    #[error("Local storage error: {0}")]
    LocalStorage(String),

    #[error("A session is already in progress")]
    SessionAlreadyActive,

    #[error("Credential refresh failed {failures} times in a row")]
    KeepaliveExhausted { failures: u32 },

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// True for the one structural condition that is never retried.
    pub fn is_fatal_auth(&self) -> bool {
        matches!(self, AppError::Unauthenticated(_))
    }

    /// True for errors a retry might fix.
    ///
    /// Remote store failures count as transient: the store is reached over the
    /// same network as the credential endpoint.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Transient(_) | AppError::Store(_))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::LocalStorage(err.to_string())
    }
}

/// Result type alias used across the crate.
pub type Result<T> = std::result::Result<T, AppError>;
