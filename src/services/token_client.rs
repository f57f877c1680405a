// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth token client used as the production credential backend.
//!
//! Handles:
//! - Holding the current access/refresh token pair in memory
//! - Refreshing via the `refresh_token` grant
//! - Classifying failures as fatal (re-login) or transient (retry)

use crate::error::AppError;
use crate::models::Credential;
use crate::services::keepalive::CredentialBackend;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;

/// OAuth error code meaning the refresh token is no longer accepted.
const INVALID_GRANT: &str = "invalid_grant";

/// Token pair held by the client.
#[derive(Clone)]
struct HeldTokens {
    access_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
}

/// HTTP credential backend.
pub struct TokenClient {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    tokens: RwLock<Option<HeldTokens>>,
}

impl TokenClient {
    /// Create a client with no credential yet.
    pub fn new(token_url: String, client_id: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            token_url,
            client_id,
            tokens: RwLock::new(None),
        }
    }

    /// Create a client seeded with a refresh token from a previous sign-in.
    ///
    /// The access token is treated as already expired, so the first
    /// `ensure_valid` refreshes immediately.
    pub fn with_refresh_token(token_url: String, client_id: String, refresh_token: String) -> Self {
        let client = Self::new(token_url, client_id);
        let seeded = HeldTokens {
            access_token: String::new(),
            refresh_token,
            expires_at: DateTime::<Utc>::UNIX_EPOCH,
        };
        Self {
            tokens: RwLock::new(Some(seeded)),
            ..client
        }
    }

    /// Drop the held tokens (sign-out).
    pub async fn clear(&self) {
        *self.tokens.write().await = None;
    }

    /// POST a `refresh_token` grant to the token endpoint.
    async fn request_refresh(&self, refresh_token: &str) -> Result<TokenRefreshResponse, AppError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| AppError::Transient(format!("Token refresh request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| AppError::Transient(format!("Token response parse error: {}", e)));
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status.as_u16(), &body))
    }
}

/// Map a non-success token endpoint response onto the error taxonomy.
fn classify_failure(status: u16, body: &str) -> AppError {
    match status {
        401 | 403 => AppError::Unauthenticated(format!("HTTP {}: {}", status, body)),
        400 if body.contains(INVALID_GRANT) => {
            AppError::Unauthenticated(format!("Refresh token rejected: {}", body))
        }
        429 => {
            tracing::warn!("Token endpoint rate limit hit (429)");
            AppError::Transient("Rate limited by token endpoint".to_string())
        }
        _ => AppError::Transient(format!("HTTP {}: {}", status, body)),
    }
}

#[async_trait]
impl CredentialBackend for TokenClient {
    async fn current(&self) -> Result<Option<Credential>, AppError> {
        Ok(self.tokens.read().await.as_ref().map(|t| Credential {
            access_token: t.access_token.clone(),
            expires_at: t.expires_at,
        }))
    }

    async fn refresh(&self) -> Result<Credential, AppError> {
        let refresh_token = self
            .tokens
            .read()
            .await
            .as_ref()
            .map(|t| t.refresh_token.clone())
            .ok_or_else(|| AppError::Unauthenticated("No refresh token held".to_string()))?;

        let response = self.request_refresh(&refresh_token).await?;
        let expires_at = response.expiry(Utc::now());

        let held = HeldTokens {
            access_token: response.access_token,
            // Some providers do not rotate refresh tokens
            refresh_token: response.refresh_token.unwrap_or(refresh_token),
            expires_at,
        };
        let credential = Credential {
            access_token: held.access_token.clone(),
            expires_at,
        };
        *self.tokens.write().await = Some(held);

        Ok(credential)
    }
}

/// Token refresh response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRefreshResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Absolute expiry (unix seconds)
    #[serde(default)]
    pub expires_at: Option<i64>,
    /// Relative expiry (seconds)
    #[serde(default)]
    pub expires_in: Option<i64>,
}

impl TokenRefreshResponse {
    /// Expiry from whichever field the provider sent; one hour if neither.
    pub fn expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        if let Some(at) = self.expires_at.and_then(|ts| DateTime::from_timestamp(ts, 0)) {
            return at;
        }
        now + Duration::seconds(self.expires_in.unwrap_or(3600))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_invalid_grant_is_fatal() {
        let err = classify_failure(400, r#"{"error":"invalid_grant"}"#);
        assert!(err.is_fatal_auth());
    }

    #[test]
    fn test_classify_unauthorized_is_fatal() {
        assert!(classify_failure(401, "").is_fatal_auth());
    }

    #[test]
    fn test_classify_server_errors_are_transient() {
        assert!(classify_failure(503, "unavailable").is_transient());
        assert!(classify_failure(429, "").is_transient());
        assert!(classify_failure(400, r#"{"error":"invalid_request"}"#).is_transient());
    }

    #[test]
    fn test_expiry_prefers_absolute() {
        let now = Utc::now();
        let response = TokenRefreshResponse {
            access_token: "a".to_string(),
            refresh_token: None,
            expires_at: Some(2_000_000_000),
            expires_in: Some(60),
        };
        assert_eq!(response.expiry(now).timestamp(), 2_000_000_000);
    }

    #[test]
    fn test_expiry_from_relative() {
        let now = Utc::now();
        let response = TokenRefreshResponse {
            access_token: "a".to_string(),
            refresh_token: None,
            expires_at: None,
            expires_in: Some(60),
        };
        assert_eq!(response.expiry(now), now + Duration::seconds(60));
    }

    #[tokio::test]
    async fn test_refresh_without_token_is_fatal() {
        let client = TokenClient::new("http://127.0.0.1:9/token".to_string(), "id".to_string());
        let err = client.refresh().await.unwrap_err();
        assert!(err.is_fatal_auth());
        assert!(client.current().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_seeded_client_reports_expired_credential() {
        let client = TokenClient::with_refresh_token(
            "http://127.0.0.1:9/token".to_string(),
            "id".to_string(),
            "refresh".to_string(),
        );
        let credential = client.current().await.unwrap().unwrap();
        assert_eq!(credential.remaining(Utc::now()), std::time::Duration::ZERO);
    }
}
