//! Request-time session refresh.
//!
//! [`SessionRefresher`] is the production [`RefreshHandler`]: it exchanges
//! the stored refresh token for a new access token at the refresh endpoint
//! and keeps the persisted session in step with the rotation. It talks to
//! the endpoint with its own plain HTTP client; the gateway's
//! refresh-endpoint guard remains the backstop against recursive refresh.

use std::sync::{Arc, Weak};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::api::REFRESH_ENDPOINT;

use super::credentials::{CredentialStore, RefreshHandler, RefreshedTokens};
use super::session::{load_session, save_session};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshTokenResponse {
    success: bool,
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Exchanges the refresh token for a fresh access token.
///
/// Holds the credential store weakly: the store owns the handler, and the
/// handler only needs to read the refresh token at exchange time.
pub struct SessionRefresher {
    store: Weak<CredentialStore>,
    base_url: String,
    http: reqwest::Client,
}

impl SessionRefresher {
    pub fn new(store: &Arc<CredentialStore>, base_url: impl Into<String>) -> Self {
        Self {
            store: Arc::downgrade(store),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Build a refresher and register it as the store's refresh handler.
    pub fn register(store: &Arc<CredentialStore>, base_url: impl Into<String>) {
        store.set_refresh_handler(Arc::new(Self::new(store, base_url)));
    }
}

#[async_trait]
impl RefreshHandler for SessionRefresher {
    async fn refresh(&self) -> Result<RefreshedTokens> {
        let store = self
            .store
            .upgrade()
            .context("Credential store is no longer alive")?;
        let refresh_token = store
            .refresh_token()
            .context("No refresh token available")?;

        let url = format!("{}{}", self.base_url, REFRESH_ENDPOINT);
        tracing::debug!(%url, "exchanging refresh token");

        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "refreshToken": refresh_token }))
            .send()
            .await
            .context("Refresh request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Refresh endpoint returned {}: {}", status, body);
        }

        let refreshed: RefreshTokenResponse = resp
            .json()
            .await
            .context("Failed to parse refresh response")?;

        if !refreshed.success || refreshed.access_token.is_empty() {
            bail!("Refresh endpoint rejected the session");
        }

        // Keep the persisted session in step with the rotated tokens so the
        // next process start does not resume with a revoked refresh token.
        match load_session().await {
            Ok(Some(mut session)) => {
                session.access_token = refreshed.access_token.clone();
                session.refresh_token = refreshed.refresh_token.clone();
                session.expires_at = refreshed
                    .expires_in
                    .map(|secs| Utc::now() + chrono::Duration::seconds(secs));
                if let Err(e) = save_session(&session).await {
                    tracing::warn!("Failed to persist refreshed session: {e:#}");
                }
            }
            Ok(None) => {
                tracing::debug!("No persisted session to update after refresh");
            }
            Err(e) => {
                tracing::warn!("Failed to load session for refresh update: {e:#}");
            }
        }

        tracing::debug!("access token refreshed");

        Ok(RefreshedTokens {
            access_token: refreshed.access_token,
            refresh_token: Some(refreshed.refresh_token),
        })
    }
}
