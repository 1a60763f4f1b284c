//! Client-credentials authentication against the realm token endpoint.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use folio_directory::{DirectoryError, DirectoryResult};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::config::KeycloakDirectoryConfig;

/// Token response from the OpenID token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    #[allow(dead_code)]
    token_type: String,
}

/// Cached access token.
#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// Returns true if the token is expired or will expire within the
    /// grace period.
    fn is_expired(&self, grace_period: Duration) -> bool {
        Utc::now() + grace_period >= self.expires_at
    }
}

/// Token cache for the admin API client.
#[derive(Debug)]
pub struct TokenCache {
    config: Arc<KeycloakDirectoryConfig>,
    http_client: reqwest::Client,
    cached_token: RwLock<Option<CachedToken>>,
    grace_period: Duration,
}

impl TokenCache {
    /// Creates a new token cache.
    pub fn new(config: Arc<KeycloakDirectoryConfig>, http_client: reqwest::Client) -> Self {
        let grace_period = Duration::seconds(config.token_grace_secs as i64);
        Self {
            config,
            http_client,
            cached_token: RwLock::new(None),
            grace_period,
        }
    }

    /// Gets a valid access token, refreshing if necessary.
    #[instrument(skip(self), fields(realm = %self.config.realm))]
    pub async fn get_token(&self) -> DirectoryResult<String> {
        {
            let cache = self.cached_token.read().await;
            if let Some(ref token) = *cache {
                if !token.is_expired(self.grace_period) {
                    debug!("using cached token");
                    return Ok(token.access_token.clone());
                }
            }
        }

        debug!("acquiring access token");
        let new_token = self.acquire_token().await?;

        {
            let mut cache = self.cached_token.write().await;
            *cache = Some(new_token.clone());
        }

        Ok(new_token.access_token)
    }

    /// Acquires a new access token using the client-credentials flow.
    #[instrument(skip(self))]
    async fn acquire_token(&self) -> DirectoryResult<CachedToken> {
        let token_url = self.config.token_url()?;

        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", &self.config.client_id),
            ("client_secret", self.config.client_secret.expose_secret()),
        ];

        let response = self
            .http_client
            .post(token_url.clone())
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                DirectoryError::connection_failed_with_source(
                    format!("token request to {token_url} failed"),
                    e,
                )
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(DirectoryError::AuthenticationFailed);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DirectoryError::token(format!(
                "token request failed with status {status}: {body}"
            )));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| DirectoryError::token(format!("failed to parse token response: {e}")))?;

        let expires_at = Utc::now() + Duration::seconds(token_response.expires_in);

        debug!(%expires_at, "acquired new token");

        Ok(CachedToken {
            access_token: token_response.access_token,
            expires_at,
        })
    }

    /// Invalidates the cached token, forcing a fresh grant on next use.
    pub async fn invalidate(&self) {
        let mut cache = self.cached_token.write().await;
        *cache = None;
    }
}
