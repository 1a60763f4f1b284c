//! Keycloak admin REST directory client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use folio_directory::{
    DirectoryClient, DirectoryError, DirectoryResult, ExternalIdentity, PageRequest,
};
use folio_model::Provider;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};
use url::Url;

use crate::auth::TokenCache;
use crate::config::KeycloakDirectoryConfig;

/// User representation returned by the admin users API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeycloakUser {
    id: String,
    username: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    email_verified: Option<bool>,
}

fn default_enabled() -> bool {
    true
}

impl KeycloakUser {
    fn into_identity(self) -> ExternalIdentity {
        ExternalIdentity {
            external_id: self.id,
            username: self.username,
            email: self.email,
            enabled: self.enabled,
            email_verified: self.email_verified,
            // Realm roles are not part of the users listing; role
            // membership is queried per role instead.
            role_tokens: None,
        }
    }
}

/// Directory client backed by the Keycloak admin REST API.
pub struct KeycloakDirectory {
    config: Arc<KeycloakDirectoryConfig>,
    http_client: reqwest::Client,
    tokens: TokenCache,
}

impl KeycloakDirectory {
    /// Create a new Keycloak directory client with the given
    /// configuration.
    pub fn new(config: KeycloakDirectoryConfig) -> DirectoryResult<Self> {
        config.validate()?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                DirectoryError::invalid_configuration(format!("failed to create HTTP client: {e}"))
            })?;

        let config = Arc::new(config);
        let tokens = TokenCache::new(Arc::clone(&config), http_client.clone());

        Ok(Self {
            config,
            http_client,
            tokens,
        })
    }

    /// GET a JSON resource from the admin API with token injection.
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> DirectoryResult<T> {
        let token = self.tokens.get_token().await?;

        let response = self
            .http_client
            .get(url.clone())
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| {
                DirectoryError::connection_failed_with_source(
                    format!("request to {url} failed"),
                    e,
                )
            })?;

        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            // The token was accepted when issued but rejected here, so
            // drop it; the next call starts from a fresh grant.
            self.tokens.invalidate().await;
            return Err(DirectoryError::AuthenticationFailed);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DirectoryError::protocol(format!(
                "admin API returned {status}: {body}"
            )));
        }

        response.json().await.map_err(|e| {
            DirectoryError::protocol_with_source("failed to decode admin API response", e)
        })
    }

    fn users_url(&self, page: PageRequest) -> DirectoryResult<Url> {
        let mut url = self.config.admin_url(&["users"])?;
        url.query_pairs_mut()
            .append_pair("first", &page.offset.to_string())
            .append_pair("max", &page.page_size.to_string())
            .append_pair("briefRepresentation", "true");
        Ok(url)
    }
}

#[async_trait]
impl DirectoryClient for KeycloakDirectory {
    fn provider(&self) -> Provider {
        Provider::Keycloak
    }

    #[instrument(skip(self), fields(realm = %self.config.realm))]
    async fn list_page(&self, page: PageRequest) -> DirectoryResult<Vec<ExternalIdentity>> {
        let url = self.users_url(page)?;
        let users: Vec<KeycloakUser> = self.get_json(url).await?;

        debug!(returned = users.len(), "Keycloak user page ready");
        Ok(users.into_iter().map(KeycloakUser::into_identity).collect())
    }

    #[instrument(skip(self), fields(realm = %self.config.realm))]
    async fn list_role_members_page(
        &self,
        role_token: &str,
        page: PageRequest,
    ) -> DirectoryResult<Vec<ExternalIdentity>> {
        let mut url = self.config.admin_url(&["roles", role_token, "users"])?;
        url.query_pairs_mut()
            .append_pair("first", &page.offset.to_string())
            .append_pair("max", &page.page_size.to_string());

        let members: Vec<KeycloakUser> = self.get_json(url).await?;
        Ok(members.into_iter().map(KeycloakUser::into_identity).collect())
    }

    #[instrument(skip(self), fields(realm = %self.config.realm))]
    async fn test_connection(&self) -> DirectoryResult<()> {
        let url = self.users_url(PageRequest::new(1))?;
        let _users: Vec<KeycloakUser> = self.get_json(url).await?;

        info!("Keycloak connection test successful");
        Ok(())
    }
}

impl std::fmt::Debug for KeycloakDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeycloakDirectory")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_parsing_camel_case() {
        let json = r#"{
            "id": "kc-1",
            "username": "alice",
            "email": "alice@example.com",
            "enabled": true,
            "emailVerified": false
        }"#;

        let user: KeycloakUser = serde_json::from_str(json).unwrap();

        assert_eq!(user.id, "kc-1");
        assert_eq!(user.username, "alice");
        assert_eq!(user.email_verified, Some(false));
    }

    #[test]
    fn test_user_parsing_defaults() {
        // Brief representations may omit everything optional.
        let json = r#"{"id": "kc-2", "username": "bob"}"#;

        let user: KeycloakUser = serde_json::from_str(json).unwrap();

        assert_eq!(user.email, None);
        assert!(user.enabled);
        assert_eq!(user.email_verified, None);
    }

    #[test]
    fn test_into_identity_leaves_roles_unknown() {
        let user = KeycloakUser {
            id: "kc-1".to_string(),
            username: "alice".to_string(),
            email: None,
            enabled: false,
            email_verified: Some(true),
        };

        let identity = user.into_identity();

        assert_eq!(identity.external_id, "kc-1");
        assert!(!identity.enabled);
        assert_eq!(identity.email_verified, Some(true));
        assert_eq!(identity.role_tokens, None);
    }
}
