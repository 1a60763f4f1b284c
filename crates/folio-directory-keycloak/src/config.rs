//! Keycloak adapter configuration.

use folio_directory::{DirectoryError, DirectoryResult};
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Configuration for the Keycloak directory adapter.
///
/// The client named by `client_id` must be confidential, have service
/// accounts enabled and hold the `view-users` realm-management role.
#[derive(Clone, Deserialize)]
pub struct KeycloakDirectoryConfig {
    /// Base URL of the Keycloak server (e.g., `https://id.example.com`).
    pub base_url: Url,

    /// Realm whose users are synchronized.
    pub realm: String,

    /// Client id used for the client-credentials grant.
    pub client_id: String,

    /// Client secret for the grant.
    pub client_secret: SecretString,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// How many seconds before expiry a cached token is refreshed.
    #[serde(default = "default_token_grace_secs")]
    pub token_grace_secs: u64,
}

impl std::fmt::Debug for KeycloakDirectoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeycloakDirectoryConfig")
            .field("base_url", &self.base_url.as_str())
            .field("realm", &self.realm)
            .field("client_id", &self.client_id)
            .field("client_secret", &"***REDACTED***")
            .field("timeout_secs", &self.timeout_secs)
            .field("token_grace_secs", &self.token_grace_secs)
            .finish()
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_token_grace_secs() -> u64 {
    30
}

impl KeycloakDirectoryConfig {
    /// Create a new Keycloak config with required fields.
    pub fn new(
        base_url: Url,
        realm: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            base_url,
            realm: realm.into(),
            client_id: client_id.into(),
            client_secret: SecretString::from(client_secret.into()),
            timeout_secs: default_timeout_secs(),
            token_grace_secs: default_token_grace_secs(),
        }
    }

    /// URL of the realm's OpenID token endpoint.
    pub fn token_url(&self) -> DirectoryResult<Url> {
        self.join(&[
            "realms",
            &self.realm,
            "protocol",
            "openid-connect",
            "token",
        ])
    }

    /// URL under the realm's admin API, e.g. `admin_url(&["users"])`.
    ///
    /// Segments are pushed individually so values containing `/`, `%`
    /// or spaces end up percent-encoded instead of splitting the path.
    pub fn admin_url(&self, tail: &[&str]) -> DirectoryResult<Url> {
        let mut segments = vec!["admin", "realms", self.realm.as_str()];
        segments.extend_from_slice(tail);
        self.join(&segments)
    }

    fn join(&self, segments: &[&str]) -> DirectoryResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|()| {
                DirectoryError::invalid_configuration("base_url cannot be a base URL")
            })?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    pub fn validate(&self) -> DirectoryResult<()> {
        if self.base_url.host_str().is_none() {
            return Err(DirectoryError::invalid_configuration(
                "base_url must have a host",
            ));
        }

        if self.realm.is_empty() {
            return Err(DirectoryError::invalid_configuration("realm is required"));
        }

        if self.client_id.is_empty() {
            return Err(DirectoryError::invalid_configuration(
                "client_id is required",
            ));
        }

        // Catches non-hierarchical bases like `mailto:` up front.
        self.token_url()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> KeycloakDirectoryConfig {
        KeycloakDirectoryConfig::new(
            Url::parse("https://id.example.com").unwrap(),
            "folio",
            "sync-client",
            "super-secret",
        )
    }

    #[test]
    fn test_token_url() {
        assert_eq!(
            config().token_url().unwrap().as_str(),
            "https://id.example.com/realms/folio/protocol/openid-connect/token"
        );
    }

    #[test]
    fn test_admin_url() {
        assert_eq!(
            config().admin_url(&["users"]).unwrap().as_str(),
            "https://id.example.com/admin/realms/folio/users"
        );
    }

    #[test]
    fn test_admin_url_encodes_segments() {
        let url = config()
            .admin_url(&["roles", "blog admins/all", "users"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://id.example.com/admin/realms/folio/roles/blog%20admins%2Fall/users"
        );
    }

    #[test]
    fn test_base_url_with_path_prefix() {
        let config = KeycloakDirectoryConfig::new(
            Url::parse("https://www.example.com/auth/").unwrap(),
            "folio",
            "c",
            "s",
        );
        assert_eq!(
            config.admin_url(&["users"]).unwrap().as_str(),
            "https://www.example.com/auth/admin/realms/folio/users"
        );
    }

    #[test]
    fn test_validate_requires_realm() {
        let mut config = config();
        config.realm = String::new();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("realm is required"));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let debug = format!("{:?}", config());
        assert!(debug.contains("***REDACTED***"));
        assert!(!debug.contains("super-secret"));
    }

    #[test]
    fn test_deserialization_fills_defaults() {
        let json = r#"{
            "base_url": "https://id.example.com",
            "realm": "folio",
            "client_id": "sync-client",
            "client_secret": "super-secret"
        }"#;

        let config: KeycloakDirectoryConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.token_grace_secs, 30);
        assert!(config.validate().is_ok());
    }
}
