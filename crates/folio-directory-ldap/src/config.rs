//! LDAP adapter configuration.

use folio_directory::{DirectoryError, DirectoryResult};
use serde::{Deserialize, Serialize};

/// Configuration for the LDAP directory adapter.
#[derive(Clone, Serialize, Deserialize)]
pub struct LdapDirectoryConfig {
    /// LDAP server hostname.
    pub host: String,

    /// LDAP server port (default: 389, or 636 for LDAPS).
    #[serde(default = "default_ldap_port")]
    pub port: u16,

    /// Use LDAPS (LDAP over SSL).
    #[serde(default)]
    pub use_ssl: bool,

    /// Use STARTTLS on a plain connection.
    #[serde(default)]
    pub use_starttls: bool,

    /// Base DN for all searches (e.g., "dc=example,dc=com").
    pub base_dn: String,

    /// Bind DN for authentication.
    pub bind_dn: String,

    /// Bind password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_password: Option<String>,

    /// Container for user entries, relative to the base DN
    /// (e.g., "ou=people").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_container: Option<String>,

    /// Container for role groups, relative to the base DN
    /// (e.g., "ou=groups").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_container: Option<String>,

    /// Filter selecting user entries. Must be parenthesized so it can
    /// be AND-combined with membership filters.
    #[serde(default = "default_user_filter")]
    pub user_filter: String,

    /// Attribute holding the immutable external id.
    #[serde(default = "default_external_id_attribute")]
    pub external_id_attribute: String,

    /// Attribute holding the username.
    #[serde(default = "default_username_attribute")]
    pub username_attribute: String,

    /// Attribute holding the email address.
    #[serde(default = "default_email_attribute")]
    pub email_attribute: String,

    /// Attribute holding the enabled flag. When unset, every entry
    /// counts as enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled_attribute: Option<String>,

    /// Attribute listing group DNs the entry is a member of.
    #[serde(default = "default_member_of_attribute")]
    pub member_of_attribute: String,

    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// How long a cached bind may be reused before rebinding, in
    /// seconds.
    #[serde(default = "default_max_bind_age_secs")]
    pub max_bind_age_secs: u64,
}

impl std::fmt::Debug for LdapDirectoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapDirectoryConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_ssl", &self.use_ssl)
            .field("use_starttls", &self.use_starttls)
            .field("base_dn", &self.base_dn)
            .field("bind_dn", &self.bind_dn)
            .field(
                "bind_password",
                &self.bind_password.as_ref().map(|_| "***REDACTED***"),
            )
            .field("user_container", &self.user_container)
            .field("group_container", &self.group_container)
            .field("user_filter", &self.user_filter)
            .field("external_id_attribute", &self.external_id_attribute)
            .field("username_attribute", &self.username_attribute)
            .field("email_attribute", &self.email_attribute)
            .field("enabled_attribute", &self.enabled_attribute)
            .field("member_of_attribute", &self.member_of_attribute)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("max_bind_age_secs", &self.max_bind_age_secs)
            .finish()
    }
}

fn default_ldap_port() -> u16 {
    389
}

fn default_user_filter() -> String {
    "(objectClass=inetOrgPerson)".to_string()
}

fn default_external_id_attribute() -> String {
    "entryUUID".to_string()
}

fn default_username_attribute() -> String {
    "uid".to_string()
}

fn default_email_attribute() -> String {
    "mail".to_string()
}

fn default_member_of_attribute() -> String {
    "memberOf".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_max_bind_age_secs() -> u64 {
    300
}

impl LdapDirectoryConfig {
    /// Create a new LDAP config with required fields.
    pub fn new(
        host: impl Into<String>,
        base_dn: impl Into<String>,
        bind_dn: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: default_ldap_port(),
            use_ssl: false,
            use_starttls: false,
            base_dn: base_dn.into(),
            bind_dn: bind_dn.into(),
            bind_password: None,
            user_container: None,
            group_container: None,
            user_filter: default_user_filter(),
            external_id_attribute: default_external_id_attribute(),
            username_attribute: default_username_attribute(),
            email_attribute: default_email_attribute(),
            enabled_attribute: None,
            member_of_attribute: default_member_of_attribute(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_bind_age_secs: default_max_bind_age_secs(),
        }
    }

    /// Set bind password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.bind_password = Some(password.into());
        self
    }

    /// Enable SSL (LDAPS).
    #[must_use]
    pub fn with_ssl(mut self) -> Self {
        self.use_ssl = true;
        self.port = 636;
        self
    }

    /// Enable STARTTLS.
    #[must_use]
    pub fn with_starttls(mut self) -> Self {
        self.use_starttls = true;
        self
    }

    /// Set user container.
    pub fn with_user_container(mut self, container: impl Into<String>) -> Self {
        self.user_container = Some(container.into());
        self
    }

    /// Set group container.
    pub fn with_group_container(mut self, container: impl Into<String>) -> Self {
        self.group_container = Some(container.into());
        self
    }

    /// Set the attribute carrying the enabled flag.
    pub fn with_enabled_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.enabled_attribute = Some(attribute.into());
        self
    }

    /// Get the full user container DN.
    #[must_use]
    pub fn user_dn(&self) -> String {
        match &self.user_container {
            Some(container) => format!("{},{}", container, self.base_dn),
            None => self.base_dn.clone(),
        }
    }

    /// Get the full group container DN.
    #[must_use]
    pub fn group_dn(&self) -> String {
        match &self.group_container {
            Some(container) => format!("{},{}", container, self.base_dn),
            None => self.base_dn.clone(),
        }
    }

    /// Get the LDAP URL.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.use_ssl { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    pub fn validate(&self) -> DirectoryResult<()> {
        if self.host.is_empty() {
            return Err(DirectoryError::invalid_configuration("host is required"));
        }

        if self.base_dn.is_empty() {
            return Err(DirectoryError::invalid_configuration("base_dn is required"));
        }

        if self.bind_dn.is_empty() {
            return Err(DirectoryError::invalid_configuration("bind_dn is required"));
        }

        if self.use_ssl && self.use_starttls {
            return Err(DirectoryError::invalid_configuration(
                "cannot use both SSL and STARTTLS",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LdapDirectoryConfig {
        LdapDirectoryConfig::new(
            "ldap.example.com",
            "dc=example,dc=com",
            "cn=admin,dc=example,dc=com",
        )
    }

    #[test]
    fn test_defaults() {
        let config = config();

        assert_eq!(config.port, 389);
        assert_eq!(config.user_filter, "(objectClass=inetOrgPerson)");
        assert_eq!(config.external_id_attribute, "entryUUID");
        assert_eq!(config.username_attribute, "uid");
        assert_eq!(config.email_attribute, "mail");
        assert_eq!(config.member_of_attribute, "memberOf");
        assert_eq!(config.enabled_attribute, None);
        assert_eq!(config.max_bind_age_secs, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_with_ssl_switches_port() {
        let config = config().with_ssl();

        assert!(config.use_ssl);
        assert_eq!(config.port, 636);
        assert_eq!(config.url(), "ldaps://ldap.example.com:636");
    }

    #[test]
    fn test_validate_requires_host() {
        let config = LdapDirectoryConfig::new("", "dc=example,dc=com", "cn=admin");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("host is required"));
    }

    #[test]
    fn test_validate_rejects_ssl_and_starttls() {
        let config = config().with_ssl().with_starttls();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cannot use both SSL and STARTTLS"));
    }

    #[test]
    fn test_container_dns() {
        let config = config()
            .with_user_container("ou=people")
            .with_group_container("ou=groups");

        assert_eq!(config.user_dn(), "ou=people,dc=example,dc=com");
        assert_eq!(config.group_dn(), "ou=groups,dc=example,dc=com");

        let bare = LdapDirectoryConfig::new("h", "dc=example,dc=com", "cn=admin");
        assert_eq!(bare.user_dn(), "dc=example,dc=com");
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = config().with_password("super-secret");
        let debug = format!("{config:?}");

        assert!(debug.contains("***REDACTED***"));
        assert!(!debug.contains("super-secret"));
    }

    #[test]
    fn test_deserialization_fills_defaults() {
        let json = r#"{
            "host": "ldap.example.com",
            "base_dn": "dc=example,dc=com",
            "bind_dn": "cn=admin,dc=example,dc=com"
        }"#;

        let config: LdapDirectoryConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.port, 389);
        assert_eq!(config.username_attribute, "uid");
        assert!(config.validate().is_ok());
    }
}
