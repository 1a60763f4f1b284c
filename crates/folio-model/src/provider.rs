//! External identity providers known to the platform.

use serde::{Deserialize, Serialize};

/// An external identity source with its own adapter and configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Corporate LDAP directory.
    Ldap,
    /// Keycloak realm.
    Keycloak,
}

impl Provider {
    /// Stable string form used in logs, lock names and event payloads.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Ldap => "ldap",
            Provider::Keycloak => "keycloak",
        }
    }

    /// Prefix prepended to a colliding username when the rename strategy
    /// applies, so `bob` shadowed by an LDAP user becomes `ldap_bob`.
    #[must_use]
    pub fn username_prefix(&self) -> &'static str {
        match self {
            Provider::Ldap => "ldap_",
            Provider::Keycloak => "keycloak_",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ldap" => Ok(Provider::Ldap),
            "keycloak" => Ok(Provider::Keycloak),
            _ => Err(format!("Unknown provider: {s}")),
        }
    }
}
