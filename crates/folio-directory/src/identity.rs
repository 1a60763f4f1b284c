//! External identities as directories report them.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// One user identity listed by a directory provider.
///
/// `external_id` is the provider's immutable key for the entry (LDAP
/// `entryUUID`, Keycloak user id) and the only field local accounts are
/// correlated on. Everything else is the provider's current view and
/// may change between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdentity {
    pub external_id: String,
    pub username: String,
    pub email: Option<String>,
    pub enabled: bool,

    /// Whether the provider has verified the email address. `None`
    /// when the provider does not track verification.
    pub email_verified: Option<bool>,

    /// Provider-side role/group tokens, when the listing carries them.
    /// `None` means membership must be fetched separately, not that the
    /// user has no roles.
    pub role_tokens: Option<BTreeSet<String>>,
}

impl ExternalIdentity {
    pub fn new(external_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            username: username.into(),
            email: None,
            enabled: true,
            email_verified: None,
            role_tokens: None,
        }
    }

    /// Set the email address.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Set the enabled flag.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the email verification flag.
    pub fn with_email_verified(mut self, verified: bool) -> Self {
        self.email_verified = Some(verified);
        self
    }

    /// Set the provider-side role tokens.
    pub fn with_role_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.role_tokens = Some(tokens.into_iter().map(Into::into).collect());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let identity = ExternalIdentity::new("u1", "alice");

        assert_eq!(identity.external_id, "u1");
        assert_eq!(identity.username, "alice");
        assert!(identity.enabled);
        assert_eq!(identity.email, None);
        assert_eq!(identity.email_verified, None);
        assert_eq!(identity.role_tokens, None);
    }

    #[test]
    fn test_builder_chain() {
        let identity = ExternalIdentity::new("u1", "alice")
            .with_email("a@x.com")
            .with_enabled(false)
            .with_email_verified(true)
            .with_role_tokens(["editors", "admins"]);

        assert_eq!(identity.email.as_deref(), Some("a@x.com"));
        assert!(!identity.enabled);
        assert_eq!(identity.email_verified, Some(true));
        let tokens = identity.role_tokens.unwrap();
        assert!(tokens.contains("editors"));
        assert!(tokens.contains("admins"));
    }
}
