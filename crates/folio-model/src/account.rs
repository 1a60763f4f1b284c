//! Local user accounts and their provider bindings.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::profile::PublicProfile;
use crate::provider::Provider;
use crate::role::UserRole;

/// A persisted user account.
///
/// An account may be bound to at most one identity per directory
/// provider. The binding is the provider's external id together with
/// the watermark of the last run that saw the identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub enabled: bool,
    pub locked: bool,
    pub confirmed: bool,
    pub roles: BTreeSet<UserRole>,
    pub ldap_id: Option<String>,
    pub keycloak_id: Option<String>,
    pub ldap_synced_at: Option<DateTime<Utc>>,
    pub keycloak_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserAccount {
    /// Returns the external id this account is bound to for `provider`.
    pub fn external_id(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Ldap => self.ldap_id.as_deref(),
            Provider::Keycloak => self.keycloak_id.as_deref(),
        }
    }

    /// Binds this account to an external identity of `provider`.
    pub fn set_external_id(&mut self, provider: Provider, external_id: impl Into<String>) {
        let external_id = Some(external_id.into());
        match provider {
            Provider::Ldap => self.ldap_id = external_id,
            Provider::Keycloak => self.keycloak_id = external_id,
        }
    }

    /// Returns the watermark of the last run that saw this account on
    /// `provider`, if any.
    pub fn last_sync_time(&self, provider: Provider) -> Option<DateTime<Utc>> {
        match provider {
            Provider::Ldap => self.ldap_synced_at,
            Provider::Keycloak => self.keycloak_synced_at,
        }
    }

    /// Stamps the sync watermark for `provider`.
    pub fn mark_synced(&mut self, provider: Provider, at: DateTime<Utc>) {
        match provider {
            Provider::Ldap => self.ldap_synced_at = Some(at),
            Provider::Keycloak => self.keycloak_synced_at = Some(at),
        }
    }

    pub fn has_role(&self, role: UserRole) -> bool {
        self.roles.contains(&role)
    }

    /// Grants `role`, returning `true` if the account did not already
    /// hold it.
    pub fn grant_role(&mut self, role: UserRole) -> bool {
        self.roles.insert(role)
    }

    /// Revokes `role`, returning `true` if the account held it.
    pub fn revoke_role(&mut self, role: UserRole) -> bool {
        self.roles.remove(&role)
    }

    /// Projects the account onto its public profile.
    pub fn to_public(&self) -> PublicProfile {
        PublicProfile {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            roles: self.roles.clone(),
            enabled: self.enabled,
            locked: self.locked,
            confirmed: self.confirmed,
        }
    }
}

/// A user account that has not been persisted yet.
///
/// Carries everything [`UserAccount`] does except the id and the
/// store-managed timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUserAccount {
    pub username: String,
    pub email: Option<String>,
    pub enabled: bool,
    pub locked: bool,
    pub confirmed: bool,
    pub roles: BTreeSet<UserRole>,
    pub ldap_id: Option<String>,
    pub keycloak_id: Option<String>,
    pub ldap_synced_at: Option<DateTime<Utc>>,
    pub keycloak_synced_at: Option<DateTime<Utc>>,
}

impl NewUserAccount {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: None,
            enabled: true,
            locked: false,
            confirmed: false,
            roles: BTreeSet::new(),
            ldap_id: None,
            keycloak_id: None,
            ldap_synced_at: None,
            keycloak_synced_at: None,
        }
    }

    pub fn external_id(&self, provider: Provider) -> Option<&str> {
        match provider {
            Provider::Ldap => self.ldap_id.as_deref(),
            Provider::Keycloak => self.keycloak_id.as_deref(),
        }
    }

    pub fn set_external_id(&mut self, provider: Provider, external_id: impl Into<String>) {
        let external_id = Some(external_id.into());
        match provider {
            Provider::Ldap => self.ldap_id = external_id,
            Provider::Keycloak => self.keycloak_id = external_id,
        }
    }

    pub fn mark_synced(&mut self, provider: Provider, at: DateTime<Utc>) {
        match provider {
            Provider::Ldap => self.ldap_synced_at = Some(at),
            Provider::Keycloak => self.keycloak_synced_at = Some(at),
        }
    }
}
