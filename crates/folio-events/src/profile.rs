//! Profile lifecycle events.

use std::fmt;

use folio_model::{Provider, PublicProfile, UserAccount};
use serde::{Deserialize, Serialize};

/// What happened to the profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileEventKind {
    Created,
    Updated,
    Deleted,
}

impl ProfileEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileEventKind::Created => "created",
            ProfileEventKind::Updated => "updated",
            ProfileEventKind::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ProfileEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A profile change observed during a synchronization run.
///
/// The payload is the public projection of the account as it looked
/// right after the change (for deletions: right before), never the
/// stored record with its provider bindings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileEvent {
    pub event_type: ProfileEventKind,
    pub user_id: i64,
    pub provider: Provider,
    pub payload: PublicProfile,
}

impl ProfileEvent {
    /// Topic all profile events are published under.
    pub const TOPIC: &'static str = "folio.profile";

    pub fn created(provider: Provider, account: &UserAccount) -> Self {
        Self::from_account(ProfileEventKind::Created, provider, account)
    }

    pub fn updated(provider: Provider, account: &UserAccount) -> Self {
        Self::from_account(ProfileEventKind::Updated, provider, account)
    }

    pub fn deleted(provider: Provider, account: &UserAccount) -> Self {
        Self::from_account(ProfileEventKind::Deleted, provider, account)
    }

    fn from_account(kind: ProfileEventKind, provider: Provider, account: &UserAccount) -> Self {
        Self {
            event_type: kind,
            user_id: account.id,
            provider,
            payload: account.to_public(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Utc;
    use folio_model::UserRole;

    use super::*;

    fn account() -> UserAccount {
        UserAccount {
            id: 42,
            username: "alice".to_string(),
            email: Some("alice@example.com".to_string()),
            enabled: true,
            locked: false,
            confirmed: true,
            roles: BTreeSet::from([UserRole::Reader]),
            ldap_id: Some("uuid-1".to_string()),
            keycloak_id: None,
            ldap_synced_at: Some(Utc::now()),
            keycloak_synced_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_event_serialization() {
        let event = ProfileEvent::created(Provider::Ldap, &account());
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["eventType"], "created");
        assert_eq!(json["userId"], 42);
        assert_eq!(json["provider"], "ldap");
        assert_eq!(json["payload"]["username"], "alice");
        // Provider bindings never leave the store.
        assert!(json["payload"].get("ldap_id").is_none());
    }

    #[test]
    fn test_deleted_carries_last_profile() {
        let event = ProfileEvent::deleted(Provider::Keycloak, &account());

        assert_eq!(event.event_type, ProfileEventKind::Deleted);
        assert_eq!(event.payload.username, "alice");
    }
}
