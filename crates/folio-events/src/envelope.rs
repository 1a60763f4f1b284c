//! Envelope wrapping every published event with delivery metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EventError, EventResult};
use crate::profile::ProfileEvent;

/// A profile event plus the metadata consumers need to deduplicate it.
///
/// The `event_id` is assigned once, when the event is recorded. A
/// buffered event that is retried after a failed flush keeps its id,
/// which is what makes at-least-once delivery tolerable downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: ProfileEvent,
}

impl EventEnvelope {
    pub fn new(event: ProfileEvent) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            event,
        }
    }

    /// Topic this envelope is published under.
    pub fn topic(&self) -> &'static str {
        ProfileEvent::TOPIC
    }

    /// Serialize the envelope to its wire form.
    pub fn to_json(&self) -> EventResult<String> {
        serde_json::to_string(self).map_err(|e| EventError::SerializationFailed {
            event_id: self.event_id,
            cause: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Utc;
    use folio_model::{Provider, UserAccount};

    use super::*;

    fn account() -> UserAccount {
        UserAccount {
            id: 7,
            username: "bob".to_string(),
            email: None,
            enabled: true,
            locked: false,
            confirmed: false,
            roles: BTreeSet::new(),
            ldap_id: None,
            keycloak_id: Some("kc-7".to_string()),
            ldap_synced_at: None,
            keycloak_synced_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_envelope_flattens_event() {
        let envelope = EventEnvelope::new(ProfileEvent::updated(Provider::Keycloak, &account()));
        let json: serde_json::Value = serde_json::from_str(&envelope.to_json().unwrap()).unwrap();

        assert_eq!(json["eventId"], envelope.event_id.to_string());
        assert_eq!(json["eventType"], "updated");
        assert_eq!(json["userId"], 7);
        assert_eq!(json["provider"], "keycloak");
        assert_eq!(envelope.topic(), "folio.profile");
    }

    #[test]
    fn test_envelope_roundtrip() {
        let envelope = EventEnvelope::new(ProfileEvent::deleted(Provider::Ldap, &account()));
        let restored: EventEnvelope =
            serde_json::from_str(&envelope.to_json().unwrap()).unwrap();

        assert_eq!(restored.event_id, envelope.event_id);
        assert_eq!(restored.event, envelope.event);
    }
}
