//! Error types for the folio-events crate.

use thiserror::Error;
use uuid::Uuid;

/// Result alias for event operations.
pub type EventResult<T> = Result<T, EventError>;

/// Errors that can occur while serializing or publishing events.
#[derive(Debug, Error)]
pub enum EventError {
    /// Failed to serialize an event to JSON.
    #[error("Failed to serialize event {event_id}: {cause}")]
    SerializationFailed { event_id: Uuid, cause: String },

    /// The sink rejected the event.
    #[error("Failed to publish event {event_id}: {cause}")]
    PublishFailed { event_id: Uuid, cause: String },
}

impl EventError {
    /// Returns true if retrying the same event may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, EventError::PublishFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_transient() {
        let event_id = Uuid::new_v4();

        let transient = EventError::PublishFailed {
            event_id,
            cause: "broker unavailable".to_string(),
        };
        assert!(transient.is_transient());

        let permanent = EventError::SerializationFailed {
            event_id,
            cause: "bad payload".to_string(),
        };
        assert!(!permanent.is_transient());
    }

    #[test]
    fn test_error_display() {
        let event_id = Uuid::nil();
        let err = EventError::PublishFailed {
            event_id,
            cause: "timeout".to_string(),
        };
        assert_eq!(
            err.to_string(),
            format!("Failed to publish event {event_id}: timeout")
        );
    }
}
