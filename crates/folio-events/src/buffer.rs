//! Per-run event buffering.

use tracing::{debug, error, warn};

use crate::envelope::EventEnvelope;
use crate::profile::ProfileEvent;
use crate::sink::EventSink;

/// Buffers events recorded while a page of work is in flight.
///
/// Events are pushed as records are written and flushed only after the
/// page's transaction has committed, so a rolled-back page never
/// announces changes it did not make. A flush that fails mid-way keeps
/// the unpublished tail (envelope ids included) for the next attempt.
#[derive(Debug, Default)]
pub struct EventBuffer {
    pending: Vec<EventEnvelope>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an event. The envelope id is fixed here, not at publish
    /// time, so retries stay deduplicatable.
    pub fn push(&mut self, event: ProfileEvent) {
        self.pending.push(EventEnvelope::new(event));
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Publishes pending events in order, stopping at the first
    /// failure. Returns how many were published; the rest stay queued.
    pub async fn flush(&mut self, sink: &dyn EventSink) -> usize {
        let mut published = 0;
        for envelope in &self.pending {
            match sink.publish(envelope).await {
                Ok(()) => published += 1,
                Err(error) => {
                    warn!(
                        %error,
                        published,
                        remaining = self.pending.len() - published,
                        "event publish failed, keeping remainder buffered"
                    );
                    break;
                }
            }
        }
        self.pending.drain(..published);
        published
    }

    /// End-of-run flush. Anything that still cannot be published is
    /// logged and dropped; the buffer does not outlive the run.
    pub async fn flush_remaining(&mut self, sink: &dyn EventSink) {
        if self.pending.is_empty() {
            return;
        }
        let published = self.flush(sink).await;
        if published > 0 {
            debug!(published, "flushed events at end of run");
        }
        if !self.pending.is_empty() {
            error!(
                dropped = self.pending.len(),
                "dropping events that could not be published"
            );
            self.pending.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;
    use folio_model::{Provider, UserAccount};
    use uuid::Uuid;

    use super::*;
    use crate::error::{EventError, EventResult};
    use crate::sink::MemoryEventSink;

    fn account(id: i64) -> UserAccount {
        UserAccount {
            id,
            username: format!("user{id}"),
            email: None,
            enabled: true,
            locked: false,
            confirmed: false,
            roles: BTreeSet::new(),
            ldap_id: None,
            keycloak_id: None,
            ldap_synced_at: None,
            keycloak_synced_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    /// Fails the publish call numbered `fail_on` (1-based), accepts
    /// every other call. `fail_on = 0` never fails.
    struct FlakySink {
        inner: MemoryEventSink,
        calls: AtomicUsize,
        fail_on: usize,
    }

    impl FlakySink {
        fn failing_on(fail_on: usize) -> Self {
            Self {
                inner: MemoryEventSink::new(),
                calls: AtomicUsize::new(0),
                fail_on,
            }
        }
    }

    #[async_trait]
    impl EventSink for FlakySink {
        async fn publish(&self, envelope: &EventEnvelope) -> EventResult<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == self.fail_on {
                return Err(EventError::PublishFailed {
                    event_id: envelope.event_id,
                    cause: "sink offline".to_string(),
                });
            }
            self.inner.publish(envelope).await
        }
    }

    #[tokio::test]
    async fn test_flush_publishes_in_order() {
        let sink = MemoryEventSink::new();
        let mut buffer = EventBuffer::new();
        buffer.push(ProfileEvent::created(Provider::Ldap, &account(1)));
        buffer.push(ProfileEvent::updated(Provider::Ldap, &account(2)));

        let published = buffer.flush(&sink).await;

        assert_eq!(published, 2);
        assert!(buffer.is_empty());
        let events = sink.published();
        assert_eq!(events[0].event.user_id, 1);
        assert_eq!(events[1].event.user_id, 2);
    }

    #[tokio::test]
    async fn test_failed_publish_keeps_event_and_id() {
        let sink = FlakySink::failing_on(1);
        let mut buffer = EventBuffer::new();
        buffer.push(ProfileEvent::created(Provider::Keycloak, &account(1)));

        assert_eq!(buffer.flush(&sink).await, 0);
        assert_eq!(buffer.len(), 1);
        let queued_id = buffer.pending[0].event_id;

        // Retry succeeds and the envelope keeps its original id.
        assert_eq!(buffer.flush(&sink).await, 1);
        assert!(buffer.is_empty());
        assert_eq!(sink.inner.published()[0].event_id, queued_id);
    }

    #[tokio::test]
    async fn test_flush_stops_at_first_failure() {
        let sink = FlakySink::failing_on(2);
        let mut buffer = EventBuffer::new();
        buffer.push(ProfileEvent::created(Provider::Ldap, &account(1)));
        buffer.push(ProfileEvent::created(Provider::Ldap, &account(2)));
        buffer.push(ProfileEvent::created(Provider::Ldap, &account(3)));

        // Second publish fails, so only the first event goes out.
        assert_eq!(buffer.flush(&sink).await, 1);
        assert_eq!(buffer.len(), 2);

        assert_eq!(buffer.flush(&sink).await, 2);
        assert!(buffer.is_empty());

        let user_ids: Vec<i64> = sink
            .inner
            .published()
            .iter()
            .map(|e| e.event.user_id)
            .collect();
        assert_eq!(user_ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_flush_remaining_drops_unpublishable() {
        struct DeadSink;

        #[async_trait]
        impl EventSink for DeadSink {
            async fn publish(&self, envelope: &EventEnvelope) -> EventResult<()> {
                Err(EventError::PublishFailed {
                    event_id: envelope.event_id,
                    cause: "sink offline".to_string(),
                })
            }
        }

        let mut buffer = EventBuffer::new();
        buffer.push(ProfileEvent::deleted(Provider::Ldap, &account(1)));

        buffer.flush_remaining(&DeadSink).await;

        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_flush_remaining_noop_when_empty() {
        let sink = MemoryEventSink::new();
        let mut buffer = EventBuffer::new();

        buffer.flush_remaining(&sink).await;

        assert!(sink.is_empty());
    }

    #[test]
    fn test_distinct_envelope_ids() {
        let mut buffer = EventBuffer::new();
        buffer.push(ProfileEvent::created(Provider::Ldap, &account(1)));
        buffer.push(ProfileEvent::created(Provider::Ldap, &account(1)));

        let ids: Vec<Uuid> = buffer.pending.iter().map(|e| e.event_id).collect();
        assert_ne!(ids[0], ids[1]);
    }
}
