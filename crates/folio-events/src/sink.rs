//! Event sinks.
//!
//! The actual message bus lives behind [`EventSink`]; synchronization
//! code only ever talks to the trait. [`TracingEventSink`] is the
//! default for deployments without a bus, [`MemoryEventSink`] backs
//! tests.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use crate::envelope::EventEnvelope;
use crate::error::EventResult;

/// Destination for published profile events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Publish a single envelope.
    ///
    /// Must either deliver the event or return an error; a sink that
    /// returns `Ok` takes responsibility for the envelope.
    async fn publish(&self, envelope: &EventEnvelope) -> EventResult<()>;
}

/// Sink that writes every event to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn publish(&self, envelope: &EventEnvelope) -> EventResult<()> {
        let body = envelope.to_json()?;
        info!(
            topic = envelope.topic(),
            event_id = %envelope.event_id,
            event_type = %envelope.event.event_type,
            user_id = envelope.event.user_id,
            provider = %envelope.event.provider,
            %body,
            "profile event"
        );
        Ok(())
    }
}

/// Sink that records every published envelope in memory.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    published: Mutex<Vec<EventEnvelope>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all envelopes published so far, in publish order.
    pub fn published(&self) -> Vec<EventEnvelope> {
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

#[async_trait]
impl EventSink for MemoryEventSink {
    async fn publish(&self, envelope: &EventEnvelope) -> EventResult<()> {
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(envelope.clone());
        Ok(())
    }
}
