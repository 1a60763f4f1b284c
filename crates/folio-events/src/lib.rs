//! # folio-events
//!
//! Profile-change notifications for folio.
//!
//! Synchronization runs record profile mutations as [`ProfileEvent`]s,
//! buffer them in an [`EventBuffer`] while a page is being written, and
//! flush them to an [`EventSink`] once the page has committed. Delivery
//! is at-least-once: a flush that fails keeps its events buffered for
//! the next attempt, so consumers must deduplicate on `event_id`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use folio_events::{EventBuffer, ProfileEvent, TracingEventSink};
//! use folio_model::Provider;
//!
//! let sink = TracingEventSink;
//! let mut buffer = EventBuffer::new();
//! buffer.push(ProfileEvent::created(Provider::Ldap, &account));
//! buffer.flush(&sink).await;
//! ```

pub mod buffer;
pub mod envelope;
pub mod error;
pub mod profile;
pub mod sink;

pub use buffer::EventBuffer;
pub use envelope::EventEnvelope;
pub use error::{EventError, EventResult};
pub use profile::{ProfileEvent, ProfileEventKind};
pub use sink::{EventSink, MemoryEventSink, TracingEventSink};
