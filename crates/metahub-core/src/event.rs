//! Domain events for version lifecycle changes.
//!
//! Activating a version must be observable by consumers that hold state
//! derived from "the current version of this hub" without coupling them to
//! the lifecycle manager. Events travel over a broadcast bus; consumers
//! subscribe and react, the publisher never waits for them.
//!
//! The envelope carries a deterministic idempotency key so that consumers
//! which persist or forward events can deduplicate redeliveries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::broadcast;

use crate::error::Result;

/// Trait for strongly-typed event payloads with stable envelope metadata.
pub trait EventPayload: Serialize {
    /// Event type discriminator (stable across producers).
    const EVENT_TYPE: &'static str;

    /// Event schema version (starts at `1`).
    const EVENT_VERSION: u32;
}

/// Envelope for every metahub domain event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent<T> {
    /// Event type discriminator (e.g. `"version.activated"`).
    pub event_type: String,

    /// Schema version for this event type.
    pub event_version: u32,

    /// Deterministic key for deduplication.
    pub idempotency_key: String,

    /// When the event occurred.
    pub occurred_at: DateTime<Utc>,

    /// Component that produced the event.
    pub source: String,

    /// The actual event payload.
    pub payload: T,
}

impl<T: EventPayload> DomainEvent<T> {
    /// Wraps a payload in a fully-populated envelope.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the payload cannot be serialized
    /// for idempotency-key derivation.
    pub fn new(source: impl Into<String>, payload: T) -> Result<Self> {
        let idempotency_key =
            generate_idempotency_key(T::EVENT_TYPE, T::EVENT_VERSION, &payload)?;
        Ok(Self {
            event_type: T::EVENT_TYPE.to_owned(),
            event_version: T::EVENT_VERSION,
            idempotency_key,
            occurred_at: Utc::now(),
            source: source.into(),
            payload,
        })
    }
}

/// Derives a deterministic idempotency key from
/// `{ event_type, event_version, payload }`.
///
/// # Errors
///
/// Returns a serialization error if the payload cannot be serialized.
pub fn generate_idempotency_key(
    event_type: &str,
    event_version: u32,
    payload: &impl Serialize,
) -> Result<String> {
    #[derive(Serialize)]
    struct KeyMaterial<'a, P: Serialize> {
        event_type: &'a str,
        event_version: u32,
        payload: &'a P,
    }

    let bytes = serde_json::to_vec(&KeyMaterial {
        event_type,
        event_version,
        payload,
    })?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("{digest:x}"))
}

/// Broadcast bus for one event payload type.
///
/// Publishing never blocks; subscribers that lag beyond the channel
/// capacity observe a lag error from their receiver, not publisher
/// backpressure.
#[derive(Debug, Clone)]
pub struct EventBus<T: Clone> {
    sender: broadcast::Sender<DomainEvent<T>>,
}

impl<T: Clone> EventBus<T> {
    /// Creates a bus retaining up to `capacity` undelivered events per
    /// subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event, returning the number of subscribers that will
    /// observe it. Zero subscribers is not an error.
    pub fn publish(&self, event: DomainEvent<T>) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribes to events published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent<T>> {
        self.sender.subscribe()
    }
}

impl<T: Clone> Default for EventBus<T> {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Ping {
        hub: String,
    }

    impl EventPayload for Ping {
        const EVENT_TYPE: &'static str = "ping";
        const EVENT_VERSION: u32 = 1;
    }

    #[test]
    fn idempotency_key_is_deterministic() {
        let a = generate_idempotency_key("ping", 1, &Ping { hub: "x".into() }).unwrap();
        let b = generate_idempotency_key("ping", 1, &Ping { hub: "x".into() }).unwrap();
        let c = generate_idempotency_key("ping", 1, &Ping { hub: "y".into() }).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn subscribers_observe_published_events() {
        let bus: EventBus<Ping> = EventBus::new(8);
        let mut receiver = bus.subscribe();
        let event = DomainEvent::new("test", Ping { hub: "ihec".into() }).unwrap();
        assert_eq!(bus.publish(event), 1);
        let received = receiver.recv().await.unwrap();
        assert_eq!(received.payload.hub, "ihec");
        assert_eq!(received.event_type, "ping");
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let bus: EventBus<Ping> = EventBus::new(8);
        let event = DomainEvent::new("test", Ping { hub: "ihec".into() }).unwrap();
        assert_eq!(bus.publish(event), 0);
    }
}
