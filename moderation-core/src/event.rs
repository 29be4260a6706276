//! Domain event traits and the persisted event envelope.
//!
//! `DomainEvent` is the lightweight trait every concrete event struct
//! implements. Aggregate event enums implement [`EventKind`],
//! [`SerializableEvent`] and [`ProjectionEvent`] so the repository can move
//! them across the store boundary without knowing their shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

/// Per-stream event version. Streams start empty at `0`; the first event is
/// version `1`.
pub type Version = u64;

/// Error returned when decoding a stored event fails.
#[derive(Debug, Error)]
pub enum EventDecodeError {
    /// The event kind was not recognized by this event enum.
    #[error("unknown event kind `{kind}`, expected one of {expected:?}")]
    UnknownKind {
        /// The unrecognized event kind string.
        kind: String,
        /// The list of event kinds this enum can handle.
        expected: &'static [&'static str],
    },
    /// The payload did not match the event's shape.
    #[error("malformed `{kind}` payload: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Marker trait for concrete event structs.
///
/// Each event carries a unique [`Self::KIND`] identifier so the repository can
/// route stored payloads back to the correct type when rebuilding aggregates or
/// projections. Kinds are namespaced by aggregate: `"article.created"`.
pub trait DomainEvent: Serialize + DeserializeOwned {
    const KIND: &'static str;
}

/// Runtime access to an event's kind.
///
/// Blanket-implemented for every [`DomainEvent`]; event enums implement it by
/// matching on their variants.
pub trait EventKind {
    fn kind(&self) -> &'static str;
}

impl<T: DomainEvent> EventKind for T {
    fn kind(&self) -> &'static str {
        T::KIND
    }
}

/// Event sum types that can be decoded from their stored representation.
pub trait ProjectionEvent: Sized {
    /// The list of event kinds this sum type can decode.
    const EVENT_KINDS: &'static [&'static str];

    /// Decode an event from its kind and JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`EventDecodeError::UnknownKind`] if the kind is not one of
    /// [`Self::EVENT_KINDS`], or [`EventDecodeError::Payload`] if the payload
    /// does not match.
    fn from_stored(kind: &str, data: &serde_json::Value) -> Result<Self, EventDecodeError>;
}

/// Event sum types that can be encoded for persistence.
pub trait SerializableEvent: EventKind {
    /// Encode the event payload.
    ///
    /// # Errors
    ///
    /// Returns a `serde_json` error if the payload cannot be serialized.
    fn to_data(&self) -> Result<serde_json::Value, serde_json::Error>;
}

/// Decode a single concrete event from a stored payload.
///
/// Event enums call this from their [`ProjectionEvent::from_stored`] match
/// arms.
///
/// # Errors
///
/// Returns [`EventDecodeError::Payload`] if the payload does not match `E`.
pub fn decode<E: DomainEvent>(data: &serde_json::Value) -> Result<E, EventDecodeError> {
    E::deserialize(data).map_err(|source| EventDecodeError::Payload {
        kind: E::KIND.to_string(),
        source,
    })
}

/// Envelope fields recorded alongside every event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub occurred_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<String>,
}

impl EventMetadata {
    /// Metadata stamped with the current time and no tracing context.
    #[must_use]
    pub fn now() -> Self {
        Self {
            occurred_at: Utc::now(),
            correlation_id: None,
            causation_id: None,
        }
    }
}

/// Correlation and causation identifiers carried by a unit of work.
///
/// The aggregate root stamps these onto every pending event it produces.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Context {
    pub correlation_id: Option<String>,
    pub causation_id: Option<String>,
}

impl Context {
    #[must_use]
    pub fn correlated(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: Some(correlation_id.into()),
            causation_id: None,
        }
    }

    #[must_use]
    pub fn caused_by(mut self, causation_id: impl Into<String>) -> Self {
        self.causation_id = Some(causation_id.into());
        self
    }

    pub(crate) fn stamp(&self) -> EventMetadata {
        EventMetadata {
            occurred_at: Utc::now(),
            correlation_id: self.correlation_id.clone(),
            causation_id: self.causation_id.clone(),
        }
    }
}
