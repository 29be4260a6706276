//! Persistence layer abstractions.
//!
//! This module describes the storage contract (`EventStore`) and the wire
//! formats that cross it (`PersistableEvent`, `StoredEvent`), plus a reference
//! in-memory implementation.
use std::{fmt, future::Future};

pub use nonempty::NonEmpty;
use thiserror::Error;

use crate::{
    concurrency::{ConcurrencyConflict, ExpectedVersion, StreamExists, VersionMismatch},
    event::{EventMetadata, Version},
};

pub mod inmemory;

/// Identity of one event stream: the aggregate type plus the instance id.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StreamKey<Id> {
    aggregate_kind: String,
    aggregate_id: Id,
}

impl<Id> StreamKey<Id> {
    pub fn new(aggregate_kind: impl Into<String>, aggregate_id: Id) -> Self {
        Self {
            aggregate_kind: aggregate_kind.into(),
            aggregate_id,
        }
    }

    #[must_use]
    pub fn aggregate_kind(&self) -> &str {
        &self.aggregate_kind
    }

    #[must_use]
    pub const fn aggregate_id(&self) -> &Id {
        &self.aggregate_id
    }
}

impl<Id: fmt::Display> fmt::Display for StreamKey<Id> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.aggregate_kind, self.aggregate_id)
    }
}

/// Raw event data ready to be written to a store backend.
///
/// This is the boundary between Repository and `EventStore`. The repository
/// encodes events to this form, the store assigns a version and persists it.
#[derive(Clone, Debug, PartialEq)]
pub struct PersistableEvent {
    pub kind: String,
    pub data: serde_json::Value,
    pub metadata: EventMetadata,
}

/// Event materialized from the store, with its stream version.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredEvent<Id> {
    pub aggregate_kind: String,
    pub aggregate_id: Id,
    pub kind: String,
    pub version: Version,
    pub data: serde_json::Value,
    pub metadata: EventMetadata,
}

impl<Id> StoredEvent<Id> {
    pub(crate) fn from_persistable(
        key: &StreamKey<Id>,
        version: Version,
        event: PersistableEvent,
    ) -> Self
    where
        Id: Clone,
    {
        Self {
            aggregate_kind: key.aggregate_kind.clone(),
            aggregate_id: key.aggregate_id.clone(),
            kind: event.kind,
            version,
            data: event.data,
            metadata: event.metadata,
        }
    }
}

/// Error from append operations.
#[derive(Debug, Error)]
pub enum AppendError<StoreError>
where
    StoreError: std::error::Error,
{
    /// Another writer modified the stream since the expected version.
    #[error(transparent)]
    Conflict(#[from] ConcurrencyConflict),
    /// A new stream was expected but events already exist.
    #[error(transparent)]
    AlreadyExists(#[from] StreamExists),
    /// Underlying store error.
    #[error("store error: {0}")]
    Store(#[source] StoreError),
}

impl<StoreError: std::error::Error> From<VersionMismatch> for AppendError<StoreError> {
    fn from(mismatch: VersionMismatch) -> Self {
        match mismatch {
            VersionMismatch::Conflict(conflict) => Self::Conflict(conflict),
            VersionMismatch::AlreadyExists(exists) => Self::AlreadyExists(exists),
        }
    }
}

/// Result of a successful append: the newly stored events, in version order.
#[derive(Clone, Debug, PartialEq)]
pub struct Committed<Id> {
    pub events: NonEmpty<StoredEvent<Id>>,
}

impl<Id> Committed<Id> {
    /// Version of the last event written in the batch.
    #[must_use]
    pub fn last_version(&self) -> Version {
        self.events.last().version
    }

    /// Versions assigned to the batch, in order.
    #[must_use]
    pub fn versions(&self) -> Vec<Version> {
        self.events.iter().map(|event| event.version).collect()
    }
}

/// Convenience alias for append outcomes returned by event stores.
pub type AppendOutcome<Id, Err> = Result<Committed<Id>, AppendError<Err>>;

/// Abstraction over the persistence layer for event streams.
///
/// Streams are keyed by [`StreamKey`]. Versions are per stream, gapless and
/// start at `1`; an absent stream is at version `0`.
// ANCHOR: event_store_trait
pub trait EventStore: Send + Sync {
    /// Aggregate identifier type.
    type Id: Clone + fmt::Debug + Send + Sync + 'static;

    /// Store-specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Current version of a stream, `0` for streams with no events.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when the operation fails.
    fn stream_version<'a>(
        &'a self,
        key: &'a StreamKey<Self::Id>,
    ) -> impl Future<Output = Result<Version, Self::Error>> + Send + 'a;

    /// Append a batch atomically under an expected-version precondition.
    ///
    /// On success the batch is assigned versions `current + 1 ..= current +
    /// N` in the given order. On any error nothing is written.
    ///
    /// # Errors
    ///
    /// Returns [`AppendError::Conflict`] for an [`ExpectedVersion::Exact`]
    /// mismatch, [`AppendError::AlreadyExists`] for
    /// [`ExpectedVersion::NoStream`] against a non-empty stream, or
    /// [`AppendError::Store`] if persistence fails.
    fn append<'a>(
        &'a self,
        key: &'a StreamKey<Self::Id>,
        events: NonEmpty<PersistableEvent>,
        expected: ExpectedVersion,
    ) -> impl Future<Output = AppendOutcome<Self::Id, Self::Error>> + Send + 'a;

    /// Read events with `version > from_version`, ascending.
    ///
    /// Unknown streams yield an empty list.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when loading fails.
    fn read<'a>(
        &'a self,
        key: &'a StreamKey<Self::Id>,
        from_version: Version,
    ) -> impl Future<Output = Result<Vec<StoredEvent<Self::Id>>, Self::Error>> + Send + 'a;
}
// ANCHOR_END: event_store_trait
