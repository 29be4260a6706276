//! In-memory event store implementation for testing.
//!
//! This module provides [`Store`], a thread-safe in-memory implementation of
//! [`EventStore`](super::EventStore) suitable for unit tests, examples and
//! single-process deployments that do not need durability.
//!
//! # Example
//!
//! ```
//! use moderation_core::store::inmemory;
//!
//! let store: inmemory::Store<String> = inmemory::Store::new();
//! ```

use std::{
    collections::HashMap,
    convert::Infallible,
    future::Future,
    hash::Hash,
    sync::{Arc, PoisonError, RwLock},
};

use nonempty::NonEmpty;

use crate::{
    concurrency::ExpectedVersion,
    event::Version,
    store::{AppendError, AppendOutcome, Committed, EventStore, PersistableEvent, StoredEvent, StreamKey},
};

type InMemoryStream<Id> = Vec<StoredEvent<Id>>;

/// In-memory event store that keeps streams in a hash map.
///
/// Cloning the store shares the underlying streams. The version check and the
/// write happen under a single write lock, so appends to the same stream are
/// serialized.
#[derive(Clone, Debug)]
pub struct Store<Id> {
    inner: Arc<RwLock<HashMap<StreamKey<Id>, InMemoryStream<Id>>>>,
}

impl<Id> Store<Id> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<Id> Default for Store<Id> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id> Store<Id>
where
    Id: Clone + Eq + Hash,
{
    /// Number of streams holding at least one event.
    #[must_use]
    pub fn stream_count(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Total number of events across all streams.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }
}

impl<Id> EventStore for Store<Id>
where
    Id: Clone + Eq + Hash + std::fmt::Debug + Send + Sync + 'static,
{
    type Error = Infallible;
    type Id = Id;

    #[tracing::instrument(skip(self, key), fields(stream = ?key))]
    fn stream_version<'a>(
        &'a self,
        key: &'a StreamKey<Self::Id>,
    ) -> impl Future<Output = Result<Version, Self::Error>> + Send + 'a {
        let version = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .and_then(|stream| stream.last().map(|event| event.version))
            .unwrap_or(0);
        tracing::trace!(version, "retrieved stream version");
        std::future::ready(Ok(version))
    }

    #[tracing::instrument(
        skip(self, key, events),
        fields(stream = ?key, event_count = events.len())
    )]
    fn append<'a>(
        &'a self,
        key: &'a StreamKey<Self::Id>,
        events: NonEmpty<PersistableEvent>,
        expected: ExpectedVersion,
    ) -> impl Future<Output = AppendOutcome<Self::Id, Self::Error>> + Send + 'a {
        let result = (|| {
            let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            let stream = inner.entry(key.clone()).or_default();
            let current = stream.last().map_or(0, |event| event.version);

            if let Err(mismatch) = expected.check(current) {
                tracing::debug!(?expected, current, "version mismatch, rejecting append");
                if stream.is_empty() {
                    inner.remove(key);
                }
                return Err(AppendError::from(mismatch));
            }

            let mut version = current;
            let stored = events.map(|event| {
                version += 1;
                StoredEvent::from_persistable(key, version, event)
            });
            stream.extend(stored.iter().cloned());
            drop(inner);

            tracing::debug!(
                first_version = stored.head.version,
                last_version = stored.last().version,
                "events appended to stream"
            );
            Ok(Committed { events: stored })
        })();

        std::future::ready(result)
    }

    #[tracing::instrument(skip(self, key), fields(stream = ?key))]
    fn read<'a>(
        &'a self,
        key: &'a StreamKey<Self::Id>,
        from_version: Version,
    ) -> impl Future<Output = Result<Vec<StoredEvent<Self::Id>>, Self::Error>> + Send + 'a {
        let events: Vec<_> = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(|stream| {
                stream
                    .iter()
                    .filter(|event| event.version > from_version)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        tracing::debug!(events_loaded = events.len(), "loaded events from stream");
        std::future::ready(Ok(events))
    }
}
