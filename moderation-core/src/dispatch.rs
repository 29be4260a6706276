//! Synchronous delivery of committed events to projections.
//!
//! The [`Dispatcher`] keeps one type-erased handler per registered projection,
//! indexed by the event kinds the projection's aggregate can emit. The
//! repository hands it every batch it commits, on the same call stack.

use std::{collections::HashMap, fmt};

use crate::{
    aggregate::Aggregate,
    event::ProjectionEvent,
    projection::{FoldError, Projection, ProjectionFailure, ReadModelStore, fold},
    store::StoredEvent,
};

type EventHandler<Id> =
    Box<dyn Fn(&StoredEvent<Id>) -> Result<(), ProjectionFailure> + Send + Sync>;

struct Subscriber<Id> {
    projection: &'static str,
    aggregate_kind: &'static str,
    handle: EventHandler<Id>,
}

/// Routes stored events to the projections registered for their kind.
pub struct Dispatcher<Id> {
    /// Event kind -> subscribers, in registration order.
    handlers: HashMap<&'static str, Vec<Subscriber<Id>>>,
    projections: Vec<&'static str>,
}

impl<Id> Default for Dispatcher<Id> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id> fmt::Debug for Dispatcher<Id> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("projections", &self.projections)
            .finish_non_exhaustive()
    }
}

impl<Id> Dispatcher<Id> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            projections: Vec::new(),
        }
    }

    /// Names of the registered projections, in registration order.
    #[must_use]
    pub fn projections(&self) -> &[&'static str] {
        &self.projections
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.projections.is_empty()
    }
}

impl<Id> Dispatcher<Id>
where
    Id: fmt::Debug + 'static,
{
    /// Register a projection writing into `read_store`.
    ///
    /// The projection receives every event kind its aggregate's event enum
    /// declares.
    pub fn register<P, R>(&mut self, read_store: R)
    where
        P: Projection + 'static,
        P::Aggregate: Aggregate<Id = Id>,
        <P::Aggregate as Aggregate>::Event: ProjectionEvent,
        R: ReadModelStore<Id, P::Row> + 'static,
    {
        let read_store = std::sync::Arc::new(read_store);
        for &kind in <<P::Aggregate as Aggregate>::Event as ProjectionEvent>::EVENT_KINDS {
            let read_store = std::sync::Arc::clone(&read_store);
            self.handlers.entry(kind).or_default().push(Subscriber {
                projection: P::NAME,
                aggregate_kind: <P::Aggregate as Aggregate>::KIND,
                handle: Box::new(move |stored: &StoredEvent<Id>| {
                    deliver::<P, R>(&*read_store, stored)
                }),
            });
        }
        self.projections.push(P::NAME);
        tracing::debug!(projection = P::NAME, "projection registered");
    }

    /// Deliver a batch in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first [`ProjectionFailure`]; later events of the batch are
    /// not delivered.
    pub fn dispatch<'a, I>(&self, events: I) -> Result<(), ProjectionFailure>
    where
        I: IntoIterator<Item = &'a StoredEvent<Id>>,
        Id: 'a,
    {
        for stored in events {
            let Some(subscribers) = self.handlers.get(stored.kind.as_str()) else {
                continue;
            };
            for subscriber in subscribers
                .iter()
                .filter(|s| s.aggregate_kind == stored.aggregate_kind)
            {
                tracing::trace!(
                    projection = subscriber.projection,
                    kind = %stored.kind,
                    version = stored.version,
                    "delivering event"
                );
                (subscriber.handle)(stored).inspect_err(|error| {
                    tracing::warn!(
                        projection = subscriber.projection,
                        %error,
                        "projection failed, stopping delivery"
                    );
                })?;
            }
        }
        Ok(())
    }
}

fn deliver<P, R>(
    read_store: &R,
    stored: &StoredEvent<<P::Aggregate as Aggregate>::Id>,
) -> Result<(), ProjectionFailure>
where
    P: Projection,
    <P::Aggregate as Aggregate>::Id: fmt::Debug,
    <P::Aggregate as Aggregate>::Event: ProjectionEvent,
    R: ReadModelStore<<P::Aggregate as Aggregate>::Id, P::Row>,
{
    let stream = || format!("{}/{:?}", stored.aggregate_kind, stored.aggregate_id);

    let event = <<P::Aggregate as Aggregate>::Event as ProjectionEvent>::from_stored(
        &stored.kind,
        &stored.data,
    )
    .map_err(|source| ProjectionFailure::Decode {
        projection: P::NAME,
        stream: stream(),
        version: stored.version,
        source,
    })?;

    let upsert = P::project(&stored.aggregate_id, &event, &stored.metadata);

    let folded = read_store
        .modify(&stored.aggregate_id, |slot| fold(slot, stored.version, upsert))
        .map_err(|error| ProjectionFailure::Store {
            projection: P::NAME,
            source: Box::new(error),
        })?;

    match folded {
        Ok(applied) => {
            tracing::trace!(projection = P::NAME, ?applied, "event folded");
            Ok(())
        }
        Err(FoldError::MissingRow) => Err(ProjectionFailure::MissingRow {
            projection: P::NAME,
            stream: stream(),
            version: stored.version,
        }),
        Err(FoldError::Gap { expected }) => Err(ProjectionFailure::Gap {
            projection: P::NAME,
            stream: stream(),
            expected,
            received: stored.version,
        }),
    }
}
