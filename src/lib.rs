#![doc = include_str!("../README.md")]

pub mod article;
pub mod comment;
pub mod read_model;
pub mod validation;

#[cfg(feature = "test-util")]
pub use moderation_core::test;
pub use moderation_core::{
    aggregate,
    aggregate::{Aggregate, AggregateRoot, Apply, GuardViolation, Handle, Transition},
    concurrency,
    concurrency::{ConcurrencyConflict, ExpectedVersion, Optimistic, StreamExists, Unchecked},
    dispatch, event,
    event::{Context, DomainEvent, EventDecodeError, EventKind, EventMetadata, ProjectionEvent},
    impl_aggregate, projection,
    projection::{Projection, ProjectionFailure, ReadModelStore},
    repository,
    repository::{CommandError, Repository, RepositoryError},
};

/// Identifies the user issuing a command.
pub type ActorId = uuid::Uuid;

pub mod store {

    pub use moderation_core::store::{
        EventStore, NonEmpty, PersistableEvent, StoredEvent, StreamKey,
    };

    // Re-export low-level append types for EventStore implementors only.
    // Most users should interact with the Repository API instead.
    #[doc(hidden)]
    pub use moderation_core::store::{AppendError, AppendOutcome, Committed};

    #[cfg(feature = "postgres")]
    #[cfg_attr(docsrs, doc(cfg(feature = "postgres")))]
    pub mod postgres {
        pub use moderation_postgres::{Error, Store};
    }

    pub use moderation_core::store::inmemory;
}
