//! Read-side primitives.
//!
//! A [`Projection`] is a pure reducer from one aggregate event to an
//! [`Upsert`] of a denormalized row. Rows live in a [`ReadModelStore`] as
//! [`Versioned`] values so that redelivered events are skipped and gaps are
//! detected. The [`Dispatcher`](crate::dispatch::Dispatcher) drives
//! projections after every successful store.
use std::{error::Error as StdError, fmt};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    aggregate::Aggregate,
    event::{EventDecodeError, EventMetadata, Version},
};

pub mod inmemory;

/// Partial update of a read-model row.
///
/// Only the fields present in the patch are written.
pub trait Patch<Row> {
    fn apply_to(self, row: &mut Row);
}

/// Outcome of projecting one event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Upsert<Row, P> {
    /// Create the row, replacing it if present.
    Insert(Row),
    /// Patch an existing row.
    Update(P),
    /// The event does not touch this read model.
    Ignore,
}

/// Pure reducer mapping aggregate events onto a read-model row.
///
/// ```ignore
/// impl Projection for CommentProjection {
///     const NAME: &'static str = "comment-view";
///     type Aggregate = Comment;
///     type Row = CommentView;
///     type Patch = CommentPatch;
///
///     fn project(_id: &Uuid, event: &CommentEvent, _: &EventMetadata) -> Upsert<CommentView, CommentPatch> {
///         match event {
///             CommentEvent::Approved(_) => Upsert::Update(CommentPatch::state(CommentState::Approved)),
///             // ...
///         }
///     }
/// }
/// ```
// ANCHOR: projection_trait
pub trait Projection {
    /// Stable identifier for this projection, used in logs and errors.
    const NAME: &'static str;

    type Aggregate: Aggregate;
    type Row;
    type Patch: Patch<Self::Row>;

    fn project(
        id: &<Self::Aggregate as Aggregate>::Id,
        event: &<Self::Aggregate as Aggregate>::Event,
        metadata: &EventMetadata,
    ) -> Upsert<Self::Row, Self::Patch>;
}
// ANCHOR_END: projection_trait

/// A read-model row together with the last stream version folded into it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<Row> {
    pub version: Version,
    pub row: Row,
}

/// Storage for read-model rows keyed by aggregate id.
///
/// `modify` must run the closure atomically with respect to other calls for
/// the same id.
pub trait ReadModelStore<Id, Row>: Send + Sync {
    type Error: StdError + Send + Sync + 'static;

    /// Fetch a row.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when the lookup fails.
    fn get(&self, id: &Id) -> Result<Option<Versioned<Row>>, Self::Error>;

    /// Read-modify-write a row slot.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error when the row cannot be read or written.
    fn modify<T, F>(&self, id: &Id, f: F) -> Result<T, Self::Error>
    where
        F: FnOnce(&mut Option<Versioned<Row>>) -> T;
}

/// How an event landed on a row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    Updated,
    Ignored,
    /// Already folded in by an earlier delivery.
    Duplicate,
}

/// Ordering violation found while folding an event into a row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FoldError {
    MissingRow,
    Gap { expected: Version },
}

/// Fold one projected event into a row slot.
///
/// Events at or below the row's version are skipped. An `Update` requires the
/// row to exist and the event to be the row's immediate successor.
///
/// # Errors
///
/// Returns [`FoldError`] when the event cannot be applied in order.
pub fn fold<Row, P>(
    slot: &mut Option<Versioned<Row>>,
    version: Version,
    upsert: Upsert<Row, P>,
) -> Result<Applied, FoldError>
where
    P: Patch<Row>,
{
    let Some(current) = slot.as_mut() else {
        return match upsert {
            Upsert::Insert(row) => {
                *slot = Some(Versioned { version, row });
                Ok(Applied::Inserted)
            }
            Upsert::Update(_) => Err(FoldError::MissingRow),
            Upsert::Ignore => Ok(Applied::Ignored),
        };
    };

    if version <= current.version {
        return Ok(Applied::Duplicate);
    }
    if version != current.version + 1 {
        return Err(FoldError::Gap {
            expected: current.version + 1,
        });
    }

    current.version = version;
    match upsert {
        Upsert::Insert(row) => {
            current.row = row;
            Ok(Applied::Inserted)
        }
        Upsert::Update(patch) => {
            patch.apply_to(&mut current.row);
            Ok(Applied::Updated)
        }
        Upsert::Ignore => Ok(Applied::Ignored),
    }
}

/// A projection could not fold a committed event into its read model.
///
/// The event is durable; repair by redelivering the stream.
#[derive(Debug, Error)]
pub enum ProjectionFailure {
    #[error("projection `{projection}` failed to decode {stream} v{version}: {source}")]
    Decode {
        projection: &'static str,
        stream: String,
        version: Version,
        #[source]
        source: EventDecodeError,
    },
    #[error("projection `{projection}` has no row for {stream} at v{version}")]
    MissingRow {
        projection: &'static str,
        stream: String,
        version: Version,
    },
    #[error("projection `{projection}` expected {stream} v{expected}, received v{received}")]
    Gap {
        projection: &'static str,
        stream: String,
        expected: Version,
        received: Version,
    },
    #[error("projection `{projection}` read model store failed: {source}")]
    Store {
        projection: &'static str,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl ProjectionFailure {
    #[must_use]
    pub const fn projection(&self) -> &'static str {
        match self {
            Self::Decode { projection, .. }
            | Self::MissingRow { projection, .. }
            | Self::Gap { projection, .. }
            | Self::Store { projection, .. } => *projection,
        }
    }

    /// Stream version to re-read from when the row is merely behind the
    /// stream, as happens when another writer's delivery has not landed yet.
    ///
    /// `None` for failures that re-reading cannot repair.
    #[must_use]
    pub const fn resume_after(&self) -> Option<Version> {
        match self {
            Self::MissingRow { .. } => Some(0),
            Self::Gap { expected, .. } => Some(expected.saturating_sub(1)),
            Self::Decode { .. } | Self::Store { .. } => None,
        }
    }
}

/// Read-model row looked up by id does not exist.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("no read model row for {id}")]
pub struct RowNotFound {
    pub id: String,
}

impl RowNotFound {
    pub fn new(id: &impl fmt::Debug) -> Self {
        Self {
            id: format!("{id:?}"),
        }
    }
}
