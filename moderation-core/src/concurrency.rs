//! Expected versions and compile-time concurrency strategy selection.
//!
//! Every append carries an [`ExpectedVersion`]. The repository derives it from
//! the version an aggregate was loaded at, unless the repository was switched
//! to the [`Unchecked`] strategy.
//!
//! # Example
//!
//! ```ignore
//! // Default: optimistic concurrency (safe)
//! let repo = Repository::new(store);
//!
//! // Opt-out for single-writer scenarios
//! let repo = Repository::new(store).without_concurrency_checking();
//! ```

use thiserror::Error;

use crate::event::Version;

/// Precondition on the current stream version, checked atomically on append.
///
/// Has no `Default`; [`ExpectedVersion::Any`] is always chosen explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// No check - last writer wins.
    Any,
    /// The stream must not exist yet. Used when creating an aggregate.
    NoStream,
    /// The stream must be at exactly this version.
    Exact(Version),
}

impl ExpectedVersion {
    /// Check `current` against this expectation.
    ///
    /// # Errors
    ///
    /// Returns [`VersionMismatch::Conflict`] if an exact version does not
    /// match, or [`VersionMismatch::AlreadyExists`] if a new stream was
    /// expected but events are present.
    pub const fn check(self, current: Version) -> Result<(), VersionMismatch> {
        match self {
            Self::Any => Ok(()),
            Self::NoStream if current == 0 => Ok(()),
            Self::NoStream => Err(VersionMismatch::AlreadyExists(StreamExists {
                actual: current,
            })),
            Self::Exact(expected) if expected == current => Ok(()),
            Self::Exact(expected) => Err(VersionMismatch::Conflict(ConcurrencyConflict {
                expected,
                actual: current,
            })),
        }
    }
}

/// Outcome of a failed [`ExpectedVersion::check`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionMismatch {
    #[error(transparent)]
    Conflict(#[from] ConcurrencyConflict),
    #[error(transparent)]
    AlreadyExists(#[from] StreamExists),
}

/// No version checking - last writer wins.
///
/// Events are appended without checking whether other events were added
/// since loading. Suitable for single-writer scenarios only.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unchecked;

/// Optimistic concurrency control - version checked on every write.
///
/// This is the default concurrency strategy for
/// [`Repository`](crate::repository::Repository). The repository appends with
/// the version the aggregate was loaded at, or expects a new stream when
/// nothing was loaded.
#[derive(Debug, Clone, Copy, Default)]
pub struct Optimistic;

/// Sealed trait for concurrency strategy markers.
pub trait ConcurrencyStrategy: private::Sealed + Default + Send + Sync {
    /// Whether this strategy checks versions before appending.
    const CHECK_VERSION: bool;

    /// The expected version to append with after loading at `loaded`.
    #[must_use]
    fn expected_after_load(loaded: Version) -> ExpectedVersion {
        if !Self::CHECK_VERSION {
            ExpectedVersion::Any
        } else if loaded == 0 {
            ExpectedVersion::NoStream
        } else {
            ExpectedVersion::Exact(loaded)
        }
    }
}

impl ConcurrencyStrategy for Unchecked {
    const CHECK_VERSION: bool = false;
}

impl ConcurrencyStrategy for Optimistic {
    const CHECK_VERSION: bool = true;
}

mod private {
    pub trait Sealed {}
    impl Sealed for super::Unchecked {}
    impl Sealed for super::Optimistic {}
}

/// Another writer appended to the stream since the expected version was read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "concurrency conflict: expected version {expected}, found {actual} (hint: stream was \
     modified; reload and retry)"
)]
pub struct ConcurrencyConflict {
    /// The version we expected (from when we loaded the aggregate).
    pub expected: Version,
    /// The actual current version in the store.
    pub actual: Version,
}

/// A create was attempted against a stream that already has events.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "stream already exists at version {actual} (hint: another process created this aggregate)"
)]
pub struct StreamExists {
    pub actual: Version,
}
