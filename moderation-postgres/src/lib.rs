//! Postgres-backed event store for the moderation workflow.
//!
//! [`Store`] implements [`moderation_core::store::EventStore`] on top of two
//! tables:
//!
//! - `es_streams` holds one row per stream with its current version and is
//!   locked `FOR UPDATE` while appending, which serializes writers per stream.
//! - `es_events` holds the events, unique on `(aggregate_kind, aggregate_id,
//!   version)`.
//!
//! Call [`Store::migrate`] on startup to create the schema.

mod error;
pub mod store;

pub use error::Error;
pub use store::Store;
