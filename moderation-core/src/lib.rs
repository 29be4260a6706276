//! Core traits and types for the moderation event-sourcing engine.
//!
//! This crate provides the foundational abstractions:
//!
//! - [`aggregate`] - Command-side primitives (`Aggregate`, `Apply`, `Handle`,
//!   `AggregateRoot`, state guards)
//! - [`event`] - Event traits and the persisted event envelope
//! - [`concurrency`] - Expected versions, concurrency strategy markers and
//!   conflict errors
//! - [`store`] - Event persistence abstraction (`EventStore`) and an in-memory
//!   implementation
//! - [`repository`] - Aggregate lifecycle: load, store, execute
//! - [`projection`] - Read-side reducers and read-model storage
//! - [`dispatch`] - Synchronous delivery of committed events to projections
//! - [`impl_aggregate!`] - Event enum and `Aggregate` impl for a domain type
//!
//! # Example
//!
//! ```
//! use moderation_core::{repository::Repository, store::inmemory};
//!
//! let store: inmemory::Store<String> = inmemory::Store::new();
//! let repo = Repository::new(store);
//! ```
//!
//! Most users should depend on the `moderation` crate, which re-exports these
//! types alongside the article and comment aggregates.

pub mod aggregate;
pub mod concurrency;
pub mod dispatch;
pub mod event;
mod macros;
pub mod projection;
pub mod repository;
pub mod store;

#[doc(hidden)]
pub mod __private {
    pub use serde_json;
}
