//! Command-side domain primitives.
//!
//! This module defines the building blocks for aggregates: state reconstruction
//! (`Apply`), command handling (`Handle`), state-machine guards
//! (`Transition`, [`guard`]) and the unit-of-work wrapper [`AggregateRoot`]
//! that buffers events until the repository stores them.

use std::fmt;

use thiserror::Error;

use crate::event::{Context, EventMetadata, Version};

/// Command-side entities that produce domain events.
///
/// Aggregates rebuild their state from events (`Apply<E>`) and validate
/// commands via [`Handle<C>`]. State is derived exclusively by folding events
/// through [`Aggregate::apply`], both while handling commands and during
/// replay.
// ANCHOR: aggregate_trait
pub trait Aggregate: Default + Sized {
    /// Aggregate type identifier used by the event store.
    ///
    /// This is combined with the aggregate ID to create stream identifiers.
    /// Use lowercase, kebab-case for consistency: `"article"`, `"comment"`.
    const KIND: &'static str;

    type Event;
    type Error;
    type Id;

    /// Apply an event to update aggregate state.
    ///
    /// Implementations match exhaustively on the event enum and dispatch to
    /// the per-event [`Apply`] impls. Must be total and free of side effects
    /// beyond the aggregate's own fields.
    fn apply(&mut self, event: &Self::Event);
}
// ANCHOR_END: aggregate_trait

/// Mutate an aggregate with a domain event.
///
/// ```ignore
/// impl Apply<CommentApproved> for Comment {
///     fn apply(&mut self, _event: &CommentApproved) {
///         self.state = CommentState::Approved;
///     }
/// }
/// ```
// ANCHOR: apply_trait
pub trait Apply<E> {
    fn apply(&mut self, event: &E);
}
// ANCHOR_END: apply_trait

/// Entry point for command handling.
///
/// Each command type gets its own implementation. Handlers are pure: they
/// inspect the current state and return the events the command emits, without
/// touching state themselves.
// ANCHOR: handle_trait
pub trait Handle<C>: Aggregate {
    /// Handle a command and produce events.
    ///
    /// # Errors
    ///
    /// Returns `Self::Error` if the command is invalid for the current
    /// aggregate state.
    fn handle(&self, command: &C) -> Result<Vec<Self::Event>, Self::Error>;
}
// ANCHOR_END: handle_trait

/// Allowed source states of a command, fixed at compile time.
///
/// ```ignore
/// impl Transition<ArticleState> for Publish {
///     const NAME: &'static str = "publish";
///     const FROM: &'static [ArticleState] = &[ArticleState::Review];
/// }
/// ```
pub trait Transition<S: 'static> {
    /// Command name used in guard violation messages.
    const NAME: &'static str;
    /// States from which the command may run.
    const FROM: &'static [S];
}

/// A command was issued from a state outside its allowed source set.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("cannot {command} in state `{state}`")]
pub struct GuardViolation<S: fmt::Display + fmt::Debug + 'static> {
    pub command: &'static str,
    pub state: S,
    pub allowed: &'static [S],
}

/// Check that `state` is one of `C::FROM`.
///
/// # Errors
///
/// Returns [`GuardViolation`] naming the command and the offending state.
pub fn guard<C, S>(state: S) -> Result<(), GuardViolation<S>>
where
    C: Transition<S>,
    S: PartialEq + fmt::Display + fmt::Debug + 'static,
{
    if C::FROM.contains(&state) {
        Ok(())
    } else {
        Err(GuardViolation {
            command: C::NAME,
            state,
            allowed: C::FROM,
        })
    }
}

/// An event produced by a command but not yet persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingEvent<E> {
    pub event: E,
    pub metadata: EventMetadata,
}

/// Unit of work around one aggregate instance.
///
/// Holds the aggregate state, the stream version it was hydrated at and the
/// events produced since. The buffer is cleared only when the repository
/// commits it; a failed store leaves it untouched.
pub struct AggregateRoot<A: Aggregate> {
    id: A::Id,
    state: A,
    version: Version,
    pending: Vec<PendingEvent<A::Event>>,
    context: Context,
}

impl<A: Aggregate> AggregateRoot<A> {
    /// A root for a stream with no events.
    pub fn new(id: A::Id) -> Self {
        Self::from_history(id, A::default(), 0)
    }

    pub(crate) fn from_history(id: A::Id, state: A, version: Version) -> Self {
        Self {
            id,
            state,
            version,
            pending: Vec::new(),
            context: Context::default(),
        }
    }

    /// Attach correlation and causation identifiers to subsequent events.
    #[must_use]
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn set_context(&mut self, context: Context) {
        self.context = context;
    }

    pub const fn id(&self) -> &A::Id {
        &self.id
    }

    pub const fn state(&self) -> &A {
        &self.state
    }

    /// Version of the last persisted event folded into this root.
    pub const fn version(&self) -> Version {
        self.version
    }

    /// `true` when the root was loaded from an empty stream and nothing has
    /// been stored since.
    pub const fn is_new(&self) -> bool {
        self.version == 0
    }

    pub fn pending(&self) -> &[PendingEvent<A::Event>] {
        &self.pending
    }

    pub fn pending_events(&self) -> impl Iterator<Item = &A::Event> {
        self.pending.iter().map(|pending| &pending.event)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Run a command: validate, apply the emitted events, buffer them.
    ///
    /// # Errors
    ///
    /// Returns the aggregate's error if the handler rejects the command; state
    /// and buffer are unchanged in that case.
    pub fn execute<C>(&mut self, command: &C) -> Result<(), A::Error>
    where
        A: Handle<C>,
    {
        let events = self.state.handle(command)?;
        tracing::trace!(
            aggregate_kind = A::KIND,
            emitted = events.len(),
            "command handled"
        );
        for event in events {
            self.state.apply(&event);
            self.pending.push(PendingEvent {
                event,
                metadata: self.context.stamp(),
            });
        }
        Ok(())
    }

    /// Mark the buffer as persisted up to `version`.
    pub(crate) fn commit(&mut self, version: Version) {
        self.pending.clear();
        self.version = version;
    }

    /// Consume the root and return the aggregate state.
    pub fn into_inner(self) -> A {
        self.state
    }
}

impl<A> fmt::Debug for AggregateRoot<A>
where
    A: Aggregate + fmt::Debug,
    A::Id: fmt::Debug,
    A::Event: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateRoot")
            .field("kind", &A::KIND)
            .field("id", &self.id)
            .field("version", &self.version)
            .field("state", &self.state)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    enum Door {
        #[default]
        Unknown,
        Open,
        Closed,
    }

    impl fmt::Display for Door {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let name = match self {
                Self::Unknown => "unknown",
                Self::Open => "open",
                Self::Closed => "closed",
            };
            f.write_str(name)
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum DoorEvent {
        Installed,
        Closed,
    }

    #[derive(Debug, Default)]
    struct Gate {
        state: Door,
        closings: u32,
    }

    impl Aggregate for Gate {
        type Error = GuardViolation<Door>;
        type Event = DoorEvent;
        type Id = u32;

        const KIND: &'static str = "gate";

        fn apply(&mut self, event: &Self::Event) {
            match event {
                DoorEvent::Installed => self.state = Door::Open,
                DoorEvent::Closed => {
                    self.state = Door::Closed;
                    self.closings += 1;
                }
            }
        }
    }

    struct Install;
    struct Close;

    impl Transition<Door> for Install {
        const FROM: &'static [Door] = &[Door::Unknown];
        const NAME: &'static str = "install";
    }

    impl Transition<Door> for Close {
        const FROM: &'static [Door] = &[Door::Open];
        const NAME: &'static str = "close";
    }

    impl Handle<Install> for Gate {
        fn handle(&self, _: &Install) -> Result<Vec<Self::Event>, Self::Error> {
            guard::<Install, _>(self.state)?;
            Ok(vec![DoorEvent::Installed])
        }
    }

    impl Handle<Close> for Gate {
        fn handle(&self, _: &Close) -> Result<Vec<Self::Event>, Self::Error> {
            guard::<Close, _>(self.state)?;
            Ok(vec![DoorEvent::Closed])
        }
    }

    #[test]
    fn guard_accepts_allowed_state() {
        assert!(guard::<Close, _>(Door::Open).is_ok());
    }

    #[test]
    fn guard_reports_command_and_state() {
        let err = guard::<Close, _>(Door::Closed).unwrap_err();
        assert_eq!(err.command, "close");
        assert_eq!(err.state, Door::Closed);
        assert_eq!(err.allowed, &[Door::Open]);
        assert_eq!(err.to_string(), "cannot close in state `closed`");
    }

    #[test]
    fn execute_applies_and_buffers_events() {
        let mut root = AggregateRoot::<Gate>::new(7);
        root.execute(&Install).unwrap();
        root.execute(&Close).unwrap();

        assert_eq!(root.state().state, Door::Closed);
        assert_eq!(root.state().closings, 1);
        assert_eq!(
            root.pending_events().cloned().collect::<Vec<_>>(),
            vec![DoorEvent::Installed, DoorEvent::Closed]
        );
        assert_eq!(root.version(), 0);
        assert!(root.is_new());
    }

    #[test]
    fn rejected_command_leaves_root_untouched() {
        let mut root = AggregateRoot::<Gate>::new(7);
        root.execute(&Install).unwrap();

        let err = root.execute(&Install).unwrap_err();

        assert_eq!(err.state, Door::Open);
        assert_eq!(root.state().state, Door::Open);
        assert_eq!(root.pending().len(), 1);
    }

    #[test]
    fn context_is_stamped_on_pending_events() {
        let mut root =
            AggregateRoot::<Gate>::new(1).with_context(Context::correlated("req-42"));
        root.execute(&Install).unwrap();

        assert_eq!(
            root.pending()[0].metadata.correlation_id.as_deref(),
            Some("req-42")
        );
    }

    #[test]
    fn commit_clears_buffer_and_advances_version() {
        let mut root = AggregateRoot::<Gate>::new(1);
        root.execute(&Install).unwrap();
        root.execute(&Close).unwrap();

        root.commit(2);

        assert!(!root.has_pending());
        assert_eq!(root.version(), 2);
        assert!(!root.is_new());
        assert_eq!(root.into_inner().state, Door::Closed);
    }
}
