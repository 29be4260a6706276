//! Application service orchestration.
//!
//! `Repository` coordinates loading aggregates into an [`AggregateRoot`],
//! appending their pending events to the store and dispatching the committed
//! events to registered projections.
//!
//! Concurrency checking is type-level: the default [`Optimistic`] repository
//! derives the expected version from the loaded root, while a repository built
//! with [`Repository::without_concurrency_checking`] appends with
//! [`ExpectedVersion::Any`].

use std::{any, fmt, marker::PhantomData};

use nonempty::NonEmpty;
use thiserror::Error;

use crate::{
    aggregate::{Aggregate, AggregateRoot, Handle, PendingEvent},
    concurrency::{
        ConcurrencyConflict, ConcurrencyStrategy, ExpectedVersion, Optimistic, StreamExists,
        Unchecked,
    },
    dispatch::Dispatcher,
    event::{Context, EventDecodeError, ProjectionEvent, SerializableEvent, Version},
    projection::{Projection, ProjectionFailure, ReadModelStore},
    store::{AppendError, EventStore, PersistableEvent, StoredEvent, StreamKey},
};

/// Error type for loading and storing aggregates.
#[derive(Debug, Error)]
pub enum RepositoryError<StoreError>
where
    StoreError: std::error::Error + 'static,
{
    #[error(transparent)]
    Conflict(ConcurrencyConflict),
    #[error(transparent)]
    AlreadyExists(StreamExists),
    #[error("stream {stream} not found")]
    NotFound { stream: String },
    #[error("failed to decode stored event: {0}")]
    Decode(#[source] EventDecodeError),
    #[error("failed to encode event: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("event store failed: {0}")]
    Store(#[source] StoreError),
    /// The events were committed but a projection could not apply them.
    #[error("events committed up to version {committed}, but a projection failed: {source}")]
    Projection {
        committed: Version,
        #[source]
        source: ProjectionFailure,
    },
}

impl<StoreError> RepositoryError<StoreError>
where
    StoreError: std::error::Error + 'static,
{
    /// `true` for errors that a reload-and-retry may resolve.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl<StoreError> From<AppendError<StoreError>> for RepositoryError<StoreError>
where
    StoreError: std::error::Error + 'static,
{
    fn from(error: AppendError<StoreError>) -> Self {
        match error {
            AppendError::Conflict(conflict) => Self::Conflict(conflict),
            AppendError::AlreadyExists(exists) => Self::AlreadyExists(exists),
            AppendError::Store(error) => Self::Store(error),
        }
    }
}

/// Error type for load-execute-save in one call.
#[derive(Debug, Error)]
pub enum CommandError<AggregateError, StoreError>
where
    StoreError: std::error::Error + 'static,
{
    #[error("aggregate rejected command: {0}")]
    Aggregate(AggregateError),
    #[error(transparent)]
    Repository(#[from] RepositoryError<StoreError>),
}

impl<AggregateError, StoreError> CommandError<AggregateError, StoreError>
where
    StoreError: std::error::Error + 'static,
{
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Repository(error) if error.is_conflict())
    }
}

/// Result type alias for loading an aggregate.
pub type LoadResult<A, S> = Result<AggregateRoot<A>, RepositoryError<<S as EventStore>::Error>>;

/// Result type alias for storing; `Ok` carries the stream version.
pub type StoreResult<S> = Result<Version, RepositoryError<<S as EventStore>::Error>>;

/// Result type alias for command execution.
pub type CommandResult<A, S> = Result<
    AggregateRoot<A>,
    CommandError<<A as Aggregate>::Error, <S as EventStore>::Error>,
>;

/// Result type alias for retry operations; `Ok` carries the attempt count.
pub type RetryResult<A, S> =
    Result<usize, CommandError<<A as Aggregate>::Error, <S as EventStore>::Error>>;

fn encode<E>(
    pending: &[PendingEvent<E>],
) -> Result<Option<NonEmpty<PersistableEvent>>, serde_json::Error>
where
    E: SerializableEvent,
{
    let events = pending
        .iter()
        .map(|pending| {
            Ok(PersistableEvent {
                kind: pending.event.kind().to_string(),
                data: pending.event.to_data()?,
                metadata: pending.metadata.clone(),
            })
        })
        .collect::<Result<Vec<_>, serde_json::Error>>()?;
    Ok(NonEmpty::from_vec(events))
}

/// Repository.
pub struct Repository<S, C = Optimistic>
where
    S: EventStore,
    C: ConcurrencyStrategy,
{
    store: S,
    dispatcher: Dispatcher<S::Id>,
    _concurrency: PhantomData<C>,
}

impl<S, C> fmt::Debug for Repository<S, C>
where
    S: EventStore + fmt::Debug,
    C: ConcurrencyStrategy,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("store", &self.store)
            .field("dispatcher", &self.dispatcher)
            .field("concurrency", &any::type_name::<C>())
            .finish()
    }
}

impl<S> Repository<S>
where
    S: EventStore,
{
    #[must_use]
    pub fn new(store: S) -> Self {
        Self {
            store,
            dispatcher: Dispatcher::new(),
            _concurrency: PhantomData,
        }
    }

    /// Disable optimistic concurrency checking for this repository.
    #[must_use]
    pub fn without_concurrency_checking(self) -> Repository<S, Unchecked> {
        Repository {
            store: self.store,
            dispatcher: self.dispatcher,
            _concurrency: PhantomData,
        }
    }
}

impl<S, C> Repository<S, C>
where
    S: EventStore,
    C: ConcurrencyStrategy,
{
    #[must_use]
    pub const fn event_store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher<S::Id> {
        &self.dispatcher
    }

    /// Register a projection to run after every successful store.
    #[must_use]
    pub fn with_projection<P, R>(mut self, _projection: P, read_store: R) -> Self
    where
        P: Projection + 'static,
        P::Aggregate: Aggregate<Id = S::Id>,
        <P::Aggregate as Aggregate>::Event: ProjectionEvent,
        R: ReadModelStore<S::Id, P::Row> + 'static,
    {
        self.dispatcher.register::<P, R>(read_store);
        self
    }

    /// Load an aggregate by replaying its stream from the start.
    ///
    /// An empty stream yields a fresh root at version `0`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Store`] if the store fails to read, or
    /// [`RepositoryError::Decode`] if a stored event cannot be decoded into
    /// the aggregate's event enum.
    #[tracing::instrument(skip(self, id), fields(aggregate_kind = A::KIND, aggregate_id = ?id))]
    pub async fn load<A>(&self, id: &S::Id) -> LoadResult<A, S>
    where
        A: Aggregate<Id = S::Id>,
        A::Event: ProjectionEvent,
    {
        let key = StreamKey::new(A::KIND, id.clone());
        let events = self
            .store
            .read(&key, 0)
            .await
            .map_err(RepositoryError::Store)?;

        let mut state = A::default();
        let mut version = 0;
        for stored in &events {
            let event = A::Event::from_stored(&stored.kind, &stored.data)
                .map_err(RepositoryError::Decode)?;
            state.apply(&event);
            version = stored.version;
        }

        tracing::debug!(version, events = events.len(), "aggregate loaded");
        Ok(AggregateRoot::from_history(id.clone(), state, version))
    }

    /// Load an aggregate whose stream must already exist.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::NotFound`] for an empty stream, or any error
    /// from [`Repository::load`].
    pub async fn load_existing<A>(&self, id: &S::Id) -> LoadResult<A, S>
    where
        A: Aggregate<Id = S::Id>,
        A::Event: ProjectionEvent,
    {
        let root = self.load::<A>(id).await?;
        if root.is_new() {
            return Err(RepositoryError::NotFound {
                stream: format!("{}/{id:?}", A::KIND),
            });
        }
        Ok(root)
    }

    /// Append the root's pending events under `expected`, then dispatch them.
    ///
    /// An empty buffer is a no-op. On an append failure the root is left
    /// untouched. A read model that has not yet seen earlier events of the
    /// stream is caught up from the store before the batch lands on it. On a projection failure the events are already durable: the
    /// buffer is cleared, the root's version advanced and
    /// [`RepositoryError::Projection`] reports the committed version.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Conflict`] or
    /// [`RepositoryError::AlreadyExists`] when `expected` does not hold,
    /// [`RepositoryError::Encode`] or [`RepositoryError::Store`] when the
    /// events cannot be written, and [`RepositoryError::Projection`] as above.
    #[tracing::instrument(
        skip(self, root),
        fields(
            aggregate_kind = A::KIND,
            aggregate_id = ?root.id(),
            pending = root.pending().len()
        )
    )]
    pub async fn store<A>(
        &self,
        root: &mut AggregateRoot<A>,
        expected: ExpectedVersion,
    ) -> StoreResult<S>
    where
        A: Aggregate<Id = S::Id>,
        A::Event: SerializableEvent,
    {
        let Some(batch) = encode(root.pending()).map_err(RepositoryError::Encode)? else {
            tracing::trace!("nothing pending");
            return Ok(root.version());
        };

        let key = StreamKey::new(A::KIND, root.id().clone());
        let committed = self
            .store
            .append(&key, batch, expected)
            .await
            .map_err(|error| {
                tracing::warn!(%error, ?expected, "append rejected");
                RepositoryError::from(error)
            })?;

        let version = committed.last_version();
        root.commit(version);
        tracing::debug!(version, "events committed");

        self.deliver(&key, &committed.events)
            .await
            .map_err(|source| {
                tracing::error!(
                    committed = version,
                    error = %source,
                    "projection failed after commit"
                );
                RepositoryError::Projection {
                    committed: version,
                    source,
                }
            })?;

        Ok(version)
    }

    /// Dispatch a freshly committed batch.
    ///
    /// A row found behind the stream means an earlier writer's delivery has
    /// not landed yet. The stream is re-read from the row's version and the
    /// backlog dispatched in order; events that writer delivers later are
    /// skipped as duplicates.
    async fn deliver(
        &self,
        key: &StreamKey<S::Id>,
        batch: &NonEmpty<StoredEvent<S::Id>>,
    ) -> Result<(), ProjectionFailure> {
        let Err(failure) = self.dispatcher.dispatch(batch.iter()) else {
            return Ok(());
        };
        let Some(after) = failure.resume_after() else {
            return Err(failure);
        };

        tracing::debug!(after, error = %failure, "read model behind stream, catching up");
        match self.store.read(key, after).await {
            Ok(backlog) => self.dispatcher.dispatch(&backlog),
            Err(error) => {
                tracing::warn!(%error, "catch-up read failed");
                Err(failure)
            }
        }
    }

    /// Store with the expected version derived from the root's loaded version.
    ///
    /// # Errors
    ///
    /// See [`Repository::store`].
    pub async fn save<A>(&self, root: &mut AggregateRoot<A>) -> StoreResult<S>
    where
        A: Aggregate<Id = S::Id>,
        A::Event: SerializableEvent,
    {
        let expected = C::expected_after_load(root.version());
        self.store(root, expected).await
    }

    /// Load, run one command and save.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Aggregate`] when the aggregate rejects the
    /// command, or [`CommandError::Repository`] for load and store failures.
    pub async fn execute<A, Cmd>(
        &self,
        id: &S::Id,
        command: &Cmd,
        context: &Context,
    ) -> CommandResult<A, S>
    where
        A: Aggregate<Id = S::Id> + Handle<Cmd>,
        A::Event: ProjectionEvent + SerializableEvent,
    {
        let mut root = self.load::<A>(id).await?.with_context(context.clone());
        root.execute(command).map_err(CommandError::Aggregate)?;
        self.save(&mut root).await?;
        Ok(root)
    }

    /// Re-read a stream from the start and dispatch every event again.
    ///
    /// Rows that already folded an event skip it, so this repairs read models
    /// after a [`RepositoryError::Projection`] without double-applying.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Store`] if the stream cannot be read, or
    /// [`RepositoryError::Projection`] if a projection fails again.
    #[tracing::instrument(skip(self, id), fields(aggregate_kind = A::KIND, aggregate_id = ?id))]
    pub async fn redeliver<A>(&self, id: &S::Id) -> StoreResult<S>
    where
        A: Aggregate<Id = S::Id>,
    {
        let key = StreamKey::new(A::KIND, id.clone());
        let events = self
            .store
            .read(&key, 0)
            .await
            .map_err(RepositoryError::Store)?;
        let version = events.last().map_or(0, |event| event.version);

        self.dispatcher
            .dispatch(&events)
            .map_err(|source| RepositoryError::Projection {
                committed: version,
                source,
            })?;

        tracing::debug!(version, events = events.len(), "stream redelivered");
        Ok(version)
    }
}

impl<S> Repository<S, Optimistic>
where
    S: EventStore,
{
    /// Execute a command, reloading and retrying on concurrency conflicts.
    ///
    /// # Errors
    ///
    /// Returns the last error if all retries are exhausted, or any
    /// non-conflict error immediately.
    pub async fn execute_with_retry<A, Cmd>(
        &self,
        id: &S::Id,
        command: &Cmd,
        context: &Context,
        max_retries: usize,
    ) -> RetryResult<A, S>
    where
        A: Aggregate<Id = S::Id> + Handle<Cmd>,
        A::Event: ProjectionEvent + SerializableEvent,
    {
        for attempt in 1..=max_retries {
            match self.execute::<A, Cmd>(id, command, context).await {
                Ok(_) => return Ok(attempt),
                Err(error) if error.is_conflict() => {
                    tracing::debug!(attempt, "concurrency conflict, retrying");
                }
                Err(error) => return Err(error),
            }
        }

        self.execute::<A, Cmd>(id, command, context)
            .await
            .map(|_| max_retries + 1)
    }
}

#[cfg(test)]
mod tests {
    use std::{error::Error, io};

    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::{
        aggregate::{GuardViolation, Transition, guard},
        event::{DomainEvent, EventKind, decode},
        projection::{Patch, Upsert, Versioned, inmemory as rows},
        store::inmemory,
    };

    #[test]
    fn command_error_display_mentions_aggregate() {
        let error: CommandError<String, io::Error> =
            CommandError::Aggregate("invalid state".to_string());
        let msg = error.to_string();
        assert!(msg.contains("aggregate rejected command"));
        assert!(error.source().is_none());
        assert!(!error.is_conflict());
    }

    #[test]
    fn repository_error_store_has_source() {
        let error: RepositoryError<io::Error> = RepositoryError::Store(io::Error::other("down"));
        assert!(error.source().is_some());
    }

    #[test]
    fn conflict_is_retryable() {
        let error: CommandError<String, io::Error> =
            RepositoryError::Conflict(ConcurrencyConflict {
                expected: 1,
                actual: 2,
            })
            .into();
        assert!(error.is_conflict());
        assert!(error.to_string().contains("expected version 1"));
    }

    // A minimal counter aggregate exercising the repository end to end.

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    struct Started;

    impl DomainEvent for Started {
        const KIND: &'static str = "counter.started";
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    struct Bumped {
        by: u32,
    }

    impl DomainEvent for Bumped {
        const KIND: &'static str = "counter.bumped";
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum CounterEvent {
        Started(Started),
        Bumped(Bumped),
    }

    impl EventKind for CounterEvent {
        fn kind(&self) -> &'static str {
            match self {
                Self::Started(_) => Started::KIND,
                Self::Bumped(_) => Bumped::KIND,
            }
        }
    }

    impl SerializableEvent for CounterEvent {
        fn to_data(&self) -> Result<serde_json::Value, serde_json::Error> {
            match self {
                Self::Started(e) => serde_json::to_value(e),
                Self::Bumped(e) => serde_json::to_value(e),
            }
        }
    }

    impl ProjectionEvent for CounterEvent {
        const EVENT_KINDS: &'static [&'static str] = &[Started::KIND, Bumped::KIND];

        fn from_stored(kind: &str, data: &serde_json::Value) -> Result<Self, EventDecodeError> {
            match kind {
                Started::KIND => decode(data).map(Self::Started),
                Bumped::KIND => decode(data).map(Self::Bumped),
                _ => Err(EventDecodeError::UnknownKind {
                    kind: kind.to_string(),
                    expected: Self::EVENT_KINDS,
                }),
            }
        }
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    enum Phase {
        #[default]
        Unknown,
        Running,
    }

    impl std::fmt::Display for Phase {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    #[derive(Debug, Default)]
    struct Counter {
        phase: Phase,
        total: u32,
    }

    impl Aggregate for Counter {
        type Error = GuardViolation<Phase>;
        type Event = CounterEvent;
        type Id = String;

        const KIND: &'static str = "counter";

        fn apply(&mut self, event: &Self::Event) {
            match event {
                CounterEvent::Started(_) => self.phase = Phase::Running,
                CounterEvent::Bumped(e) => self.total += e.by,
            }
        }
    }

    struct Start;
    struct Bump(u32);

    impl Transition<Phase> for Start {
        const FROM: &'static [Phase] = &[Phase::Unknown];
        const NAME: &'static str = "start";
    }

    impl Transition<Phase> for Bump {
        const FROM: &'static [Phase] = &[Phase::Running];
        const NAME: &'static str = "bump";
    }

    impl Handle<Start> for Counter {
        fn handle(&self, _: &Start) -> Result<Vec<Self::Event>, Self::Error> {
            guard::<Start, _>(self.phase)?;
            Ok(vec![CounterEvent::Started(Started)])
        }
    }

    impl Handle<Bump> for Counter {
        fn handle(&self, command: &Bump) -> Result<Vec<Self::Event>, Self::Error> {
            guard::<Bump, _>(self.phase)?;
            Ok(vec![CounterEvent::Bumped(Bumped { by: command.0 })])
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    struct Tally(u32);

    struct Add(u32);

    impl Patch<Tally> for Add {
        fn apply_to(self, row: &mut Tally) {
            row.0 += self.0;
        }
    }

    struct TallyProjection;

    impl Projection for TallyProjection {
        type Aggregate = Counter;
        type Patch = Add;
        type Row = Tally;

        const NAME: &'static str = "tally";

        fn project(
            _: &String,
            event: &CounterEvent,
            _: &crate::event::EventMetadata,
        ) -> Upsert<Tally, Add> {
            match event {
                CounterEvent::Started(_) => Upsert::Insert(Tally(0)),
                CounterEvent::Bumped(e) => Upsert::Update(Add(e.by)),
            }
        }
    }

    fn repo() -> Repository<inmemory::Store<String>> {
        Repository::new(inmemory::Store::new())
    }

    #[tokio::test]
    async fn load_of_empty_stream_is_new_root() {
        let root = repo().load::<Counter>(&"c1".to_string()).await.unwrap();
        assert!(root.is_new());
        assert_eq!(root.state().phase, Phase::Unknown);
    }

    #[tokio::test]
    async fn load_existing_of_empty_stream_is_not_found() {
        let err = repo()
            .load_existing::<Counter>(&"c1".to_string())
            .await
            .unwrap_err();
        assert!(
            matches!(err, RepositoryError::NotFound { ref stream } if stream.starts_with("counter/"))
        );
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let repo = repo();
        let id = "c1".to_string();
        let mut root = repo.load::<Counter>(&id).await.unwrap();
        root.execute(&Start).unwrap();
        root.execute(&Bump(3)).unwrap();
        root.execute(&Bump(4)).unwrap();

        assert_eq!(repo.save(&mut root).await.unwrap(), 3);
        assert!(!root.has_pending());

        let loaded = repo.load::<Counter>(&id).await.unwrap();
        assert_eq!(loaded.version(), 3);
        assert_eq!(loaded.state().total, 7);
        assert_eq!(loaded.state().phase, Phase::Running);
    }

    #[tokio::test]
    async fn store_without_pending_is_noop() {
        let repo = repo();
        let mut root = repo.load::<Counter>(&"c1".to_string()).await.unwrap();
        assert_eq!(repo.store(&mut root, ExpectedVersion::Exact(9)).await.unwrap(), 0);
        assert_eq!(repo.event_store().event_count(), 0);
    }

    #[tokio::test]
    async fn failed_store_keeps_pending_buffer() {
        let repo = repo();
        let id = "c1".to_string();
        repo.execute::<Counter, _>(&id, &Start, &Context::default())
            .await
            .unwrap();

        let mut stale = AggregateRoot::<Counter>::new(id.clone());
        stale.execute(&Start).unwrap();
        let err = repo.save(&mut stale).await.unwrap_err();

        assert!(matches!(err, RepositoryError::AlreadyExists(StreamExists { actual: 1 })));
        assert_eq!(stale.pending().len(), 1);
        assert_eq!(stale.version(), 0);
    }

    #[tokio::test]
    async fn unchecked_repository_appends_regardless_of_version() {
        let repo = repo().without_concurrency_checking();
        let id = "c1".to_string();
        repo.execute::<Counter, _>(&id, &Start, &Context::default())
            .await
            .unwrap();

        let mut stale = repo.load::<Counter>(&id).await.unwrap();
        stale.execute(&Bump(1)).unwrap();
        let mut other = repo.load::<Counter>(&id).await.unwrap();
        other.execute(&Bump(2)).unwrap();

        repo.save(&mut other).await.unwrap();
        assert_eq!(repo.save(&mut stale).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn execute_with_retry_succeeds_first_time_without_conflict() {
        let repo = repo();
        let id = "c1".to_string();
        repo.execute::<Counter, _>(&id, &Start, &Context::default())
            .await
            .unwrap();

        let attempts = repo
            .execute_with_retry::<Counter, _>(&id, &Bump(2), &Context::default(), 3)
            .await
            .unwrap();
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn execute_surfaces_guard_violation() {
        let err = repo()
            .execute::<Counter, _>(&"c1".to_string(), &Bump(1), &Context::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Aggregate(GuardViolation { command: "bump", .. })));
    }

    #[tokio::test]
    async fn store_dispatches_to_projection() {
        let tallies = rows::Store::new();
        let repo = repo().with_projection(TallyProjection, tallies.clone());
        let id = "c1".to_string();

        let mut root = repo.load::<Counter>(&id).await.unwrap();
        root.execute(&Start).unwrap();
        root.execute(&Bump(5)).unwrap();
        repo.save(&mut root).await.unwrap();

        assert_eq!(tallies.require(&id).unwrap().row, Tally(5));
        assert_eq!(repo.dispatcher().projections(), &["tally"]);
    }

    #[tokio::test]
    async fn row_behind_the_stream_is_caught_up_on_store() {
        let tallies: rows::Store<String, Tally> = rows::Store::new();
        let repo = repo().with_projection(TallyProjection, tallies.clone());
        let id = "c1".to_string();

        // Commit history the projection never saw.
        let plain = Repository::new(repo.event_store().clone());
        plain
            .execute::<Counter, _>(&id, &Start, &Context::default())
            .await
            .unwrap();
        plain
            .execute::<Counter, _>(&id, &Bump(1), &Context::default())
            .await
            .unwrap();

        let mut root = repo.load::<Counter>(&id).await.unwrap();
        root.execute(&Bump(2)).unwrap();
        assert_eq!(repo.save(&mut root).await.unwrap(), 3);

        let row = tallies.require(&id).unwrap();
        assert_eq!((row.version, row.row), (3, Tally(3)));
    }

    /// Rows that refuse writes while `down` is set.
    #[derive(Clone, Default)]
    struct Flaky {
        rows: rows::Store<String, Tally>,
        down: std::sync::Arc<std::sync::atomic::AtomicBool>,
    }

    impl Flaky {
        fn set_down(&self, down: bool) {
            self.down.store(down, std::sync::atomic::Ordering::SeqCst);
        }
    }

    impl ReadModelStore<String, Tally> for Flaky {
        type Error = io::Error;

        fn get(&self, id: &String) -> Result<Option<Versioned<Tally>>, Self::Error> {
            Ok(self.rows.require(id).ok())
        }

        fn modify<T, F>(&self, id: &String, f: F) -> Result<T, Self::Error>
        where
            F: FnOnce(&mut Option<Versioned<Tally>>) -> T,
        {
            if self.down.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(io::Error::other("read model offline"));
            }
            self.rows.modify(id, f).map_err(|never| match never {})
        }
    }

    #[tokio::test]
    async fn projection_failure_reports_committed_version_and_redeliver_repairs() {
        let tallies = Flaky::default();
        let repo = repo().with_projection(TallyProjection, tallies.clone());
        let id = "c1".to_string();
        repo.execute::<Counter, _>(&id, &Start, &Context::default())
            .await
            .unwrap();

        tallies.set_down(true);
        let mut root = repo.load::<Counter>(&id).await.unwrap();
        root.execute(&Bump(2)).unwrap();
        let err = repo.save(&mut root).await.unwrap_err();

        assert!(matches!(
            err,
            RepositoryError::Projection {
                committed: 2,
                source: ProjectionFailure::Store { .. }
            }
        ));
        assert!(!root.has_pending());
        assert_eq!(root.version(), 2);
        assert_eq!(tallies.rows.require(&id).unwrap().version, 1);

        tallies.set_down(false);
        assert_eq!(repo.redeliver::<Counter>(&id).await.unwrap(), 2);
        let row = tallies.rows.require(&id).unwrap();
        assert_eq!((row.version, row.row), (2, Tally(2)));

        // A second redelivery changes nothing.
        repo.redeliver::<Counter>(&id).await.unwrap();
        assert_eq!(tallies.rows.require(&id).unwrap().row, Tally(2));
    }

    #[test]
    fn debug_names_strategy_and_projections() {
        let rendered = format!(
            "{:?}",
            repo()
                .with_projection(TallyProjection, rows::Store::<String, Tally>::new())
                .without_concurrency_checking()
        );
        assert!(rendered.starts_with("Repository"));
        assert!(rendered.contains("Unchecked"));
        assert!(rendered.contains("tally"));
    }
}
