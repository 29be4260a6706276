use moderation_core::{
    concurrency::ConcurrencyConflict,
    event::Version,
    store::{AppendError, NonEmpty, StoredEvent, StreamKey},
};
use sqlx::{Postgres, QueryBuilder};

use super::Store;
use crate::{
    Error,
    error::{from_db_version, to_db_version},
};

impl Store {
    /// Insert an `es_streams` row for the given stream, doing nothing if one
    /// already exists.
    ///
    /// Must be called inside an open transaction before locking the row.
    pub(in crate::store) async fn ensure_stream_row(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        key: &StreamKey<uuid::Uuid>,
    ) -> Result<(), Error> {
        sqlx::query(
            r"
                INSERT INTO es_streams (aggregate_kind, aggregate_id, version)
                VALUES ($1, $2, 0)
                ON CONFLICT (aggregate_kind, aggregate_id) DO NOTHING
                ",
        )
        .bind(key.aggregate_kind())
        .bind(key.aggregate_id())
        .execute(&mut **tx)
        .await
        .map(|_| ())
        .map_err(Error::from)
    }

    /// Lock the stream row and return its current version.
    pub(in crate::store) async fn lock_stream_version(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        key: &StreamKey<uuid::Uuid>,
    ) -> Result<Version, Error> {
        let version: i64 = sqlx::query_scalar(
            r"
                SELECT version
                FROM es_streams
                WHERE aggregate_kind = $1 AND aggregate_id = $2
                FOR UPDATE
                ",
        )
        .bind(key.aggregate_kind())
        .bind(key.aggregate_id())
        .fetch_one(&mut **tx)
        .await?;

        from_db_version(version)
    }

    /// Bulk-insert events with their already-assigned versions.
    pub(in crate::store) async fn insert_events(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        events: &NonEmpty<StoredEvent<uuid::Uuid>>,
    ) -> Result<(), Error> {
        let rows = events
            .iter()
            .map(|event| Ok((to_db_version(event.version)?, event)))
            .collect::<Result<Vec<_>, Error>>()?;

        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO es_events (aggregate_kind, aggregate_id, version, event_kind, data, \
             occurred_at, correlation_id, causation_id) ",
        );
        qb.push_values(rows, |mut b, (version, event)| {
            b.push_bind(event.aggregate_kind.as_str());
            b.push_bind(event.aggregate_id);
            b.push_bind(version);
            b.push_bind(event.kind.as_str());
            b.push_bind(sqlx::types::Json(&event.data));
            b.push_bind(event.metadata.occurred_at);
            b.push_bind(event.metadata.correlation_id.as_deref());
            b.push_bind(event.metadata.causation_id.as_deref());
        });

        qb.build().execute(&mut **tx).await?;
        Ok(())
    }

    pub(in crate::store) async fn bump_stream_version(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        key: &StreamKey<uuid::Uuid>,
        version: Version,
    ) -> Result<(), Error> {
        sqlx::query(
            r"
                UPDATE es_streams
                SET version = $1
                WHERE aggregate_kind = $2 AND aggregate_id = $3
                ",
        )
        .bind(to_db_version(version)?)
        .bind(key.aggregate_kind())
        .bind(key.aggregate_id())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Map an insert failure; a unique violation on `(stream, version)` means
    /// another writer claimed the next version first.
    ///
    /// The aborted transaction cannot be queried again, so the reported
    /// `actual` is a lower bound: the stream holds at least `current + 1`.
    pub(in crate::store) fn classify_insert_error(
        error: Error,
        current: Version,
    ) -> AppendError<Error> {
        if let Error::Database(sqlx::Error::Database(db)) = &error
            && db.is_unique_violation()
        {
            tracing::warn!(current, "unique violation on stream version");
            return AppendError::Conflict(ConcurrencyConflict {
                expected: current,
                actual: current + 1,
            });
        }
        AppendError::Store(error)
    }
}
