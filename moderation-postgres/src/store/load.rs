use moderation_core::{
    event::EventMetadata,
    store::{StoredEvent, StreamKey},
};
use sqlx::{Row, postgres::PgRow};

use super::Store;
use crate::{Error, error::from_db_version};

impl Store {
    /// Load the events of one stream with `version > after`, ascending.
    pub(in crate::store) async fn load_stream(
        &self,
        key: &StreamKey<uuid::Uuid>,
        after: i64,
    ) -> Result<Vec<StoredEvent<uuid::Uuid>>, Error> {
        let rows = sqlx::query(
            r"
                SELECT aggregate_kind, aggregate_id, version, event_kind, data,
                       occurred_at, correlation_id, causation_id
                FROM es_events
                WHERE aggregate_kind = $1 AND aggregate_id = $2 AND version > $3
                ORDER BY version ASC
                ",
        )
        .bind(key.aggregate_kind())
        .bind(key.aggregate_id())
        .bind(after)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::decode_row).collect()
    }

    /// Decode one `es_events` row into a [`StoredEvent`].
    pub(in crate::store) fn decode_row(row: &PgRow) -> Result<StoredEvent<uuid::Uuid>, Error> {
        let data: sqlx::types::Json<serde_json::Value> = row.try_get("data")?;
        Ok(StoredEvent {
            aggregate_kind: row.try_get("aggregate_kind")?,
            aggregate_id: row.try_get("aggregate_id")?,
            kind: row.try_get("event_kind")?,
            version: from_db_version(row.try_get("version")?)?,
            data: data.0,
            metadata: EventMetadata {
                occurred_at: row.try_get("occurred_at")?,
                correlation_id: row.try_get("correlation_id")?,
                causation_id: row.try_get("causation_id")?,
            },
        })
    }
}
