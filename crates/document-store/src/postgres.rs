use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, Document, DocumentQuery, EventEnvelope, EventId, Result, StoreError, Version,
    store::{CommitReceipt, DocumentStore, Write, WriteBatch, validate_batch},
};

/// PostgreSQL-backed document store implementation.
///
/// Documents live in a single `documents` table keyed by ID with a JSONB body.
/// Outbox events are appended to `outbox` inside the same transaction.
#[derive(Clone)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    /// Creates a new PostgreSQL document store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_document(row: PgRow) -> Result<Document> {
        Ok(Document {
            id: AggregateId::from_uuid(row.try_get::<Uuid, _>("id")?),
            collection: row.try_get("collection")?,
            version: Version::new(row.try_get("version")?),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            body: row.try_get("body")?,
        })
    }

    fn row_to_event(row: PgRow) -> Result<EventEnvelope> {
        let metadata_json: serde_json::Value = row.try_get("metadata")?;
        let metadata: HashMap<String, serde_json::Value> = serde_json::from_value(metadata_json)?;

        Ok(EventEnvelope {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("event_id")?),
            sequence: row.try_get("sequence")?,
            event_type: row.try_get("event_type")?,
            aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
            aggregate_type: row.try_get("aggregate_type")?,
            version: Version::new(row.try_get("version")?),
            timestamp: row.try_get("timestamp")?,
            payload: row.try_get("payload")?,
            metadata,
        })
    }
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn get(&self, id: AggregateId) -> Result<Option<Document>> {
        let row = sqlx::query(
            r#"
            SELECT id, collection, version, created_at, updated_at, body
            FROM documents
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_document).transpose()
    }

    async fn find(&self, query: DocumentQuery) -> Result<Vec<Document>> {
        let mut sql = String::from(
            "SELECT id, collection, version, created_at, updated_at, body FROM documents WHERE collection = $1",
        );
        let mut param_count = 1;

        if query.filter.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND body @> ${param_count}"));
        }

        sql.push_str(" ORDER BY created_at ASC, id ASC");

        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = query.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        let mut q = sqlx::query(&sql).bind(&query.collection);
        if let Some(filter) = &query.filter {
            q = q.bind(filter);
        }

        let rows = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_document).collect()
    }

    async fn commit(&self, batch: WriteBatch) -> Result<CommitReceipt> {
        validate_batch(&batch)?;

        let mut tx = self.pool.begin().await?;
        let mut versions = Vec::with_capacity(batch.writes.len());

        for write in &batch.writes {
            match write {
                Write::Insert(doc) => {
                    let inserted = sqlx::query(
                        r#"
                        INSERT INTO documents (id, collection, version, created_at, updated_at, body)
                        VALUES ($1, $2, 0, $3, $4, $5)
                        ON CONFLICT (id) DO NOTHING
                        "#,
                    )
                    .bind(doc.id.as_uuid())
                    .bind(&doc.collection)
                    .bind(doc.created_at)
                    .bind(doc.updated_at)
                    .bind(&doc.body)
                    .execute(&mut *tx)
                    .await?;

                    if inserted.rows_affected() == 0 {
                        return Err(StoreError::DuplicateDocument(doc.id));
                    }
                    versions.push((doc.id, Version::initial()));
                }
                Write::Update {
                    document,
                    expected_version,
                } => {
                    let updated = sqlx::query(
                        r#"
                        UPDATE documents
                        SET body = $1, version = version + 1, updated_at = NOW()
                        WHERE id = $2 AND version = $3
                        "#,
                    )
                    .bind(&document.body)
                    .bind(document.id.as_uuid())
                    .bind(expected_version.as_i64())
                    .execute(&mut *tx)
                    .await?;

                    if updated.rows_affected() == 0 {
                        // Distinguish a stale version from a missing row.
                        let actual: Option<i64> =
                            sqlx::query_scalar("SELECT version FROM documents WHERE id = $1")
                                .bind(document.id.as_uuid())
                                .fetch_optional(&mut *tx)
                                .await?;

                        return Err(match actual {
                            Some(actual) => StoreError::ConcurrencyConflict {
                                document_id: document.id,
                                expected: *expected_version,
                                actual: Version::new(actual),
                            },
                            None => StoreError::DocumentNotFound(document.id),
                        });
                    }
                    versions.push((document.id, expected_version.next()));
                }
            }
        }

        let mut last_sequence = None;
        for event in &batch.events {
            let metadata_json = serde_json::to_value(&event.metadata)?;

            let sequence: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO outbox (event_id, event_type, aggregate_id, aggregate_type, version, timestamp, payload, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING sequence
                "#,
            )
            .bind(event.event_id.as_uuid())
            .bind(&event.event_type)
            .bind(event.aggregate_id.as_uuid())
            .bind(&event.aggregate_type)
            .bind(event.version.as_i64())
            .bind(event.timestamp)
            .bind(&event.payload)
            .bind(metadata_json)
            .fetch_one(&mut *tx)
            .await?;

            last_sequence = Some(sequence);
        }

        tx.commit().await?;

        metrics::counter!("document_store_commits_total").increment(1);
        tracing::debug!(
            writes = versions.len(),
            events = batch.events.len(),
            "Committed write batch"
        );

        Ok(CommitReceipt {
            versions,
            last_sequence,
        })
    }

    async fn outbox_after(&self, after: i64, limit: usize) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, event_id, event_type, aggregate_id, aggregate_type, version, timestamp, payload, metadata
            FROM outbox
            WHERE sequence > $1
            ORDER BY sequence ASC
            LIMIT $2
            "#,
        )
        .bind(after)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn outbox_pending(&self, limit: usize) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, event_id, event_type, aggregate_id, aggregate_type, version, timestamp, payload, metadata
            FROM outbox
            WHERE processed_at IS NULL
            ORDER BY sequence ASC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn outbox_acknowledge(&self, event_id: EventId) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE outbox
            SET processed_at = NOW()
            WHERE event_id = $1 AND processed_at IS NULL
            "#,
        )
        .bind(event_id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
