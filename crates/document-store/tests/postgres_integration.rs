//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p document-store --test postgres_integration
//! ```

use std::sync::Arc;

use document_store::{
    AggregateId, Document, DocumentQuery, DocumentStore, DocumentStoreExt, EventEnvelope, EventId,
    PostgresDocumentStore, StoreError, Version, WriteBatch,
};
use serde_json::json;
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!("../../../migrations/001_create_documents.sql"))
                .execute(&temp_pool)
                .await
                .unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/002_outbox_acknowledgements.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresDocumentStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE documents, outbox RESTART IDENTITY")
        .execute(&pool)
        .await
        .unwrap();

    PostgresDocumentStore::new(pool)
}

fn order_doc(status: &str) -> Document {
    Document::new(
        AggregateId::new(),
        "orders",
        json!({"status": status, "driver_id": null}),
    )
}

fn order_event(aggregate_id: AggregateId, version: Version) -> EventEnvelope {
    EventEnvelope::builder()
        .aggregate_id(aggregate_id)
        .aggregate_type("Order")
        .event_type("OrderStatusChanged")
        .version(version)
        .payload_raw(json!({"status": "ready"}))
        .build()
}

#[tokio::test]
#[serial]
async fn insert_and_get_document() {
    let store = get_test_store().await;
    let doc = order_doc("pending");
    let id = doc.id;

    assert_eq!(store.insert(doc).await.unwrap(), Version::initial());

    let stored = store.get(id).await.unwrap().unwrap();
    assert_eq!(stored.collection, "orders");
    assert_eq!(stored.version, Version::initial());
    assert_eq!(stored.body["status"], "pending");
}

#[tokio::test]
#[serial]
async fn duplicate_insert_is_rejected() {
    let store = get_test_store().await;
    let doc = order_doc("pending");
    store.insert(doc.clone()).await.unwrap();

    let result = store.insert(doc).await;
    assert!(matches!(result, Err(StoreError::DuplicateDocument(_))));
}

#[tokio::test]
#[serial]
async fn conditional_update_detects_stale_version() {
    let store = get_test_store().await;
    let mut doc = order_doc("pending");
    store.insert(doc.clone()).await.unwrap();

    doc.body = json!({"status": "accepted", "driver_id": null});
    assert_eq!(
        store.update(doc.clone(), Version::new(0)).await.unwrap(),
        Version::new(1)
    );

    let result = store.update(doc.clone(), Version::new(0)).await;
    match result {
        Err(StoreError::ConcurrencyConflict {
            expected, actual, ..
        }) => {
            assert_eq!(expected, Version::new(0));
            assert_eq!(actual, Version::new(1));
        }
        other => panic!("expected conflict, got {other:?}"),
    }

    let missing = store.update(order_doc("pending"), Version::new(0)).await;
    assert!(matches!(missing, Err(StoreError::DocumentNotFound(_))));
}

#[tokio::test]
#[serial]
async fn concurrent_updates_have_one_winner() {
    let store = get_test_store().await;
    let doc = order_doc("pending");
    store.insert(doc.clone()).await.unwrap();

    let attempts = (0..5).map(|_| {
        let store = store.clone();
        let doc = doc.clone();
        async move { store.update(doc, Version::new(0)).await }
    });
    let results = futures_util::future::join_all(attempts).await;

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(StoreError::is_conflict)
    );
}

#[tokio::test]
#[serial]
async fn failed_batch_is_rolled_back() {
    let store = get_test_store().await;
    let existing = order_doc("pending");
    store.insert(existing.clone()).await.unwrap();

    let fresh = order_doc("pending");
    let fresh_id = fresh.id;
    let batch = WriteBatch::new()
        .insert(fresh)
        .update(existing, Version::new(9))
        .events([order_event(fresh_id, Version::new(0))]);

    assert!(store.commit(batch).await.is_err());
    assert!(store.get(fresh_id).await.unwrap().is_none());
    assert!(store.outbox_after(0, 10).await.unwrap().is_empty());
}

#[tokio::test]
#[serial]
async fn outbox_is_read_in_sequence_order() {
    let store = get_test_store().await;
    let a = order_doc("ready");
    let b = order_doc("ready");

    store
        .commit(
            WriteBatch::new()
                .insert(a.clone())
                .events([order_event(a.id, Version::new(0))]),
        )
        .await
        .unwrap();
    let receipt = store
        .commit(
            WriteBatch::new()
                .insert(b.clone())
                .events([order_event(b.id, Version::new(0))]),
        )
        .await
        .unwrap();
    assert_eq!(receipt.last_sequence, Some(2));

    let events = store.outbox_after(0, 10).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].aggregate_id, a.id);
    assert_eq!(events[1].aggregate_id, b.id);

    let tail = store.outbox_after(events[0].sequence, 10).await.unwrap();
    assert_eq!(tail.len(), 1);
    assert_eq!(tail[0].aggregate_id, b.id);
}

#[tokio::test]
#[serial]
async fn acknowledged_events_are_not_pending() {
    let store = get_test_store().await;
    let doc = order_doc("ready");
    store
        .commit(WriteBatch::new().insert(doc.clone()).events([
            order_event(doc.id, Version::new(0)),
            order_event(doc.id, Version::new(0)),
        ]))
        .await
        .unwrap();

    let pending = store.outbox_pending(10).await.unwrap();
    assert_eq!(pending.len(), 2);
    store.outbox_acknowledge(pending[0].event_id).await.unwrap();

    let rest = store.outbox_pending(10).await.unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].event_id, pending[1].event_id);
}

#[tokio::test]
#[serial]
async fn late_commit_with_lower_sequence_is_still_pending() {
    let store = get_test_store().await;

    // The slow writer takes the first sequence but commits last.
    let slow_event = EventId::new();
    let mut slow = store.pool().begin().await.unwrap();
    let slow_sequence: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO outbox (event_id, event_type, aggregate_id, aggregate_type, version, timestamp, payload)
        VALUES ($1, 'OrderStatusChanged', $2, 'Order', 0, NOW(), '{}'::jsonb)
        RETURNING sequence
        "#,
    )
    .bind(slow_event.as_uuid())
    .bind(AggregateId::new().as_uuid())
    .fetch_one(&mut *slow)
    .await
    .unwrap();

    let fast = order_doc("ready");
    let receipt = store
        .commit(
            WriteBatch::new()
                .insert(fast.clone())
                .events([order_event(fast.id, Version::new(0))]),
        )
        .await
        .unwrap();
    assert!(receipt.last_sequence.unwrap() > slow_sequence);

    let visible = store.outbox_pending(10).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].aggregate_id, fast.id);
    store.outbox_acknowledge(visible[0].event_id).await.unwrap();

    slow.commit().await.unwrap();

    let pending = store.outbox_pending(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].event_id, slow_event);
    assert_eq!(pending[0].sequence, slow_sequence);
}

#[tokio::test]
#[serial]
async fn find_uses_json_containment() {
    let store = get_test_store().await;
    let ready = order_doc("ready");
    store.insert(ready.clone()).await.unwrap();
    store.insert(order_doc("pending")).await.unwrap();
    store
        .insert(Document::new(
            AggregateId::new(),
            "orders",
            json!({"status": "ready", "driver_id": AggregateId::new()}),
        ))
        .await
        .unwrap();

    let waiting = store
        .find(
            DocumentQuery::collection("orders")
                .matching(json!({"status": "ready", "driver_id": null})),
        )
        .await
        .unwrap();
    assert_eq!(waiting.len(), 1);
    assert_eq!(waiting[0].id, ready.id);
}
