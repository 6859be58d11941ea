use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    AggregateId, Document, DocumentQuery, EventEnvelope, EventId, Result, StoreError, Version,
    query::json_contains,
    store::{CommitReceipt, DocumentStore, Write, WriteBatch, validate_batch},
};

#[derive(Default)]
struct MemoryState {
    documents: HashMap<AggregateId, Document>,
    outbox: Vec<EventEnvelope>,
    acknowledged: HashSet<EventId>,
    next_sequence: i64,
}

/// In-memory document store implementation for testing and local runs.
///
/// Commits take a single write lock, so a batch is applied all-or-nothing and
/// conditional updates are checked against a consistent view.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    state: Arc<RwLock<MemoryState>>,
    failing_commits: Arc<AtomicUsize>,
    commits: Arc<AtomicUsize>,
}

impl InMemoryDocumentStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` commits fail with a transient `Unavailable` error.
    pub fn fail_next_commits(&self, count: usize) {
        self.failing_commits.store(count, Ordering::SeqCst);
    }

    /// Returns the number of successful commits.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Returns the total number of documents stored.
    pub async fn document_count(&self) -> usize {
        self.state.read().await.documents.len()
    }

    /// Returns the number of events in the outbox.
    pub async fn outbox_len(&self) -> usize {
        self.state.read().await.outbox.len()
    }

    /// Clears all documents and outbox events.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.documents.clear();
        state.outbox.clear();
        state.acknowledged.clear();
        state.next_sequence = 0;
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, id: AggregateId) -> Result<Option<Document>> {
        Ok(self.state.read().await.documents.get(&id).cloned())
    }

    async fn find(&self, query: DocumentQuery) -> Result<Vec<Document>> {
        let state = self.state.read().await;
        let mut documents: Vec<_> = state
            .documents
            .values()
            .filter(|doc| doc.collection == query.collection)
            .filter(|doc| {
                query
                    .filter
                    .as_ref()
                    .is_none_or(|filter| json_contains(&doc.body, filter))
            })
            .cloned()
            .collect();

        documents.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let offset = query.offset.unwrap_or(0);
        let documents = documents.into_iter().skip(offset);
        Ok(match query.limit {
            Some(limit) => documents.take(limit).collect(),
            None => documents.collect(),
        })
    }

    async fn commit(&self, batch: WriteBatch) -> Result<CommitReceipt> {
        validate_batch(&batch)?;

        if self.take_injected_failure() {
            return Err(StoreError::Unavailable(
                "injected commit failure".to_string(),
            ));
        }

        let mut state = self.state.write().await;

        // Check every precondition before mutating anything.
        for write in &batch.writes {
            match write {
                Write::Insert(doc) => {
                    if state.documents.contains_key(&doc.id) {
                        return Err(StoreError::DuplicateDocument(doc.id));
                    }
                }
                Write::Update {
                    document,
                    expected_version,
                } => {
                    let stored = state
                        .documents
                        .get(&document.id)
                        .ok_or(StoreError::DocumentNotFound(document.id))?;
                    if stored.version != *expected_version {
                        return Err(StoreError::ConcurrencyConflict {
                            document_id: document.id,
                            expected: *expected_version,
                            actual: stored.version,
                        });
                    }
                }
            }
        }

        let now = Utc::now();
        let mut versions = Vec::with_capacity(batch.writes.len());
        for write in batch.writes {
            let version = write.resulting_version();
            let mut document = match write {
                Write::Insert(doc) => doc,
                Write::Update { mut document, .. } => {
                    if let Some(stored) = state.documents.get(&document.id) {
                        document.created_at = stored.created_at;
                        document.collection = stored.collection.clone();
                    }
                    document.updated_at = now;
                    document
                }
            };
            document.version = version;
            versions.push((document.id, version));
            state.documents.insert(document.id, document);
        }

        let mut last_sequence = None;
        for mut event in batch.events {
            state.next_sequence += 1;
            event.sequence = state.next_sequence;
            last_sequence = Some(event.sequence);
            state.outbox.push(event);
        }

        self.commits.fetch_add(1, Ordering::SeqCst);

        Ok(CommitReceipt {
            versions,
            last_sequence,
        })
    }

    async fn outbox_after(&self, after: i64, limit: usize) -> Result<Vec<EventEnvelope>> {
        let state = self.state.read().await;
        // Sequences are dense and assigned in push order.
        Ok(state
            .outbox
            .iter()
            .filter(|e| e.sequence > after)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn outbox_pending(&self, limit: usize) -> Result<Vec<EventEnvelope>> {
        let state = self.state.read().await;
        Ok(state
            .outbox
            .iter()
            .filter(|e| !state.acknowledged.contains(&e.event_id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn outbox_acknowledge(&self, event_id: EventId) -> Result<()> {
        self.state.write().await.acknowledged.insert(event_id);
        Ok(())
    }
}
