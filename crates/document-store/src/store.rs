use std::collections::HashSet;

use async_trait::async_trait;

use crate::{
    AggregateId, Document, DocumentQuery, EventEnvelope, EventId, Result, StoreError, Version,
};

/// A single document mutation inside a [`WriteBatch`].
#[derive(Debug, Clone)]
pub enum Write {
    /// Creates a document. Fails with `DuplicateDocument` if the ID is taken.
    Insert(Document),

    /// Replaces a document body, conditional on the stored version.
    ///
    /// The stored version must equal `expected_version`; on success it becomes
    /// `expected_version + 1`.
    Update {
        document: Document,
        expected_version: Version,
    },
}

impl Write {
    /// Returns the ID of the document this write targets.
    pub fn document_id(&self) -> AggregateId {
        match self {
            Write::Insert(doc) => doc.id,
            Write::Update { document, .. } => document.id,
        }
    }

    /// Returns the version the document will carry once committed.
    pub fn resulting_version(&self) -> Version {
        match self {
            Write::Insert(_) => Version::initial(),
            Write::Update {
                expected_version, ..
            } => expected_version.next(),
        }
    }
}

/// A set of document writes and outbox events committed atomically.
///
/// Either every write and every event becomes visible, or none does.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub writes: Vec<Write>,
    pub events: Vec<EventEnvelope>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an insert of `document`.
    pub fn insert(mut self, document: Document) -> Self {
        self.writes.push(Write::Insert(document));
        self
    }

    /// Adds a conditional update of `document`.
    pub fn update(mut self, document: Document, expected_version: Version) -> Self {
        self.writes.push(Write::Update {
            document,
            expected_version,
        });
        self
    }

    /// Appends events to the outbox portion of the batch.
    pub fn events(mut self, events: impl IntoIterator<Item = EventEnvelope>) -> Self {
        self.events.extend(events);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.events.is_empty()
    }
}

/// Result of a successful commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReceipt {
    /// New version of every written document, in batch order.
    pub versions: Vec<(AggregateId, Version)>,

    /// Sequence number of the last outbox event written, if any.
    pub last_sequence: Option<i64>,
}

impl CommitReceipt {
    /// Returns the committed version of a document written in this batch.
    pub fn version_of(&self, id: AggregateId) -> Option<Version> {
        self.versions
            .iter()
            .find(|(doc_id, _)| *doc_id == id)
            .map(|(_, version)| *version)
    }
}

/// Core trait for document store implementations.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reads a document by ID.
    async fn get(&self, id: AggregateId) -> Result<Option<Document>>;

    /// Returns documents matching the query, oldest first.
    async fn find(&self, query: DocumentQuery) -> Result<Vec<Document>>;

    /// Applies a batch atomically.
    ///
    /// Fails with `ConcurrencyConflict` if any conditional update finds a
    /// different version, in which case nothing is written.
    async fn commit(&self, batch: WriteBatch) -> Result<CommitReceipt>;

    /// Reads outbox events with a sequence strictly greater than `after`,
    /// acknowledged or not.
    ///
    /// Sequences are handed out at insert time, so a commit can become
    /// visible after a higher sequence already was. Delivery therefore goes
    /// through [`outbox_pending`](Self::outbox_pending), not a sequence cursor.
    async fn outbox_after(&self, after: i64, limit: usize) -> Result<Vec<EventEnvelope>>;

    /// Reads committed events that have not been acknowledged yet, lowest
    /// sequence first.
    async fn outbox_pending(&self, limit: usize) -> Result<Vec<EventEnvelope>>;

    /// Marks an event as delivered. Acknowledged events are never returned
    /// by [`outbox_pending`](Self::outbox_pending) again. Acknowledging twice
    /// is a no-op.
    async fn outbox_acknowledge(&self, event_id: EventId) -> Result<()>;
}

/// Extension trait providing convenience methods for document stores.
#[async_trait]
pub trait DocumentStoreExt: DocumentStore {
    /// Inserts a single document.
    async fn insert(&self, document: Document) -> Result<Version> {
        self.commit(WriteBatch::new().insert(document)).await?;
        Ok(Version::initial())
    }

    /// Conditionally updates a single document.
    async fn update(&self, document: Document, expected_version: Version) -> Result<Version> {
        self.commit(WriteBatch::new().update(document, expected_version))
            .await?;
        Ok(expected_version.next())
    }

    /// Checks if a document exists.
    async fn exists(&self, id: AggregateId) -> Result<bool> {
        Ok(self.get(id).await?.is_some())
    }

    /// Reads a document, failing with `DocumentNotFound` if it is missing.
    async fn require(&self, id: AggregateId) -> Result<Document> {
        self.get(id).await?.ok_or(StoreError::DocumentNotFound(id))
    }
}

// Blanket implementation for all DocumentStore implementations
impl<T: DocumentStore + ?Sized> DocumentStoreExt for T {}

/// Validates a batch before it touches storage.
pub fn validate_batch(batch: &WriteBatch) -> Result<()> {
    if batch.is_empty() {
        return Err(StoreError::InvalidBatch(
            "Cannot commit an empty batch".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for write in &batch.writes {
        if !seen.insert(write.document_id()) {
            return Err(StoreError::InvalidBatch(format!(
                "Document {} is written more than once",
                write.document_id()
            )));
        }
        if let Write::Update {
            expected_version, ..
        } = write
            && expected_version.as_i64() < 0
        {
            return Err(StoreError::InvalidBatch(format!(
                "Negative expected version for document {}",
                write.document_id()
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: AggregateId) -> Document {
        Document::new(id, "orders", serde_json::json!({"status": "pending"}))
    }

    #[test]
    fn empty_batch_is_rejected() {
        assert!(matches!(
            validate_batch(&WriteBatch::new()),
            Err(StoreError::InvalidBatch(_))
        ));
    }

    #[test]
    fn duplicate_targets_are_rejected() {
        let id = AggregateId::new();
        let batch = WriteBatch::new()
            .insert(doc(id))
            .update(doc(id), Version::new(0));
        assert!(matches!(
            validate_batch(&batch),
            Err(StoreError::InvalidBatch(_))
        ));
    }

    #[test]
    fn update_advances_version_by_one() {
        let write = Write::Update {
            document: doc(AggregateId::new()),
            expected_version: Version::new(4),
        };
        assert_eq!(write.resulting_version(), Version::new(5));
        assert_eq!(
            Write::Insert(doc(AggregateId::new())).resulting_version(),
            Version::initial()
        );
    }

    #[test]
    fn receipt_looks_up_versions() {
        let a = AggregateId::new();
        let b = AggregateId::new();
        let receipt = CommitReceipt {
            versions: vec![(a, Version::new(0)), (b, Version::new(7))],
            last_sequence: Some(3),
        };
        assert_eq!(receipt.version_of(b), Some(Version::new(7)));
        assert_eq!(receipt.version_of(AggregateId::new()), None);
    }
}
