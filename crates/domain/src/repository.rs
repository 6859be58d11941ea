//! Versioned persistence for aggregates.

use std::marker::PhantomData;

use common::AggregateId;
use document_store::{
    Document, DocumentQuery, DocumentStore, EventEnvelope, Version, WriteBatch,
};

use crate::aggregate::{Aggregate, DomainEvent};
use crate::error::DomainError;
use crate::retry::{RetryError, RetryPolicy, retry_when};

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// The aggregate after the command was applied.
    pub aggregate: A,

    /// The events that were generated and persisted.
    pub events: Vec<A::Event>,

    /// The version of the aggregate after the command.
    pub new_version: Version,
}

/// Loads and stores one aggregate type.
///
/// Every write is conditioned on the version the aggregate was read at, and
/// the events it emitted go to the outbox in the same commit.
pub struct Repository<S, A>
where
    S: DocumentStore,
    A: Aggregate,
{
    store: S,
    _phantom: PhantomData<A>,
}

impl<S, A> Clone for Repository<S, A>
where
    S: DocumentStore + Clone,
    A: Aggregate,
{
    fn clone(&self) -> Self {
        Self::new(self.store.clone())
    }
}

impl<S, A> Repository<S, A>
where
    S: DocumentStore,
    A: Aggregate,
{
    /// Creates a new repository over the given store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            _phantom: PhantomData,
        }
    }

    /// Returns a reference to the underlying document store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads an aggregate, returning None if it doesn't exist.
    pub async fn load(&self, id: AggregateId) -> Result<Option<A>, DomainError> {
        match self.store.get(id).await? {
            Some(doc) => decode_document(&doc),
            None => Ok(None),
        }
    }

    /// Loads an aggregate, failing with `AggregateNotFound` if it doesn't exist.
    pub async fn get(&self, id: AggregateId) -> Result<A, DomainError> {
        self.load(id)
            .await?
            .ok_or(DomainError::AggregateNotFound {
                aggregate_type: A::aggregate_type(),
                aggregate_id: id,
            })
    }

    /// Returns aggregates whose stored form contains `filter`, oldest first.
    pub async fn find(
        &self,
        filter: serde_json::Value,
        limit: Option<usize>,
    ) -> Result<Vec<A>, DomainError> {
        let mut query = DocumentQuery::collection(A::collection()).matching(filter);
        if let Some(limit) = limit {
            query = query.limit(limit);
        }

        let mut aggregates = Vec::new();
        for doc in self.store.find(query).await? {
            if let Some(aggregate) = decode_document(&doc)? {
                aggregates.push(aggregate);
            }
        }
        Ok(aggregates)
    }

    /// Persists a new aggregate at version 0.
    pub async fn insert(&self, mut aggregate: A, events: &[A::Event]) -> Result<A, DomainError> {
        aggregate.set_version(Version::initial());
        let batch = WriteBatch::new()
            .insert(encode_document(&aggregate)?)
            .events(build_envelopes(&aggregate, events)?);

        self.store.commit(batch).await?;
        Ok(aggregate)
    }

    /// Persists a changed aggregate, conditioned on the version it was read at.
    ///
    /// On success the aggregate's version is advanced by one. Nothing is
    /// written when `events` is empty.
    pub async fn save(&self, aggregate: &mut A, events: &[A::Event]) -> Result<Version, DomainError> {
        let expected = aggregate.version();
        if events.is_empty() {
            return Ok(expected);
        }

        aggregate.set_version(expected.next());
        let result = self.commit_update(aggregate, expected, events).await;
        if result.is_err() {
            aggregate.set_version(expected);
        }
        result.map(|()| expected.next())
    }

    async fn commit_update(
        &self,
        aggregate: &A,
        expected: Version,
        events: &[A::Event],
    ) -> Result<(), DomainError> {
        let batch = WriteBatch::new()
            .update(encode_document(aggregate)?, expected)
            .events(build_envelopes(aggregate, events)?);
        self.store.commit(batch).await?;
        Ok(())
    }

    /// Executes a read-modify-write command.
    ///
    /// The write is conditioned on `expected_version` when given, otherwise
    /// on the version just read. A conflict is returned to the caller as is.
    pub async fn execute<F>(
        &self,
        id: AggregateId,
        expected_version: Option<Version>,
        command: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&mut A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let mut aggregate = self.get(id).await?;
        let read_version = aggregate.version();

        if let Some(expected) = expected_version
            && expected != read_version
        {
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id: id,
                expected,
                actual: read_version,
            });
        }

        let events = command(&mut aggregate)?;
        let new_version = self.save(&mut aggregate, &events).await?;

        Ok(CommandResult {
            aggregate,
            events,
            new_version,
        })
    }

    /// Executes a read-modify-write command, re-reading and re-applying it
    /// when another writer got there first.
    ///
    /// Fails with `RetriesExhausted` once `policy.max_attempts` attempts have
    /// all conflicted. Non-conflict errors are returned immediately.
    pub async fn execute_with_retry<F>(
        &self,
        id: AggregateId,
        policy: &RetryPolicy,
        command: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: Fn(&mut A) -> Result<Vec<A::Event>, A::Error>,
        DomainError: From<A::Error>,
    {
        let mut attempts = 0u32;
        let result = retry_when(policy, DomainError::is_conflict, || {
            attempts += 1;
            self.execute(id, None, &command)
        })
        .await;

        if attempts > 1 {
            metrics::counter!("aggregate_update_retries_total", "aggregate" => A::aggregate_type())
                .increment(u64::from(attempts - 1));
        }

        result.map_err(|err| match err {
            RetryError::Exhausted { attempts, last } => {
                tracing::warn!(
                    aggregate_type = A::aggregate_type(),
                    aggregate_id = %id,
                    attempts,
                    "Optimistic update retries exhausted"
                );
                DomainError::RetriesExhausted {
                    operation: A::aggregate_type(),
                    attempts,
                    last: Box::new(last),
                }
            }
            RetryError::Permanent(err) => err,
        })
    }
}

/// Serializes an aggregate into a document at its current version.
pub(crate) fn encode_document<A: Aggregate>(aggregate: &A) -> Result<Document, DomainError> {
    let mut doc = Document::from_value(aggregate.id(), A::collection(), aggregate)?;
    doc.version = aggregate.version();
    Ok(doc)
}

/// Deserializes a document, treating documents of other collections as absent.
pub(crate) fn decode_document<A: Aggregate>(doc: &Document) -> Result<Option<A>, DomainError> {
    if doc.collection != A::collection() {
        return Ok(None);
    }
    let mut aggregate: A = doc.decode()?;
    aggregate.set_version(doc.version);
    Ok(Some(aggregate))
}

/// Wraps domain events for the outbox, stamped with the aggregate's version.
pub(crate) fn build_envelopes<A: Aggregate>(
    aggregate: &A,
    events: &[A::Event],
) -> Result<Vec<EventEnvelope>, DomainError> {
    events
        .iter()
        .map(|event| {
            Ok(EventEnvelope::builder()
                .aggregate_id(aggregate.id())
                .aggregate_type(A::aggregate_type())
                .event_type(event.event_type())
                .version(aggregate.version())
                .payload(event)?
                .build())
        })
        .collect()
}
