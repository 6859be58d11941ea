//! Core aggregate and domain event traits.

use common::AggregateId;
use document_store::Version;
use serde::{Serialize, de::DeserializeOwned};

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense. Every event an
/// aggregate emits is written to the outbox in the same commit as the
/// aggregate change itself.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name.
    fn event_type(&self) -> &'static str;
}

/// Trait for aggregates persisted as versioned documents.
///
/// An aggregate is a cluster of domain objects that can be treated as a single unit.
/// Command methods mutate the aggregate in place and return the events that
/// describe the change. An empty event list means nothing changed and nothing
/// is persisted.
pub trait Aggregate: Serialize + DeserializeOwned + Send + Sync + Sized {
    /// The type of events this aggregate produces.
    type Event: DomainEvent;

    /// The type of errors this aggregate's commands can produce.
    type Error: std::error::Error + Send + Sync;

    /// Returns the aggregate type name used in events and errors.
    fn aggregate_type() -> &'static str;

    /// Returns the document collection the aggregate is stored in.
    fn collection() -> &'static str;

    /// Returns the aggregate's unique identifier.
    fn id(&self) -> AggregateId;

    /// Returns the current version of the aggregate.
    ///
    /// Version is 0 for a freshly created aggregate and increments by one
    /// with each accepted write.
    fn version(&self) -> Version;

    /// Sets the aggregate version.
    ///
    /// Called by the repository after loading and after each write.
    fn set_version(&mut self, version: Version);
}
