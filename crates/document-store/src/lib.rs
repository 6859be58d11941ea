//! Persistence layer for the delivery coordination system.
//!
//! Stores aggregates as versioned JSON documents. Every write is conditioned
//! on the version the writer observed, and a [`WriteBatch`] spanning several
//! documents commits atomically together with its outbox events.

pub mod document;
pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use common::AggregateId;
pub use document::{Document, Version};
pub use error::{Result, StoreError};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId};
pub use memory::InMemoryDocumentStore;
pub use postgres::PostgresDocumentStore;
pub use query::DocumentQuery;
pub use store::{CommitReceipt, DocumentStore, DocumentStoreExt, Write, WriteBatch};
