//! Outbox error types.

use thiserror::Error;

/// Errors that can occur while draining the outbox.
#[derive(Debug, Error)]
pub enum OutboxError {
    /// Reading the outbox failed.
    #[error("Document store error: {0}")]
    Store(#[from] document_store::StoreError),

    /// A handler's follow-up write failed.
    #[error("Domain error: {0}")]
    Domain(#[from] domain::DomainError),

    /// Failed to deserialize an event payload.
    #[error("Event deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// The push gateway rejected a notification.
    #[error("Notification gateway error: {0}")]
    Gateway(String),

    /// A handler-specific error.
    #[error("Handler error: {0}")]
    Handler(String),
}

/// Result type for outbox operations.
pub type Result<T> = std::result::Result<T, OutboxError>;
