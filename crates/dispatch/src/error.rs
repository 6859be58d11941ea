//! Dispatch error types.

use common::AggregateId;
use domain::DomainError;
use thiserror::Error;

/// Errors that can occur while matching and assigning drivers.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// The order's merchant has no pickup location on file.
    #[error("Merchant of order {0} has no pickup location")]
    MissingPickup(AggregateId),

    /// The retry worker is gone, so a deferred order cannot be rescheduled.
    #[error("Retry scheduler is closed")]
    SchedulerClosed,
}

impl DispatchError {
    /// Returns true for optimistic concurrency failures.
    pub fn is_conflict(&self) -> bool {
        matches!(self, DispatchError::Domain(err) if err.is_conflict())
    }
}

/// Convenience type alias for dispatch results.
pub type Result<T> = std::result::Result<T, DispatchError>;
