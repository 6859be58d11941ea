//! Domain error types.

use common::{AggregateId, UserId};
use document_store::{StoreError, Version};
use thiserror::Error;

use crate::cart::CartError;
use crate::order::OrderError;
use crate::tracking::TrackingError;
use crate::user::UserError;
use crate::validation::ValidationError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the document store.
    #[error("Document store error: {0}")]
    Store(StoreError),

    /// Another writer advanced the aggregate past the version this
    /// operation read. The caller must re-read before retrying.
    #[error(
        "Concurrency conflict on {aggregate_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        aggregate_id: AggregateId,
        expected: Version,
        actual: Version,
    },

    #[error("Validation failed: {0}")]
    Validation(ValidationError),

    #[error("Order error: {0}")]
    Order(OrderError),

    #[error("Delivery tracking error: {0}")]
    Tracking(TrackingError),

    #[error("Cart error: {0}")]
    Cart(CartError),

    #[error("User error: {0}")]
    User(UserError),

    /// A reference points at a record that does not exist (or is not unique
    /// where it must be).
    #[error("Referential integrity violated: {entity} {id}")]
    ReferentialIntegrity {
        entity: &'static str,
        id: AggregateId,
    },

    /// The order already has a driver bound to it.
    #[error("Order {order_id} already has a driver assigned")]
    DuplicateAssignment { order_id: AggregateId },

    #[error("Driver {driver_id} is not available")]
    DriverUnavailable { driver_id: UserId },

    /// Aggregate not found.
    #[error("Aggregate not found: {aggregate_type} with id {aggregate_id}")]
    AggregateNotFound {
        aggregate_type: &'static str,
        aggregate_id: AggregateId,
    },

    /// A retried operation kept failing until its attempt budget ran out.
    #[error("{operation} gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        last: Box<DomainError>,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// Returns true for optimistic concurrency failures.
    pub fn is_conflict(&self) -> bool {
        match self {
            DomainError::ConcurrencyConflict { .. } => true,
            DomainError::Store(err) => err.is_conflict(),
            _ => false,
        }
    }

    /// Returns true for infrastructure failures that may succeed when retried.
    pub fn is_transient(&self) -> bool {
        match self {
            DomainError::Store(err) => err.is_transient(),
            _ => false,
        }
    }
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConcurrencyConflict {
                document_id,
                expected,
                actual,
            } => DomainError::ConcurrencyConflict {
                aggregate_id: document_id,
                expected,
                actual,
            },
            StoreError::Serialization(e) => DomainError::Serialization(e),
            other => DomainError::Store(other),
        }
    }
}

impl From<ValidationError> for DomainError {
    fn from(err: ValidationError) -> Self {
        DomainError::Validation(err)
    }
}

impl From<OrderError> for DomainError {
    fn from(err: OrderError) -> Self {
        DomainError::Order(err)
    }
}

impl From<TrackingError> for DomainError {
    fn from(err: TrackingError) -> Self {
        match err {
            TrackingError::InvalidLocation(e) => DomainError::Validation(e),
            other => DomainError::Tracking(other),
        }
    }
}

impl From<UserError> for DomainError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::Validation(e) => DomainError::Validation(e),
            other => DomainError::User(other),
        }
    }
}

impl From<CartError> for DomainError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::Validation(e) => DomainError::Validation(e),
            other => DomainError::Cart(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_conflicts_become_domain_conflicts() {
        let id = AggregateId::new();
        let err: DomainError = StoreError::ConcurrencyConflict {
            document_id: id,
            expected: Version::new(2),
            actual: Version::new(3),
        }
        .into();

        match &err {
            DomainError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            } => {
                assert_eq!(*aggregate_id, id);
                assert_eq!(*expected, Version::new(2));
                assert_eq!(*actual, Version::new(3));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(err.is_conflict());
        assert!(!err.is_transient());
    }

    #[test]
    fn unavailable_store_is_transient() {
        let err: DomainError = StoreError::Unavailable("failover".into()).into();
        assert!(err.is_transient());
        assert!(!err.is_conflict());

        let err: DomainError = ValidationError::EmptyCart.into();
        assert!(!err.is_transient());
    }
}
