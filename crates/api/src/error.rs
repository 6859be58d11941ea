//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use dispatch::DispatchError;
use domain::{DomainError, OrderError, TrackingError};
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found.
    #[error("{0}")]
    NotFound(String),

    /// Bad request from the client.
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Internal server error.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// The status code for this error and whether the client should re-read
    /// and retry.
    fn classify(&self) -> (StatusCode, bool) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, false),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, false),
            ApiError::Domain(err) => classify_domain(err),
            ApiError::Dispatch(DispatchError::Domain(err)) => classify_domain(err),
            ApiError::Dispatch(DispatchError::MissingPickup(_)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, false)
            }
            ApiError::Dispatch(DispatchError::SchedulerClosed) | ApiError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, false)
            }
        }
    }
}

fn classify_domain(err: &DomainError) -> (StatusCode, bool) {
    if err.is_conflict() {
        return (StatusCode::CONFLICT, true);
    }
    if err.is_transient() {
        return (StatusCode::SERVICE_UNAVAILABLE, true);
    }
    let status = match err {
        DomainError::Validation(_) | DomainError::Cart(_) => StatusCode::BAD_REQUEST,
        DomainError::Tracking(TrackingError::InvalidLocation(_)) => StatusCode::BAD_REQUEST,
        DomainError::AggregateNotFound { .. } => StatusCode::NOT_FOUND,
        DomainError::Order(OrderError::InvalidTransition { .. })
        | DomainError::Order(OrderError::DriverAlreadyAssigned { .. })
        | DomainError::DuplicateAssignment { .. }
        | DomainError::Tracking(_) => StatusCode::CONFLICT,
        DomainError::ReferentialIntegrity { .. }
        | DomainError::DriverUnavailable { .. }
        | DomainError::User(_) => StatusCode::UNPROCESSABLE_ENTITY,
        DomainError::RetriesExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
        DomainError::Store(_)
        | DomainError::ConcurrencyConflict { .. }
        | DomainError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, false)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, retry) = self.classify();
        let message = self.to_string();
        if status.is_server_error() {
            tracing::error!(error = %message, "request failed");
        }

        let body = if retry {
            serde_json::json!({ "error": message, "retry": true })
        } else {
            serde_json::json!({ "error": message })
        };
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{AggregateId, UserId};
    use document_store::Version;
    use domain::{OrderStatus, ValidationError};

    fn status_of(err: DomainError) -> (StatusCode, bool) {
        ApiError::from(err).classify()
    }

    #[test]
    fn test_conflicts_ask_for_retry() {
        let err = DomainError::ConcurrencyConflict {
            aggregate_id: AggregateId::new(),
            expected: Version::new(1),
            actual: Version::new(2),
        };
        assert_eq!(status_of(err), (StatusCode::CONFLICT, true));
    }

    #[test]
    fn test_business_rule_failures() {
        assert_eq!(
            status_of(DomainError::Validation(ValidationError::EmptyCart)).0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(DomainError::Order(OrderError::InvalidTransition {
                from: OrderStatus::Pending,
                to: OrderStatus::Delivered,
            })),
            (StatusCode::CONFLICT, false)
        );
        assert_eq!(
            status_of(DomainError::DuplicateAssignment {
                order_id: AggregateId::new()
            })
            .0,
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(DomainError::DriverUnavailable {
                driver_id: UserId::new()
            })
            .0,
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn test_exhausted_retries_are_unavailable() {
        let err = DomainError::RetriesExhausted {
            operation: "transaction",
            attempts: 5,
            last: Box::new(DomainError::DuplicateAssignment {
                order_id: AggregateId::new(),
            }),
        };
        assert_eq!(status_of(err).0, StatusCode::SERVICE_UNAVAILABLE);
    }
}
