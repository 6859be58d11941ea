//! HTTP handlers.

pub mod carts;
pub mod deliveries;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod users;

use common::{AggregateId, UserId};

use crate::error::ApiError;

pub(crate) fn parse_aggregate_id(id: &str) -> Result<AggregateId, ApiError> {
    AggregateId::parse(id).map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}

pub(crate) fn parse_user_id(id: &str) -> Result<UserId, ApiError> {
    UserId::parse(id).map_err(|e| ApiError::BadRequest(format!("Invalid user ID format: {e}")))
}
