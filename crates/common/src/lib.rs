//! Identifier types shared by every layer of the delivery coordination system.

mod ids;

pub use ids::{AggregateId, OperationId, UserId};
