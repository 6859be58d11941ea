//! Post-commit outbox worker.
//!
//! Domain writes record their events in the same commit as the documents they
//! change. This crate consumes those events afterwards:
//! - [`OutboxHandler`] trait for post-commit side effects
//! - [`OutboxProcessor`] for draining the outbox in commit order
//! - Handlers for merchant/driver stats, push notifications and real-time updates

pub mod error;
pub mod handler;
pub mod handlers;
pub mod processor;

pub use error::{OutboxError, Result};
pub use handler::{DecodedEvent, OutboxHandler};
pub use handlers::{
    InMemoryNotificationGateway, Notification, NotificationGateway, NotificationHandler,
    RealtimeHandler, RealtimeUpdate, StatsHandler,
};
pub use processor::OutboxProcessor;
