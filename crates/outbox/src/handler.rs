//! Handler trait and payload decoding.

use async_trait::async_trait;
use document_store::EventEnvelope;
use domain::{Aggregate, DeliveryTracking, Order, OrderEvent, TrackingEvent};

use crate::Result;

/// A consumer of committed outbox events.
///
/// Handlers run after the commit that produced the event is durable. A
/// handler failure is logged and counted by the processor and never reaches
/// the writer of the event.
#[async_trait]
pub trait OutboxHandler: Send + Sync {
    /// Returns the name of this handler, used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Handles a single committed event.
    async fn handle(&self, event: &EventEnvelope) -> Result<()>;
}

/// An outbox payload decoded into its domain event.
#[derive(Debug, Clone)]
pub enum DecodedEvent {
    Order(OrderEvent),
    Tracking(TrackingEvent),
    /// Events of aggregates the handlers here don't react to (carts, users).
    Other,
}

impl DecodedEvent {
    pub fn decode(event: &EventEnvelope) -> Result<Self> {
        let decoded = if event.aggregate_type == Order::aggregate_type() {
            DecodedEvent::Order(event.decode()?)
        } else if event.aggregate_type == DeliveryTracking::aggregate_type() {
            DecodedEvent::Tracking(event.decode()?)
        } else {
            DecodedEvent::Other
        };
        Ok(decoded)
    }
}
