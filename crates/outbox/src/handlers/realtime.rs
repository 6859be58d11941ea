//! Best-effort real-time broadcast of delivery progress.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AggregateId, UserId};
use document_store::EventEnvelope;
use domain::{GeoPoint, OrderEvent, OrderStatus, TrackingEvent, TrackingStatus};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::Result;
use crate::handler::{DecodedEvent, OutboxHandler};

/// A message for clients following an order live.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RealtimeUpdate {
    OrderStatus {
        order_id: AggregateId,
        customer_id: UserId,
        status: OrderStatus,
    },
    DeliveryStatus {
        tracking_id: AggregateId,
        order_id: AggregateId,
        customer_id: UserId,
        status: TrackingStatus,
        automatic: bool,
    },
    DriverLocation {
        tracking_id: AggregateId,
        order_id: AggregateId,
        customer_id: UserId,
        location: GeoPoint,
        recorded_at: DateTime<Utc>,
    },
}

impl RealtimeUpdate {
    pub fn order_id(&self) -> AggregateId {
        match self {
            RealtimeUpdate::OrderStatus { order_id, .. }
            | RealtimeUpdate::DeliveryStatus { order_id, .. }
            | RealtimeUpdate::DriverLocation { order_id, .. } => *order_id,
        }
    }
}

/// Publishes status and location events on a broadcast channel.
///
/// Slow subscribers lag and lose messages; having no subscriber at all is
/// not an error.
#[derive(Clone)]
pub struct RealtimeHandler {
    sender: broadcast::Sender<RealtimeUpdate>,
}

impl RealtimeHandler {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeUpdate> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl OutboxHandler for RealtimeHandler {
    fn name(&self) -> &'static str {
        "realtime"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let update = match DecodedEvent::decode(event)? {
            DecodedEvent::Order(OrderEvent::OrderStatusChanged(change)) => {
                RealtimeUpdate::OrderStatus {
                    order_id: change.order_id,
                    customer_id: change.customer_id,
                    status: change.to,
                }
            }
            DecodedEvent::Tracking(TrackingEvent::TrackingStatusChanged(change)) => {
                RealtimeUpdate::DeliveryStatus {
                    tracking_id: change.tracking_id,
                    order_id: change.order_id,
                    customer_id: change.customer_id,
                    status: change.to,
                    automatic: change.automatic,
                }
            }
            DecodedEvent::Tracking(TrackingEvent::LocationUpdated(update)) => {
                RealtimeUpdate::DriverLocation {
                    tracking_id: update.tracking_id,
                    order_id: update.order_id,
                    customer_id: update.customer_id,
                    location: update.location,
                    recorded_at: update.recorded_at,
                }
            }
            _ => return Ok(()),
        };

        if self.sender.send(update).is_err() {
            tracing::trace!("No real-time subscribers");
        }
        Ok(())
    }
}
