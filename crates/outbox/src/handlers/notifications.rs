//! Push notifications to customers and merchants.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{AggregateId, UserId};
use document_store::EventEnvelope;
use domain::{OrderEvent, OrderStatus, TrackingEvent, TrackingStatus};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::handler::{DecodedEvent, OutboxHandler};
use crate::{OutboxError, Result};

/// A push message for one recipient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub recipient: UserId,
    pub title: String,
    pub body: String,
    pub order_id: AggregateId,
}

/// Delivery channel for push notifications.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<()>;
}

/// Gateway that records notifications in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationGateway {
    sent: Arc<RwLock<Vec<Notification>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryNotificationGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every send fail until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Returns every notification sent so far.
    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.read().await.clone()
    }

    /// Returns the notifications sent to `recipient`.
    pub async fn sent_to(&self, recipient: UserId) -> Vec<Notification> {
        self.sent
            .read()
            .await
            .iter()
            .filter(|n| n.recipient == recipient)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl NotificationGateway for InMemoryNotificationGateway {
    async fn send(&self, notification: Notification) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(OutboxError::Gateway("push service unavailable".into()));
        }
        self.sent.write().await.push(notification);
        Ok(())
    }
}

/// Turns order and delivery status changes into push notifications.
pub struct NotificationHandler<G> {
    gateway: G,
}

impl<G: NotificationGateway> NotificationHandler<G> {
    pub fn new(gateway: G) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl<G: NotificationGateway> OutboxHandler for NotificationHandler<G> {
    fn name(&self) -> &'static str {
        "notifications"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let Some(notification) = notification_for(DecodedEvent::decode(event)?) else {
            return Ok(());
        };
        self.gateway.send(notification).await?;
        metrics::counter!("notifications_sent_total").increment(1);
        Ok(())
    }
}

fn notification_for(event: DecodedEvent) -> Option<Notification> {
    match event {
        DecodedEvent::Order(OrderEvent::OrderPlaced(placed)) => Some(Notification {
            recipient: placed.merchant_id,
            title: "New order".into(),
            body: format!(
                "Order {} with {} items ({})",
                placed.order_number, placed.item_count, placed.total
            ),
            order_id: placed.order_id,
        }),
        DecodedEvent::Order(OrderEvent::OrderStatusChanged(change)) => {
            let body = match change.to {
                OrderStatus::Confirmed => "The restaurant confirmed your order",
                OrderStatus::Preparing => "Your order is being prepared",
                OrderStatus::Ready => "Your order is ready and waiting for a driver",
                OrderStatus::Assigned => "A driver is on the way to pick up your order",
                OrderStatus::Delivered => "Your order was delivered. Enjoy!",
                OrderStatus::Cancelled => "Your order was cancelled",
                _ => return None,
            };
            Some(Notification {
                recipient: change.customer_id,
                title: format!("Order {}", change.order_number),
                body: body.into(),
                order_id: change.order_id,
            })
        }
        DecodedEvent::Tracking(TrackingEvent::TrackingStatusChanged(change)) => {
            let body = match change.to {
                TrackingStatus::PickedUp => "Your driver picked up your order",
                TrackingStatus::AtDelivery => "Your driver has arrived",
                _ => return None,
            };
            Some(Notification {
                recipient: change.customer_id,
                title: "Delivery update".into(),
                body: body.into(),
                order_id: change.order_id,
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failing_gateway_reports_error() {
        let gateway = InMemoryNotificationGateway::new();
        gateway.set_failing(true);
        let notification = Notification {
            recipient: UserId::new(),
            title: "t".into(),
            body: "b".into(),
            order_id: AggregateId::new(),
        };

        assert!(matches!(
            gateway.send(notification.clone()).await,
            Err(OutboxError::Gateway(_))
        ));
        assert!(gateway.sent().await.is_empty());

        gateway.set_failing(false);
        gateway.send(notification.clone()).await.unwrap();
        assert_eq!(gateway.sent_to(notification.recipient).await, vec![notification]);
    }

    #[test]
    fn other_events_produce_nothing() {
        assert!(notification_for(DecodedEvent::Other).is_none());
    }
}
