//! Merchant and driver statistics.

use async_trait::async_trait;
use document_store::{DocumentStore, EventEnvelope};
use domain::{OrderEvent, OrderStatus, UserService};

use crate::handler::{DecodedEvent, OutboxHandler};
use crate::Result;

/// Records completed orders on the merchant and completed deliveries on the
/// driver once an order reaches `delivered`.
pub struct StatsHandler<S: DocumentStore> {
    users: UserService<S>,
}

impl<S: DocumentStore> StatsHandler<S> {
    pub fn new(store: S) -> Self {
        Self {
            users: UserService::new(store),
        }
    }
}

#[async_trait]
impl<S: DocumentStore> OutboxHandler for StatsHandler<S> {
    fn name(&self) -> &'static str {
        "stats"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let DecodedEvent::Order(OrderEvent::OrderStatusChanged(change)) =
            DecodedEvent::decode(event)?
        else {
            return Ok(());
        };
        if change.to != OrderStatus::Delivered {
            return Ok(());
        }

        self.users
            .record_completed_order(change.merchant_id, change.total)
            .await?;
        if let Some(driver_id) = change.driver_id {
            self.users.record_delivery(driver_id).await?;
        }

        metrics::counter!("merchant_orders_completed_total").increment(1);
        tracing::debug!(
            order_id = %change.order_id,
            merchant_id = %change.merchant_id,
            "Delivery stats recorded"
        );
        Ok(())
    }
}
