//! Follow-ups to committed order and tracking events.

use std::sync::Arc;

use async_trait::async_trait;
use common::AggregateId;
use document_store::{DocumentStore, EventEnvelope};
use domain::{
    Aggregate, DomainError, OrderEvent, OrderService, OrderStatus, RetryPolicy, TrackingEvent,
    TrackingStatus, UpdateOrderStatus, retry_when,
};
use outbox::{DecodedEvent, OutboxError, OutboxHandler};

use crate::directory::DriverDirectory;
use crate::error::DispatchError;
use crate::service::AssignmentService;

/// The order status a tracking status is reflected as, if any.
pub fn mirrored_order_status(status: TrackingStatus) -> Option<OrderStatus> {
    match status {
        TrackingStatus::AtPickup => Some(OrderStatus::AtPickup),
        TrackingStatus::PickedUp => Some(OrderStatus::PickedUp),
        TrackingStatus::HeadingToDelivery => Some(OrderStatus::InTransit),
        TrackingStatus::Delivered => Some(OrderStatus::Delivered),
        TrackingStatus::Cancelled => Some(OrderStatus::Cancelled),
        TrackingStatus::Assigned | TrackingStatus::HeadingToPickup | TrackingStatus::AtDelivery => {
            None
        }
    }
}

/// Drives the delivery lifecycle from the outbox:
///
/// - an order reaching `ready` is offered to drivers;
/// - tracking progress is mirrored onto the order;
/// - a finished or cancelled delivery frees its driver, who is then offered
///   the waiting orders.
pub struct DeliveryLifecycleHandler<S: DocumentStore, D> {
    assignments: Arc<AssignmentService<S, D>>,
    orders: OrderService<S>,
}

impl<S, D> DeliveryLifecycleHandler<S, D>
where
    S: DocumentStore + Clone,
    D: DriverDirectory,
{
    pub fn new(store: S, assignments: Arc<AssignmentService<S, D>>) -> Self {
        Self {
            assignments,
            orders: OrderService::new(store),
        }
    }

    /// Moves the order to `target` unless it is already there or the order
    /// table has no such edge. Lost version races are re-read and retried.
    async fn mirror(&self, order_id: AggregateId, target: OrderStatus) -> Result<(), DomainError> {
        let policy = RetryPolicy::immediate(3);
        retry_when(&policy, DomainError::is_conflict, || async {
            let order = self.orders.get_order(order_id).await?;
            if order.status() == target {
                return Ok(());
            }
            if !order.can_transition_to(target) {
                tracing::debug!(
                    %order_id,
                    from = %order.status(),
                    to = %target,
                    "Tracking status not mirrored onto order"
                );
                return Ok(());
            }
            self.orders
                .update_status(
                    UpdateOrderStatus::new(order_id, target)
                        .with_description("Updated from delivery tracking")
                        .expecting(order.version()),
                )
                .await
                .map(|_| ())
        })
        .await
        .map_err(|err| err.into_inner())
    }
}

#[async_trait]
impl<S, D> OutboxHandler for DeliveryLifecycleHandler<S, D>
where
    S: DocumentStore + Clone,
    D: DriverDirectory,
{
    fn name(&self) -> &'static str {
        "delivery_lifecycle"
    }

    async fn handle(&self, event: &EventEnvelope) -> outbox::Result<()> {
        match DecodedEvent::decode(event)? {
            DecodedEvent::Order(OrderEvent::OrderStatusChanged(change))
                if change.to == OrderStatus::Ready =>
            {
                let outcome = self
                    .assignments
                    .assign_delivery_to_order(change.order_id)
                    .await
                    .map_err(into_outbox)?;
                tracing::info!(order_id = %change.order_id, ?outcome, "Ready order dispatched");
            }
            DecodedEvent::Tracking(TrackingEvent::TrackingStatusChanged(change)) => {
                if let Some(target) = mirrored_order_status(change.to) {
                    self.mirror(change.order_id, target).await?;
                }
                if change.to.is_terminal() {
                    let assigned = self
                        .assignments
                        .release_delivery(change.driver_id)
                        .await
                        .map_err(into_outbox)?;
                    tracing::info!(
                        driver_id = %change.driver_id,
                        assigned,
                        "Driver released"
                    );
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn into_outbox(err: DispatchError) -> OutboxError {
    match err {
        DispatchError::Domain(err) => OutboxError::Domain(err),
        other => OutboxError::Handler(other.to_string()),
    }
}
