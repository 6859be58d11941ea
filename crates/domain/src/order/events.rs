//! Order domain events.

use chrono::{DateTime, Utc};
use common::{AggregateId, UserId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::{Money, OrderStatus};

/// Events that can occur on an order aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// Order was placed from a customer's cart.
    OrderPlaced(OrderPlacedData),

    /// Order moved to a new status.
    OrderStatusChanged(OrderStatusChangedData),

    /// A driver was bound to the order.
    DriverAssigned(DriverAssignedData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "OrderPlaced",
            OrderEvent::OrderStatusChanged(_) => "OrderStatusChanged",
            OrderEvent::DriverAssigned(_) => "DriverAssigned",
        }
    }
}

/// Data for OrderPlaced event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPlacedData {
    pub order_id: AggregateId,
    pub order_number: String,
    pub customer_id: UserId,
    pub merchant_id: UserId,

    /// Order total including fees, tax and discount.
    pub total: Money,

    /// Total quantity across all line items.
    pub item_count: u32,
    pub estimated_delivery_time: DateTime<Utc>,
    pub placed_at: DateTime<Utc>,
}

/// Data for OrderStatusChanged event.
///
/// Carries enough of the order for post-commit consumers (statistics,
/// notifications, dispatch) to act without re-reading it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusChangedData {
    pub order_id: AggregateId,
    pub order_number: String,
    pub customer_id: UserId,
    pub merchant_id: UserId,
    pub driver_id: Option<UserId>,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub total: Money,
    pub actor: Option<UserId>,
    pub changed_at: DateTime<Utc>,
}

/// Data for DriverAssigned event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverAssignedData {
    pub order_id: AggregateId,
    pub driver_id: UserId,
    pub assigned_at: DateTime<Utc>,
}
