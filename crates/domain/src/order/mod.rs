//! Order aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod service;
mod status;
mod value_objects;

pub use aggregate::{Order, calculate_delivery_time};
pub use commands::*;
pub use events::{DriverAssignedData, OrderEvent, OrderPlacedData, OrderStatusChangedData};
pub use service::OrderService;
pub use status::OrderStatus;
pub use value_objects::{
    DeliveryAddress, DeliveryInfo, Money, OrderItem, OrderTotals, PaymentMethod, PricingPolicy,
    ProductId,
};

use common::UserId;
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderError {
    /// The transition table has no edge between the two statuses.
    #[error("Invalid order status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// The order already has a driver bound to it.
    #[error("Order already assigned to driver {driver_id}")]
    DriverAlreadyAssigned { driver_id: UserId },
}
