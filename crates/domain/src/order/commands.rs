//! Order commands.

use common::{AggregateId, UserId};
use document_store::Version;
use serde::Deserialize;

use super::{DeliveryInfo, OrderStatus, PaymentMethod};

/// Command to place an order from the customer's current cart.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaceOrder {
    /// The customer whose cart is checked out.
    pub customer_id: UserId,

    /// Where the order goes.
    pub delivery: DeliveryInfo,

    pub payment_method: PaymentMethod,
}

impl PlaceOrder {
    /// Creates a new PlaceOrder command.
    pub fn new(customer_id: UserId, delivery: DeliveryInfo, payment_method: PaymentMethod) -> Self {
        Self {
            customer_id,
            delivery,
            payment_method,
        }
    }
}

/// Command to move an order to a new status.
#[derive(Debug, Clone)]
pub struct UpdateOrderStatus {
    /// The order to update.
    pub order_id: AggregateId,

    /// The requested status.
    pub status: OrderStatus,

    /// History note; a per-status default is used when absent.
    pub description: Option<String>,

    /// Who asked for the change.
    pub actor: Option<UserId>,

    /// The version the caller last saw. When set, the write is conditioned
    /// on it rather than on the version read by this call.
    pub expected_version: Option<Version>,
}

impl UpdateOrderStatus {
    /// Creates a new UpdateOrderStatus command without a note, actor or expected version.
    pub fn new(order_id: AggregateId, status: OrderStatus) -> Self {
        Self {
            order_id,
            status,
            description: None,
            actor: None,
            expected_version: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn by(mut self, actor: UserId) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn expecting(mut self, version: Version) -> Self {
        self.expected_version = Some(version);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_order_status_builder() {
        let order_id = AggregateId::new();
        let actor = UserId::new();
        let cmd = UpdateOrderStatus::new(order_id, OrderStatus::Confirmed)
            .with_description("Accepted")
            .by(actor)
            .expecting(Version::new(3));

        assert_eq!(cmd.order_id, order_id);
        assert_eq!(cmd.status, OrderStatus::Confirmed);
        assert_eq!(cmd.description.as_deref(), Some("Accepted"));
        assert_eq!(cmd.actor, Some(actor));
        assert_eq!(cmd.expected_version, Some(Version::new(3)));
    }
}
