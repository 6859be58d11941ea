//! Order status state machine.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// Transitions:
/// ```text
/// pending ──► confirmed ──► preparing ──► ready ──► assigned ──► at_pickup ──► picked_up ──► in_transit ──► delivered
///
/// cancelled: from any status up to and including at_pickup
/// delivered: also from assigned, at_pickup and picked_up
/// ```
///
/// `assigned` and `at_pickup` may skip straight to `delivered` for handoffs
/// where pickup and dropoff coincide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Preparing,
    Ready,
    Assigned,
    AtPickup,
    PickedUp,
    InTransit,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [OrderStatus; 10] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Assigned,
        OrderStatus::AtPickup,
        OrderStatus::PickedUp,
        OrderStatus::InTransit,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    /// Returns the statuses reachable from this one in a single step.
    pub fn allowed_transitions(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Confirmed, Cancelled],
            Confirmed => &[Preparing, Cancelled],
            Preparing => &[Ready, Cancelled],
            Ready => &[Assigned, Cancelled],
            Assigned => &[AtPickup, PickedUp, Delivered, Cancelled],
            AtPickup => &[PickedUp, Delivered, Cancelled],
            PickedUp => &[InTransit, Delivered],
            InTransit => &[Delivered],
            Delivered | Cancelled => &[],
        }
    }

    /// Returns true if the transition table has an edge from `self` to `next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Returns true if this is a terminal status (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// History description used when the caller supplies none.
    pub fn default_description(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Order placed",
            OrderStatus::Confirmed => "Order confirmed by merchant",
            OrderStatus::Preparing => "Order is being prepared",
            OrderStatus::Ready => "Order is ready for pickup",
            OrderStatus::Assigned => "Driver assigned",
            OrderStatus::AtPickup => "Driver arrived at pickup",
            OrderStatus::PickedUp => "Order picked up",
            OrderStatus::InTransit => "Order is on its way",
            OrderStatus::Delivered => "Order delivered",
            OrderStatus::Cancelled => "Order cancelled",
        }
    }

    /// Returns the status name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::Assigned => "assigned",
            OrderStatus::AtPickup => "at_pickup",
            OrderStatus::PickedUp => "picked_up",
            OrderStatus::InTransit => "in_transit",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
