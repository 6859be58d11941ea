//! Delivery tracking status state machine.

use serde::{Deserialize, Serialize};

/// Where a delivery stands physically.
///
/// Transitions:
/// ```text
/// assigned ──► heading_to_pickup ──► at_pickup ──► picked_up ──► heading_to_delivery ──► at_delivery ──► delivered
///                                                       └──────────────────────────────────────┘
/// cancelled: from any non-terminal status
/// ```
///
/// Geofencing may also move `assigned` straight to `at_pickup`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    #[default]
    Assigned,
    HeadingToPickup,
    AtPickup,
    PickedUp,
    HeadingToDelivery,
    AtDelivery,
    Delivered,
    Cancelled,
}

impl TrackingStatus {
    pub const ALL: [TrackingStatus; 8] = [
        TrackingStatus::Assigned,
        TrackingStatus::HeadingToPickup,
        TrackingStatus::AtPickup,
        TrackingStatus::PickedUp,
        TrackingStatus::HeadingToDelivery,
        TrackingStatus::AtDelivery,
        TrackingStatus::Delivered,
        TrackingStatus::Cancelled,
    ];

    pub fn allowed_transitions(&self) -> &'static [TrackingStatus] {
        use TrackingStatus::*;
        match self {
            Assigned => &[HeadingToPickup, Cancelled],
            HeadingToPickup => &[AtPickup, Cancelled],
            AtPickup => &[PickedUp, Cancelled],
            PickedUp => &[HeadingToDelivery, AtDelivery, Cancelled],
            HeadingToDelivery => &[AtDelivery, Cancelled],
            AtDelivery => &[Delivered, Cancelled],
            Delivered | Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: TrackingStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TrackingStatus::Delivered | TrackingStatus::Cancelled)
    }

    pub fn default_description(&self) -> &'static str {
        match self {
            TrackingStatus::Assigned => "Driver assigned to delivery",
            TrackingStatus::HeadingToPickup => "Driver heading to pickup",
            TrackingStatus::AtPickup => "Driver arrived at pickup",
            TrackingStatus::PickedUp => "Order picked up",
            TrackingStatus::HeadingToDelivery => "Driver heading to customer",
            TrackingStatus::AtDelivery => "Driver arrived at delivery location",
            TrackingStatus::Delivered => "Order delivered",
            TrackingStatus::Cancelled => "Delivery cancelled",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingStatus::Assigned => "assigned",
            TrackingStatus::HeadingToPickup => "heading_to_pickup",
            TrackingStatus::AtPickup => "at_pickup",
            TrackingStatus::PickedUp => "picked_up",
            TrackingStatus::HeadingToDelivery => "heading_to_delivery",
            TrackingStatus::AtDelivery => "at_delivery",
            TrackingStatus::Delivered => "delivered",
            TrackingStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TrackingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table_edges() {
        use TrackingStatus::*;
        let expected: &[(TrackingStatus, &[TrackingStatus])] = &[
            (Assigned, &[HeadingToPickup, Cancelled]),
            (HeadingToPickup, &[AtPickup, Cancelled]),
            (AtPickup, &[PickedUp, Cancelled]),
            (PickedUp, &[HeadingToDelivery, AtDelivery, Cancelled]),
            (HeadingToDelivery, &[AtDelivery, Cancelled]),
            (AtDelivery, &[Delivered, Cancelled]),
            (Delivered, &[]),
            (Cancelled, &[]),
        ];

        for (from, allowed) in expected {
            for to in TrackingStatus::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&to),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn every_non_terminal_status_can_be_cancelled() {
        for status in TrackingStatus::ALL {
            assert_eq!(
                status.can_transition_to(TrackingStatus::Cancelled),
                !status.is_terminal()
            );
        }
    }
}
