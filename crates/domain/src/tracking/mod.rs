//! Delivery tracking aggregate: the physical fulfilment of an order.

mod aggregate;
mod commands;
mod events;
mod service;
mod status;
mod value_objects;

pub use aggregate::DeliveryTracking;
pub use commands::{CompleteDelivery, UpdateDeliveryStatus, UpdateLocation};
pub use events::{
    DeliveryCompletedData, LocationUpdatedData, OperationLockClearedData, TrackingCreatedData,
    TrackingEvent, TrackingStatusChangedData,
};
pub use service::{LocationOutcome, TrackingService};
pub use status::TrackingStatus;
pub use value_objects::{
    DeliveryProof, GEOFENCE_RADIUS_M, LocationSample, OPERATION_LOCK_TTL_SECS, OperationLock,
    ROUTE_NOISE_THRESHOLD_M, RoutePoint, TargetLocation, TrackingPlan,
};

use chrono::{DateTime, Utc};
use common::OperationId;
use thiserror::Error;

use crate::validation::ValidationError;

/// Errors that can occur during delivery tracking operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackingError {
    #[error("Invalid delivery status transition from {from} to {to}")]
    InvalidTransition {
        from: TrackingStatus,
        to: TrackingStatus,
    },

    /// Delivery can only be completed once the driver is at the drop-off.
    #[error("Cannot complete delivery while {status}")]
    NotAtDelivery { status: TrackingStatus },

    /// The tracking reached a terminal status and no longer takes updates.
    #[error("Delivery is no longer live ({status})")]
    NotLive { status: TrackingStatus },

    #[error("Operation {operation_id} holds the marker until {expires_at}")]
    OperationLockHeld {
        operation_id: OperationId,
        expires_at: DateTime<Utc>,
    },

    #[error(transparent)]
    InvalidLocation(#[from] ValidationError),
}
