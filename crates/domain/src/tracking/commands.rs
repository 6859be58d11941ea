//! Delivery tracking commands.

use common::{AggregateId, OperationId, UserId};

use super::{DeliveryProof, LocationSample, TrackingStatus};

/// Command to record a position report from the driver's device.
#[derive(Debug, Clone)]
pub struct UpdateLocation {
    pub tracking_id: AggregateId,
    pub sample: LocationSample,
    pub operation_id: OperationId,
}

impl UpdateLocation {
    pub fn new(tracking_id: AggregateId, sample: LocationSample, operation_id: OperationId) -> Self {
        Self {
            tracking_id,
            sample,
            operation_id,
        }
    }
}

/// Command to move a tracking to a new status.
#[derive(Debug, Clone)]
pub struct UpdateDeliveryStatus {
    pub tracking_id: AggregateId,
    pub status: TrackingStatus,
    pub notes: Option<String>,
    /// Position at the time of the change, folded in before the status.
    pub location: Option<LocationSample>,
    pub actor: Option<UserId>,
    pub operation_id: OperationId,
}

impl UpdateDeliveryStatus {
    pub fn new(tracking_id: AggregateId, status: TrackingStatus, operation_id: OperationId) -> Self {
        Self {
            tracking_id,
            status,
            notes: None,
            location: None,
            actor: None,
            operation_id,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_location(mut self, location: LocationSample) -> Self {
        self.location = Some(location);
        self
    }

    pub fn by(mut self, actor: UserId) -> Self {
        self.actor = Some(actor);
        self
    }
}

/// Command to hand over the order with proof of delivery.
#[derive(Debug, Clone)]
pub struct CompleteDelivery {
    pub tracking_id: AggregateId,
    pub proof: DeliveryProof,
    pub actor: Option<UserId>,
    pub operation_id: OperationId,
}

impl CompleteDelivery {
    pub fn new(tracking_id: AggregateId, proof: DeliveryProof, operation_id: OperationId) -> Self {
        Self {
            tracking_id,
            proof,
            actor: None,
            operation_id,
        }
    }
}
