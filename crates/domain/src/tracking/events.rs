//! Delivery tracking events.

use chrono::{DateTime, Utc};
use common::{AggregateId, OperationId, UserId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::geo::GeoPoint;

use super::TrackingStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TrackingEvent {
    TrackingCreated(TrackingCreatedData),
    LocationUpdated(LocationUpdatedData),
    TrackingStatusChanged(TrackingStatusChangedData),
    DeliveryCompleted(DeliveryCompletedData),
    OperationLockCleared(OperationLockClearedData),
}

impl DomainEvent for TrackingEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TrackingEvent::TrackingCreated(_) => "TrackingCreated",
            TrackingEvent::LocationUpdated(_) => "LocationUpdated",
            TrackingEvent::TrackingStatusChanged(_) => "TrackingStatusChanged",
            TrackingEvent::DeliveryCompleted(_) => "DeliveryCompleted",
            TrackingEvent::OperationLockCleared(_) => "OperationLockCleared",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingCreatedData {
    pub tracking_id: AggregateId,
    pub order_id: AggregateId,
    pub driver_id: UserId,
    pub customer_id: UserId,
    pub estimated_pickup_time: DateTime<Utc>,
    pub estimated_delivery_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationUpdatedData {
    pub tracking_id: AggregateId,
    pub order_id: AggregateId,
    pub driver_id: UserId,
    pub customer_id: UserId,
    pub location: GeoPoint,
    /// Distance this sample added to the route; 0 when filtered as noise.
    pub distance_added_m: f64,
    pub total_distance_m: f64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingStatusChangedData {
    pub tracking_id: AggregateId,
    pub order_id: AggregateId,
    pub driver_id: UserId,
    pub customer_id: UserId,
    pub from: TrackingStatus,
    pub to: TrackingStatus,
    /// True when geofencing, not an actor, made the change.
    pub automatic: bool,
    pub location: Option<GeoPoint>,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryCompletedData {
    pub tracking_id: AggregateId,
    pub order_id: AggregateId,
    pub driver_id: UserId,
    pub on_time: bool,
    pub total_distance_m: f64,
    pub delivered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationLockClearedData {
    pub tracking_id: AggregateId,
    pub operation_id: OperationId,
    pub cleared_at: DateTime<Utc>,
}
