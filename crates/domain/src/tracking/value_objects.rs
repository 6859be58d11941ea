//! Value objects for delivery tracking.

use chrono::{DateTime, Duration, Utc};
use common::OperationId;
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;
use crate::validation::ValidationError;

/// Radius around a pickup or delivery target within which the driver is
/// considered to have arrived.
pub const GEOFENCE_RADIUS_M: f64 = 200.0;

/// Displacements at or below this are treated as GPS noise and do not extend
/// the route.
pub const ROUTE_NOISE_THRESHOLD_M: f64 = 10.0;

/// How long an operation marker stays fresh.
pub const OPERATION_LOCK_TTL_SECS: i64 = 30;

/// One position report from the driver's device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub point: GeoPoint,
    /// Reported accuracy radius, in meters.
    #[serde(default)]
    pub accuracy_m: Option<f64>,
    /// Compass heading in degrees.
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub speed_kmh: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

impl LocationSample {
    /// A bare position with no motion data.
    pub fn at(point: GeoPoint, recorded_at: DateTime<Utc>) -> Self {
        Self {
            point,
            accuracy_m: None,
            heading: None,
            speed_kmh: None,
            recorded_at,
        }
    }

    pub fn with_speed(mut self, speed_kmh: f64) -> Self {
        self.speed_kmh = Some(speed_kmh);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.point.validate()
    }
}

/// A recorded point on the travelled route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePoint {
    pub point: GeoPoint,
    pub recorded_at: DateTime<Utc>,
    pub speed_kmh: Option<f64>,
    /// Great-circle distance from the previous route point; 0 for the first.
    pub distance_from_previous_m: f64,
}

/// The pickup or delivery target of a tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetLocation {
    pub point: GeoPoint,
    pub address: String,
    pub arrived: bool,
    pub arrived_at: Option<DateTime<Utc>>,
    pub left_at: Option<DateTime<Utc>>,
}

impl TargetLocation {
    pub fn new(point: GeoPoint, address: impl Into<String>) -> Self {
        Self {
            point,
            address: address.into(),
            arrived: false,
            arrived_at: None,
            left_at: None,
        }
    }

    pub(crate) fn mark_arrived(&mut self, now: DateTime<Utc>) {
        self.arrived = true;
        self.arrived_at.get_or_insert(now);
    }
}

/// Evidence attached when a delivery is completed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryProof {
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
}

/// Advisory marker of the last operation applied to a tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationLock {
    pub operation_id: OperationId,
    pub acquired_at: DateTime<Utc>,
}

impl OperationLock {
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.acquired_at + Duration::seconds(OPERATION_LOCK_TTL_SECS)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }
}

/// Everything needed to open a tracking for a freshly assigned order.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingPlan {
    pub pickup: TargetLocation,
    pub delivery: TargetLocation,
    /// The driver's last known position, used as the route origin.
    pub start: Option<GeoPoint>,
    pub estimated_pickup_time: DateTime<Utc>,
    pub estimated_delivery_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_lock_expires_after_ttl() {
        let acquired_at = Utc::now();
        let lock = OperationLock {
            operation_id: OperationId::new("op-1"),
            acquired_at,
        };
        assert!(!lock.is_expired(acquired_at + Duration::seconds(29)));
        assert!(lock.is_expired(acquired_at + Duration::seconds(30)));
    }

    #[test]
    fn arrival_keeps_first_timestamp() {
        let mut target = TargetLocation::new(
            GeoPoint {
                longitude: -69.9,
                latitude: 18.4,
            },
            "Pickup",
        );
        let first = Utc::now();
        target.mark_arrived(first);
        target.mark_arrived(first + Duration::minutes(1));
        assert!(target.arrived);
        assert_eq!(target.arrived_at, Some(first));
    }
}
