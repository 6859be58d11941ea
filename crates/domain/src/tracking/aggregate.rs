//! Delivery tracking aggregate implementation.

use chrono::{DateTime, Utc};
use common::{AggregateId, OperationId, UserId};
use document_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::geo::GeoPoint;
use crate::history::StatusChange;
use crate::order::Order;

use super::events::{
    DeliveryCompletedData, LocationUpdatedData, OperationLockClearedData, TrackingCreatedData,
    TrackingStatusChangedData,
};
use super::{
    DeliveryProof, GEOFENCE_RADIUS_M, LocationSample, OperationLock, ROUTE_NOISE_THRESHOLD_M,
    RoutePoint, TargetLocation, TrackingError, TrackingEvent, TrackingPlan, TrackingStatus,
};

/// The physical fulfilment of one order by one driver.
///
/// Mutated by the driver's location stream and by explicit status calls.
/// Every mutating method first stamps the operation marker, so a resubmitted
/// operation whose marker is still fresh is recognised and applied only once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryTracking {
    id: AggregateId,
    order_id: AggregateId,
    driver_id: UserId,
    customer_id: UserId,
    merchant_id: UserId,
    status: TrackingStatus,

    current_location: Option<LocationSample>,
    route: Vec<RoutePoint>,
    pickup: TargetLocation,
    delivery: TargetLocation,

    total_distance_m: f64,
    average_speed_kmh: f64,
    max_speed_kmh: f64,

    estimated_pickup_time: DateTime<Utc>,
    estimated_delivery_time: DateTime<Utc>,
    actual_pickup_time: Option<DateTime<Utc>>,
    actual_delivery_time: Option<DateTime<Utc>>,
    on_time: Option<bool>,

    /// False once the delivery reaches a terminal status.
    is_live: bool,
    proof: Option<DeliveryProof>,
    status_history: Vec<StatusChange<TrackingStatus>>,
    operation_lock: Option<OperationLock>,

    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,

    #[serde(default)]
    version: Version,
}

impl Aggregate for DeliveryTracking {
    type Event = TrackingEvent;
    type Error = TrackingError;

    fn aggregate_type() -> &'static str {
        "DeliveryTracking"
    }

    fn collection() -> &'static str {
        "delivery_trackings"
    }

    fn id(&self) -> AggregateId {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }
}

// Query methods
impl DeliveryTracking {
    pub fn order_id(&self) -> AggregateId {
        self.order_id
    }

    pub fn driver_id(&self) -> UserId {
        self.driver_id
    }

    pub fn customer_id(&self) -> UserId {
        self.customer_id
    }

    pub fn merchant_id(&self) -> UserId {
        self.merchant_id
    }

    pub fn status(&self) -> TrackingStatus {
        self.status
    }

    pub fn current_location(&self) -> Option<&LocationSample> {
        self.current_location.as_ref()
    }

    pub fn route(&self) -> &[RoutePoint] {
        &self.route
    }

    pub fn pickup(&self) -> &TargetLocation {
        &self.pickup
    }

    pub fn delivery(&self) -> &TargetLocation {
        &self.delivery
    }

    pub fn total_distance_m(&self) -> f64 {
        self.total_distance_m
    }

    pub fn average_speed_kmh(&self) -> f64 {
        self.average_speed_kmh
    }

    pub fn max_speed_kmh(&self) -> f64 {
        self.max_speed_kmh
    }

    pub fn estimated_pickup_time(&self) -> DateTime<Utc> {
        self.estimated_pickup_time
    }

    pub fn estimated_delivery_time(&self) -> DateTime<Utc> {
        self.estimated_delivery_time
    }

    pub fn actual_pickup_time(&self) -> Option<DateTime<Utc>> {
        self.actual_pickup_time
    }

    pub fn actual_delivery_time(&self) -> Option<DateTime<Utc>> {
        self.actual_delivery_time
    }

    pub fn on_time(&self) -> Option<bool> {
        self.on_time
    }

    pub fn is_live(&self) -> bool {
        self.is_live
    }

    pub fn proof(&self) -> Option<&DeliveryProof> {
        self.proof.as_ref()
    }

    pub fn status_history(&self) -> &[StatusChange<TrackingStatus>] {
        &self.status_history
    }

    pub fn operation_lock(&self) -> Option<&OperationLock> {
        self.operation_lock.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

// Command methods
impl DeliveryTracking {
    /// Opens a tracking for an order that was just bound to `driver_id`.
    pub fn for_assignment(
        id: AggregateId,
        order: &Order,
        driver_id: UserId,
        plan: TrackingPlan,
        now: DateTime<Utc>,
    ) -> (Self, Vec<TrackingEvent>) {
        let mut tracking = Self {
            id,
            order_id: order.id(),
            driver_id,
            customer_id: order.customer_id(),
            merchant_id: order.merchant_id(),
            status: TrackingStatus::Assigned,
            current_location: None,
            route: Vec::new(),
            pickup: plan.pickup,
            delivery: plan.delivery,
            total_distance_m: 0.0,
            average_speed_kmh: 0.0,
            max_speed_kmh: 0.0,
            estimated_pickup_time: plan.estimated_pickup_time,
            estimated_delivery_time: plan.estimated_delivery_time,
            actual_pickup_time: None,
            actual_delivery_time: None,
            on_time: None,
            is_live: true,
            proof: None,
            status_history: vec![StatusChange::manual(
                TrackingStatus::Assigned,
                TrackingStatus::Assigned.default_description(),
                Some(driver_id),
                now,
            )],
            operation_lock: None,
            created_at: now,
            updated_at: now,
            version: Version::initial(),
        };
        if let Some(start) = plan.start {
            tracking.record_location(LocationSample::at(start, now));
        }

        let event = TrackingEvent::TrackingCreated(TrackingCreatedData {
            tracking_id: tracking.id,
            order_id: tracking.order_id,
            driver_id,
            customer_id: tracking.customer_id,
            estimated_pickup_time: tracking.estimated_pickup_time,
            estimated_delivery_time: tracking.estimated_delivery_time,
            created_at: now,
        });
        (tracking, vec![event])
    }

    /// Records a position report, then runs arrival detection.
    ///
    /// Returns no events when `operation_id` replays a fresh operation.
    pub fn update_location(
        &mut self,
        sample: LocationSample,
        operation_id: &OperationId,
        now: DateTime<Utc>,
    ) -> Result<Vec<TrackingEvent>, TrackingError> {
        sample.validate()?;
        if self.is_replay(operation_id, now) {
            return Ok(vec![]);
        }
        if !self.is_live || self.status.is_terminal() {
            return Err(TrackingError::NotLive {
                status: self.status,
            });
        }

        self.stamp_operation(operation_id, now);
        let mut events = vec![self.location_event(sample, now)];
        events.extend(self.detect_arrival(now));
        Ok(events)
    }

    /// Moves the tracking to `next` at an actor's request.
    ///
    /// An accompanying location is recorded (current location, route, speed)
    /// but arrival detection does not run, even inside a geofence. Each call
    /// appends exactly one history entry; geofence arrivals come only from
    /// [`update_location`](Self::update_location).
    pub fn update_status(
        &mut self,
        next: TrackingStatus,
        notes: Option<String>,
        location: Option<LocationSample>,
        actor: Option<UserId>,
        operation_id: &OperationId,
        now: DateTime<Utc>,
    ) -> Result<Vec<TrackingEvent>, TrackingError> {
        if let Some(sample) = &location {
            sample.validate()?;
        }
        if self.is_replay(operation_id, now) {
            return Ok(vec![]);
        }
        if !self.status.can_transition_to(next) {
            return Err(TrackingError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        self.stamp_operation(operation_id, now);
        let mut events = Vec::new();
        if let Some(sample) = location {
            events.push(self.location_event(sample, now));
        }
        let point = self.current_location.as_ref().map(|l| l.point);
        let change = StatusChange::manual(
            next,
            notes.unwrap_or_else(|| next.default_description().to_string()),
            actor,
            now,
        )
        .at(point);
        events.push(self.apply_status(change, now));
        Ok(events)
    }

    /// Attaches proof of delivery and moves `at_delivery` to `delivered`.
    pub fn complete_delivery(
        &mut self,
        proof: DeliveryProof,
        actor: Option<UserId>,
        operation_id: &OperationId,
        now: DateTime<Utc>,
    ) -> Result<Vec<TrackingEvent>, TrackingError> {
        if self.is_replay(operation_id, now) {
            return Ok(vec![]);
        }
        if self.status != TrackingStatus::AtDelivery {
            return Err(TrackingError::NotAtDelivery {
                status: self.status,
            });
        }

        self.stamp_operation(operation_id, now);
        let description = proof
            .notes
            .clone()
            .unwrap_or_else(|| "Delivery completed".to_string());
        self.proof = Some(proof);

        let point = self.current_location.as_ref().map(|l| l.point);
        let change = StatusChange::manual(TrackingStatus::Delivered, description, actor, now).at(point);
        let status_event = self.apply_status(change, now);

        Ok(vec![
            status_event,
            TrackingEvent::DeliveryCompleted(DeliveryCompletedData {
                tracking_id: self.id,
                order_id: self.order_id,
                driver_id: self.driver_id,
                on_time: self.on_time.unwrap_or(false),
                total_distance_m: self.total_distance_m,
                delivered_at: now,
            }),
        ])
    }

    /// Clears an operation marker that has outlived its TTL.
    ///
    /// Fails with `OperationLockHeld` while the marker is fresh; does nothing
    /// when there is no marker.
    pub fn clear_stale_operation_lock(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Vec<TrackingEvent>, TrackingError> {
        let Some(lock) = &self.operation_lock else {
            return Ok(vec![]);
        };
        if !lock.is_expired(now) {
            return Err(TrackingError::OperationLockHeld {
                operation_id: lock.operation_id.clone(),
                expires_at: lock.expires_at(),
            });
        }

        let operation_id = lock.operation_id.clone();
        self.operation_lock = None;
        self.updated_at = now;
        Ok(vec![TrackingEvent::OperationLockCleared(
            OperationLockClearedData {
                tracking_id: self.id,
                operation_id,
                cleared_at: now,
            },
        )])
    }
}

// Internals
impl DeliveryTracking {
    fn is_replay(&self, operation_id: &OperationId, now: DateTime<Utc>) -> bool {
        self.operation_lock
            .as_ref()
            .is_some_and(|lock| lock.operation_id == *operation_id && !lock.is_expired(now))
    }

    fn stamp_operation(&mut self, operation_id: &OperationId, now: DateTime<Utc>) {
        self.operation_lock = Some(OperationLock {
            operation_id: operation_id.clone(),
            acquired_at: now,
        });
        self.updated_at = now;
    }

    fn location_event(&mut self, sample: LocationSample, now: DateTime<Utc>) -> TrackingEvent {
        let point = sample.point;
        let recorded_at = sample.recorded_at;
        let distance_added_m = self.record_location(sample);
        self.updated_at = now;
        TrackingEvent::LocationUpdated(LocationUpdatedData {
            tracking_id: self.id,
            order_id: self.order_id,
            driver_id: self.driver_id,
            customer_id: self.customer_id,
            location: point,
            distance_added_m,
            total_distance_m: self.total_distance_m,
            recorded_at,
        })
    }

    /// Sets the current location, extending the route when the driver moved
    /// more than the noise threshold. Returns the distance added.
    fn record_location(&mut self, sample: LocationSample) -> f64 {
        let displacement = self
            .current_location
            .as_ref()
            .map(|previous| previous.point.distance_m(&sample.point));

        let added = match displacement {
            None => {
                self.route.push(RoutePoint {
                    point: sample.point,
                    recorded_at: sample.recorded_at,
                    speed_kmh: sample.speed_kmh,
                    distance_from_previous_m: 0.0,
                });
                0.0
            }
            Some(distance) if distance > ROUTE_NOISE_THRESHOLD_M => {
                self.route.push(RoutePoint {
                    point: sample.point,
                    recorded_at: sample.recorded_at,
                    speed_kmh: sample.speed_kmh,
                    distance_from_previous_m: distance,
                });
                self.total_distance_m += distance;
                distance
            }
            Some(_) => 0.0,
        };

        self.current_location = Some(sample);
        self.refresh_speeds();
        added
    }

    fn refresh_speeds(&mut self) {
        let speeds: Vec<f64> = self
            .route
            .iter()
            .filter_map(|p| p.speed_kmh)
            .filter(|speed| *speed > 0.0)
            .collect();
        if speeds.is_empty() {
            return;
        }
        self.average_speed_kmh = speeds.iter().sum::<f64>() / speeds.len() as f64;
        self.max_speed_kmh = speeds.iter().copied().fold(0.0, f64::max);
    }

    /// Geofence check against the target the current status is heading to.
    ///
    /// Only fires from `assigned`/`heading_to_pickup` for the pickup and from
    /// `heading_to_delivery` for the delivery, and only once per target.
    fn detect_arrival(&mut self, now: DateTime<Utc>) -> Option<TrackingEvent> {
        let here = self.current_location.as_ref()?.point;

        let (next, description) = match self.status {
            TrackingStatus::Assigned | TrackingStatus::HeadingToPickup
                if !self.pickup.arrived && within_geofence(&here, &self.pickup.point) =>
            {
                (TrackingStatus::AtPickup, "Driver arrived at pickup location")
            }
            TrackingStatus::HeadingToDelivery
                if !self.delivery.arrived && within_geofence(&here, &self.delivery.point) =>
            {
                (TrackingStatus::AtDelivery, "Driver arrived at delivery location")
            }
            _ => return None,
        };

        tracing::debug!(
            tracking_id = %self.id,
            from = %self.status,
            to = %next,
            "Geofence arrival detected"
        );
        let change = StatusChange::automatic(next, description, Some(here), now);
        Some(self.apply_status(change, now))
    }

    /// Sets the status, appends the history entry and maintains the timing
    /// fields. Callers check the transition beforehand.
    fn apply_status(
        &mut self,
        change: StatusChange<TrackingStatus>,
        now: DateTime<Utc>,
    ) -> TrackingEvent {
        let from = self.status;
        let to = change.status;
        let automatic = change.automatic;
        let location = change.location;

        self.status = to;
        self.status_history.push(change);
        match to {
            TrackingStatus::AtPickup => self.pickup.mark_arrived(now),
            TrackingStatus::PickedUp => {
                self.pickup.mark_arrived(now);
                self.pickup.left_at = Some(now);
                self.actual_pickup_time = Some(now);
            }
            TrackingStatus::AtDelivery => self.delivery.mark_arrived(now),
            TrackingStatus::Delivered => {
                self.delivery.mark_arrived(now);
                self.actual_delivery_time = Some(now);
                self.on_time = Some(now <= self.estimated_delivery_time);
                self.is_live = false;
            }
            TrackingStatus::Cancelled => self.is_live = false,
            _ => {}
        }
        self.updated_at = now;

        TrackingEvent::TrackingStatusChanged(TrackingStatusChangedData {
            tracking_id: self.id,
            order_id: self.order_id,
            driver_id: self.driver_id,
            customer_id: self.customer_id,
            from,
            to,
            automatic,
            location,
            changed_at: now,
        })
    }
}

fn within_geofence(here: &GeoPoint, target: &GeoPoint) -> bool {
    here.distance_m(target) <= GEOFENCE_RADIUS_M
}
