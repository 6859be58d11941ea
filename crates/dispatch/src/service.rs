//! Delivery Assignment Service.

use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{AggregateId, UserId};
use document_store::DocumentStore;
use domain::{
    Aggregate, DeliveryTracking, DomainError, GeoPoint, Order, OrderService, OrderStatus,
    TrackingEvent, TrackingPlan, User, UserError, UserService, assign_delivery_person,
    tracking::TargetLocation,
};
use serde::Serialize;

use crate::config::DispatchConfig;
use crate::directory::DriverDirectory;
use crate::error::{DispatchError, Result};
use crate::scheduler::RetryScheduler;
use crate::scoring::{self, RankedCandidate};

/// What an assignment attempt did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AssignmentOutcome {
    /// A driver was bound and a tracking opened.
    Assigned {
        tracking_id: AggregateId,
        driver_id: UserId,
        estimated_pickup_time: DateTime<Utc>,
        estimated_delivery_time: DateTime<Utc>,
    },

    /// The order already has a driver, possibly bound by a concurrent attempt.
    AlreadyAssigned,

    /// The order is not waiting for a driver.
    NotReady { status: OrderStatus },

    /// No driver could take the order; another attempt follows after `retry_in`.
    Deferred {
        #[serde(with = "duration_secs")]
        retry_in: Duration,
    },
}

impl AssignmentOutcome {
    fn label(&self) -> &'static str {
        match self {
            AssignmentOutcome::Assigned { .. } => "assigned",
            AssignmentOutcome::AlreadyAssigned => "already_assigned",
            AssignmentOutcome::NotReady { .. } => "not_ready",
            AssignmentOutcome::Deferred { .. } => "deferred",
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }
}

/// Matches ready orders with drivers and binds them atomically.
///
/// The service holds its collaborators explicitly: the store, a
/// [`DriverDirectory`] for candidate search, and optionally a
/// [`RetryScheduler`] for orders no driver could take.
pub struct AssignmentService<S: DocumentStore, D> {
    store: S,
    orders: OrderService<S>,
    users: UserService<S>,
    directory: D,
    config: DispatchConfig,
    scheduler: Option<RetryScheduler>,
}

impl<S, D> AssignmentService<S, D>
where
    S: DocumentStore + Clone,
    D: DriverDirectory,
{
    pub fn new(store: S, directory: D, config: DispatchConfig) -> Self {
        Self {
            orders: OrderService::new(store.clone()),
            users: UserService::new(store.clone()),
            store,
            directory,
            config,
            scheduler: None,
        }
    }

    /// Sends deferred orders to `scheduler` for a delayed re-attempt.
    pub fn with_scheduler(mut self, scheduler: RetryScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Finds the best driver for a ready order and binds them.
    ///
    /// Candidates are tried best first; one that went offline since the
    /// search is skipped. When none can take the order it is deferred rather
    /// than failed.
    #[tracing::instrument(skip(self))]
    pub async fn assign_delivery_to_order(
        &self,
        order_id: AggregateId,
    ) -> Result<AssignmentOutcome> {
        let outcome = self.try_assign(order_id).await?;
        metrics::counter!("assignments_total", "outcome" => outcome.label()).increment(1);
        Ok(outcome)
    }

    async fn try_assign(&self, order_id: AggregateId) -> Result<AssignmentOutcome> {
        let order = self.orders.get_order(order_id).await?;
        if order.driver_id().is_some() {
            return Ok(AssignmentOutcome::AlreadyAssigned);
        }
        if order.status() != OrderStatus::Ready {
            return Ok(AssignmentOutcome::NotReady {
                status: order.status(),
            });
        }

        for ranked in self.rank_candidates(&order).await? {
            let driver_id = ranked.candidate.driver_id;
            let result = assign_delivery_person(&self.store, order_id, driver_id, |o, m, d| {
                self.create_delivery_tracking(o, m, d)
            })
            .await;

            match result {
                Ok(assignment) => {
                    let tracking = &assignment.tracking;
                    tracing::info!(
                        driver_id = %driver_id,
                        tracking_id = %tracking.id(),
                        score = ranked.score,
                        distance_m = ranked.candidate.distance_m,
                        "Driver assigned"
                    );
                    return Ok(AssignmentOutcome::Assigned {
                        tracking_id: tracking.id(),
                        driver_id,
                        estimated_pickup_time: tracking.estimated_pickup_time(),
                        estimated_delivery_time: tracking.estimated_delivery_time(),
                    });
                }
                Err(DomainError::DuplicateAssignment { .. }) => {
                    return Ok(AssignmentOutcome::AlreadyAssigned);
                }
                Err(DomainError::DriverUnavailable { driver_id }) => {
                    tracing::debug!(%driver_id, "Candidate no longer available");
                }
                Err(err) => return Err(err.into()),
            }
        }

        // The driver pool may have emptied because a concurrent attempt took
        // this very order.
        if self.orders.get_order(order_id).await?.driver_id().is_some() {
            return Ok(AssignmentOutcome::AlreadyAssigned);
        }
        self.defer(order_id).await
    }

    async fn defer(&self, order_id: AggregateId) -> Result<AssignmentOutcome> {
        let retry_in = self.config.retry_delay;
        if let Some(scheduler) = &self.scheduler {
            scheduler.schedule(order_id, retry_in).await?;
        }
        tracing::info!(
            retry_in_secs = retry_in.as_secs(),
            "No driver available; assignment deferred"
        );
        Ok(AssignmentOutcome::Deferred { retry_in })
    }

    /// Returns the best driver for `order`, if any.
    pub async fn find_available_delivery(&self, order: &Order) -> Result<Option<RankedCandidate>> {
        Ok(self.rank_candidates(order).await?.into_iter().next())
    }

    async fn rank_candidates(&self, order: &Order) -> Result<Vec<RankedCandidate>> {
        let pickup = self.pickup_point(order).await?;
        let radius = self.config.search_radius_m;

        let mut eligible = Vec::new();
        for mut candidate in self.directory.find_available_near(pickup, radius).await? {
            let active = self
                .directory
                .active_delivery_count(candidate.driver_id)
                .await?;
            if active >= self.config.max_active_deliveries {
                continue;
            }
            candidate.active_deliveries = active;
            eligible.push(candidate);
        }

        tracing::debug!(candidates = eligible.len(), "Candidates ranked");
        Ok(scoring::rank(eligible, radius))
    }

    async fn pickup_point(&self, order: &Order) -> Result<GeoPoint> {
        let merchant = self.users.get(order.merchant_id()).await?;
        merchant
            .as_merchant()
            .map(|profile| profile.location)
            .ok_or(DispatchError::MissingPickup(order.id()))
    }

    /// Opens a tracking for `order` carried by `driver`.
    ///
    /// Pickup and drop-off come from the merchant and the order; the driver's
    /// last known location is the first route point. Both estimates assume a
    /// straight line at the configured speed.
    pub fn create_delivery_tracking(
        &self,
        order: &Order,
        merchant: &User,
        driver: &User,
    ) -> std::result::Result<(DeliveryTracking, Vec<TrackingEvent>), DomainError> {
        let now = Utc::now();
        let plan = plan_delivery(order, merchant, driver, self.config.assumed_speed_kmh, now)?;
        Ok(DeliveryTracking::for_assignment(
            AggregateId::new(),
            order,
            driver.user_id(),
            plan,
            now,
        ))
    }

    /// Puts a driver back online and offers them the waiting orders.
    ///
    /// Returns how many waiting orders got a driver.
    #[tracing::instrument(skip(self))]
    pub async fn release_delivery(&self, driver_id: UserId) -> Result<usize> {
        self.users.set_driver_availability(driver_id, true).await?;
        self.process_waiting_queue().await
    }

    /// Retries the oldest ready orders without a driver, up to the configured
    /// batch size. Failures are logged per order and do not stop the batch.
    pub async fn process_waiting_queue(&self) -> Result<usize> {
        let waiting = self
            .orders
            .ready_unassigned(self.config.queue_batch_size)
            .await?;

        let mut assigned = 0;
        for order in waiting {
            match self.assign_delivery_to_order(order.id()).await {
                Ok(AssignmentOutcome::Assigned { .. }) => assigned += 1,
                Ok(_) => {}
                Err(err) => tracing::warn!(
                    order_id = %order.id(),
                    error = %err,
                    "Waiting order could not be assigned"
                ),
            }
        }
        Ok(assigned)
    }
}

/// Pickup/drop-off targets and estimates for a new tracking.
pub fn plan_delivery(
    order: &Order,
    merchant: &User,
    driver: &User,
    speed_kmh: f64,
    now: DateTime<Utc>,
) -> std::result::Result<TrackingPlan, DomainError> {
    let profile = merchant
        .as_merchant()
        .ok_or(UserError::NotAMerchant(merchant.user_id()))?;
    let start = driver.as_driver().and_then(|d| d.location);

    let pickup_point = profile.location;
    let drop_off = order.delivery();
    let to_pickup = start.map_or(0.0, |s| s.distance_m(&pickup_point));
    let to_drop_off = pickup_point.distance_m(&drop_off.location);

    let estimated_pickup_time = now + travel_time(to_pickup, speed_kmh);
    let estimated_delivery_time = estimated_pickup_time + travel_time(to_drop_off, speed_kmh);

    Ok(TrackingPlan {
        pickup: TargetLocation::new(pickup_point, profile.pickup_address.clone()),
        delivery: TargetLocation::new(
            drop_off.location,
            format!("{}, {}", drop_off.address.street, drop_off.address.city),
        ),
        start,
        estimated_pickup_time,
        estimated_delivery_time,
    })
}

fn travel_time(distance_m: f64, speed_kmh: f64) -> chrono::Duration {
    if speed_kmh <= 0.0 {
        return chrono::Duration::zero();
    }
    let seconds = distance_m / (speed_kmh * 1000.0 / 3600.0);
    chrono::Duration::seconds(seconds.round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn travel_time_at_25_kmh() {
        // 25 km/h is 6.944 m/s: 5 km takes 12 minutes.
        assert_eq!(travel_time(5_000.0, 25.0), chrono::Duration::minutes(12));
        assert_eq!(travel_time(0.0, 25.0), chrono::Duration::zero());
        assert_eq!(travel_time(1_000.0, 0.0), chrono::Duration::zero());
    }
}
