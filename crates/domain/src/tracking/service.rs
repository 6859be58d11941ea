//! Delivery tracking service.
//!
//! Every mutation goes through [`Repository::execute_with_retry`]: read the
//! tracking, apply the change, write it conditioned on the version read, and
//! on a version conflict back off and start over.

use chrono::Utc;
use common::AggregateId;
use document_store::DocumentStore;

use crate::aggregate::Aggregate;
use crate::error::DomainError;
use crate::order::Order;
use crate::repository::{CommandResult, Repository};
use crate::retry::RetryPolicy;

use super::{
    CompleteDelivery, DeliveryTracking, TrackingError, TrackingEvent, UpdateDeliveryStatus,
    UpdateLocation,
};

/// Result of a location update.
#[derive(Debug, Clone)]
pub struct LocationOutcome {
    pub tracking: DeliveryTracking,
    /// True when the sample triggered a geofence arrival.
    pub status_changed: bool,
}

pub struct TrackingService<S: DocumentStore> {
    trackings: Repository<S, DeliveryTracking>,
    orders: Repository<S, Order>,
    policy: RetryPolicy,
}

impl<S: DocumentStore + Clone> Clone for TrackingService<S> {
    fn clone(&self) -> Self {
        Self {
            trackings: self.trackings.clone(),
            orders: self.orders.clone(),
            policy: self.policy.clone(),
        }
    }
}

impl<S: DocumentStore + Clone> TrackingService<S> {
    /// Creates a service retrying conflicts with [`RetryPolicy::optimistic_update`].
    pub fn new(store: S) -> Self {
        Self {
            trackings: Repository::new(store.clone()),
            orders: Repository::new(store),
            policy: RetryPolicy::optimistic_update(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn repository(&self) -> &Repository<S, DeliveryTracking> {
        &self.trackings
    }

    pub async fn get(&self, tracking_id: AggregateId) -> Result<DeliveryTracking, DomainError> {
        self.trackings.get(tracking_id).await
    }

    pub async fn find_by_order(
        &self,
        order_id: AggregateId,
    ) -> Result<Option<DeliveryTracking>, DomainError> {
        let mut found = self
            .trackings
            .find(serde_json::json!({ "order_id": order_id }), Some(1))
            .await?;
        Ok(found.pop())
    }

    /// Persists a new tracking after checking its order exists and has no
    /// tracking yet.
    #[tracing::instrument(skip_all, fields(order_id = %tracking.order_id()))]
    pub async fn create(
        &self,
        tracking: DeliveryTracking,
        events: &[TrackingEvent],
    ) -> Result<DeliveryTracking, DomainError> {
        let order_id = tracking.order_id();
        if self.orders.load(order_id).await?.is_none() {
            return Err(DomainError::ReferentialIntegrity {
                entity: "order",
                id: order_id,
            });
        }
        if let Some(existing) = self.find_by_order(order_id).await? {
            return Err(DomainError::ReferentialIntegrity {
                entity: "delivery_tracking",
                id: existing.id(),
            });
        }
        self.trackings.insert(tracking, events).await
    }

    #[tracing::instrument(skip_all, fields(tracking_id = %cmd.tracking_id, operation_id = %cmd.operation_id))]
    pub async fn update_location(&self, cmd: UpdateLocation) -> Result<LocationOutcome, DomainError> {
        let UpdateLocation {
            tracking_id,
            sample,
            operation_id,
        } = cmd;

        let result = self
            .mutate(tracking_id, |tracking| {
                tracking.update_location(sample.clone(), &operation_id, Utc::now())
            })
            .await?;

        let status_changed = result
            .events
            .iter()
            .any(|event| matches!(event, TrackingEvent::TrackingStatusChanged(_)));
        metrics::counter!("tracking_location_updates_total").increment(1);
        if status_changed {
            tracing::info!(status = %result.aggregate.status(), "Geofence arrival");
        }

        Ok(LocationOutcome {
            tracking: result.aggregate,
            status_changed,
        })
    }

    #[tracing::instrument(skip_all, fields(tracking_id = %cmd.tracking_id, status = %cmd.status))]
    pub async fn update_status(
        &self,
        cmd: UpdateDeliveryStatus,
    ) -> Result<DeliveryTracking, DomainError> {
        let UpdateDeliveryStatus {
            tracking_id,
            status,
            notes,
            location,
            actor,
            operation_id,
        } = cmd;

        let result = self
            .mutate(tracking_id, |tracking| {
                tracking.update_status(
                    status,
                    notes.clone(),
                    location.clone(),
                    actor,
                    &operation_id,
                    Utc::now(),
                )
            })
            .await?;

        tracing::info!(new_version = %result.new_version, "Delivery status updated");
        Ok(result.aggregate)
    }

    #[tracing::instrument(skip_all, fields(tracking_id = %cmd.tracking_id))]
    pub async fn complete_delivery(
        &self,
        cmd: CompleteDelivery,
    ) -> Result<DeliveryTracking, DomainError> {
        let CompleteDelivery {
            tracking_id,
            proof,
            actor,
            operation_id,
        } = cmd;

        let result = self
            .mutate(tracking_id, |tracking| {
                tracking.complete_delivery(proof.clone(), actor, &operation_id, Utc::now())
            })
            .await?;

        metrics::counter!("deliveries_completed_total").increment(1);
        tracing::info!(on_time = ?result.aggregate.on_time(), "Delivery completed");
        Ok(result.aggregate)
    }

    /// Recovery path for a tracking whose operation marker was left behind.
    pub async fn clear_stale_operation_lock(
        &self,
        tracking_id: AggregateId,
    ) -> Result<DeliveryTracking, DomainError> {
        let result = self
            .mutate(tracking_id, |tracking| {
                tracking.clear_stale_operation_lock(Utc::now())
            })
            .await?;
        Ok(result.aggregate)
    }

    async fn mutate<F>(
        &self,
        tracking_id: AggregateId,
        change: F,
    ) -> Result<CommandResult<DeliveryTracking>, DomainError>
    where
        F: Fn(&mut DeliveryTracking) -> Result<Vec<TrackingEvent>, TrackingError>,
    {
        self.trackings
            .execute_with_retry(tracking_id, &self.policy, change)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::Cart;
    use crate::geo::GeoPoint;
    use crate::order::{DeliveryAddress, DeliveryInfo, Money, OrderItem, PaymentMethod, PricingPolicy};
    use crate::tracking::{DeliveryProof, LocationSample, TargetLocation, TrackingPlan, TrackingStatus};
    use chrono::Duration;
    use common::{OperationId, UserId};
    use document_store::{InMemoryDocumentStore, Version};

    const PICKUP: GeoPoint = GeoPoint {
        longitude: -69.9365,
        latitude: 18.4712,
    };
    const DROPOFF: GeoPoint = GeoPoint {
        longitude: -69.9000,
        latitude: 18.4900,
    };

    fn new_order() -> Order {
        let now = Utc::now();
        let mut cart = Cart::new(UserId::new(), now);
        cart.add_item(
            UserId::new(),
            OrderItem::new("SKU-1", "Yaroa", 1, Money::from_cents(700)).unwrap(),
            now,
        )
        .unwrap();
        let delivery = DeliveryInfo {
            address: DeliveryAddress::new("Calle Beller 20", "Santiago"),
            location: DROPOFF,
            contact_phone: None,
        };
        Order::place(
            AggregateId::new(),
            &cart,
            delivery,
            PaymentMethod::Wallet,
            &PricingPolicy::default(),
            now,
        )
        .unwrap()
        .0
    }

    fn new_tracking(order: &Order) -> (DeliveryTracking, Vec<TrackingEvent>) {
        let now = Utc::now();
        let plan = TrackingPlan {
            pickup: TargetLocation::new(PICKUP, "Merchant"),
            delivery: TargetLocation::new(DROPOFF, "Customer"),
            start: None,
            estimated_pickup_time: now + Duration::minutes(10),
            estimated_delivery_time: now + Duration::minutes(40),
        };
        DeliveryTracking::for_assignment(AggregateId::new(), order, UserId::new(), plan, now)
    }

    async fn setup() -> (InMemoryDocumentStore, TrackingService<InMemoryDocumentStore>, DeliveryTracking) {
        let store = InMemoryDocumentStore::new();
        let order = new_order();
        Repository::<_, Order>::new(store.clone())
            .insert(order.clone(), &[])
            .await
            .unwrap();

        let service =
            TrackingService::new(store.clone()).with_retry_policy(RetryPolicy::immediate(3));
        let (tracking, events) = new_tracking(&order);
        let tracking = service.create(tracking, &events).await.unwrap();
        (store, service, tracking)
    }

    fn sample(lon: f64, lat: f64) -> LocationSample {
        LocationSample::at(
            GeoPoint {
                longitude: lon,
                latitude: lat,
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn create_requires_existing_order() {
        let store = InMemoryDocumentStore::new();
        let service = TrackingService::new(store);
        let order = new_order();
        let (tracking, events) = new_tracking(&order);

        let result = service.create(tracking, &events).await;
        assert!(matches!(
            result,
            Err(DomainError::ReferentialIntegrity { entity: "order", id }) if id == order.id()
        ));
    }

    #[tokio::test]
    async fn create_rejects_second_tracking_for_order() {
        let (_store, service, tracking) = setup().await;
        let order: Order = Repository::new(service.repository().store().clone())
            .get(tracking.order_id())
            .await
            .unwrap();

        let (second, events) = new_tracking(&order);
        let result = service.create(second, &events).await;
        assert!(matches!(
            result,
            Err(DomainError::ReferentialIntegrity {
                entity: "delivery_tracking",
                ..
            })
        ));
        assert_eq!(
            service.find_by_order(order.id()).await.unwrap().unwrap().id(),
            tracking.id()
        );
    }

    #[tokio::test]
    async fn location_update_reports_geofence_arrival() {
        let (_store, service, tracking) = setup().await;

        let far = service
            .update_location(UpdateLocation::new(
                tracking.id(),
                sample(-69.9600, 18.4500),
                OperationId::generate(),
            ))
            .await
            .unwrap();
        assert!(!far.status_changed);

        let near = service
            .update_location(UpdateLocation::new(
                tracking.id(),
                sample(-69.9360, 18.4715),
                OperationId::generate(),
            ))
            .await
            .unwrap();
        assert!(near.status_changed);
        assert_eq!(near.tracking.status(), TrackingStatus::AtPickup);
        assert_eq!(near.tracking.version(), Version::new(2));
    }

    #[tokio::test]
    async fn full_delivery_flow() {
        let (store, service, tracking) = setup().await;
        let id = tracking.id();

        for status in [
            TrackingStatus::HeadingToPickup,
            TrackingStatus::AtPickup,
            TrackingStatus::PickedUp,
            TrackingStatus::HeadingToDelivery,
            TrackingStatus::AtDelivery,
        ] {
            service
                .update_status(UpdateDeliveryStatus::new(id, status, OperationId::generate()))
                .await
                .unwrap();
        }

        let done = service
            .complete_delivery(CompleteDelivery::new(
                id,
                DeliveryProof {
                    notes: Some("Handed to customer".into()),
                    ..DeliveryProof::default()
                },
                OperationId::generate(),
            ))
            .await
            .unwrap();

        assert_eq!(done.status(), TrackingStatus::Delivered);
        assert!(!done.is_live());
        assert_eq!(done.version(), Version::new(6));

        let events = store.outbox_after(0, 100).await.unwrap();
        assert!(events.iter().any(|e| e.event_type == "DeliveryCompleted"));
    }

    #[tokio::test]
    async fn complete_delivery_from_wrong_status_fails_without_write() {
        let (store, service, tracking) = setup().await;
        let commits = store.commit_count();

        let result = service
            .complete_delivery(CompleteDelivery::new(
                tracking.id(),
                DeliveryProof::default(),
                OperationId::generate(),
            ))
            .await;

        assert!(matches!(
            result,
            Err(DomainError::Tracking(TrackingError::NotAtDelivery {
                status: TrackingStatus::Assigned
            }))
        ));
        assert_eq!(store.commit_count(), commits);
        assert_eq!(service.get(tracking.id()).await.unwrap().version(), Version::initial());
    }

    #[tokio::test]
    async fn replayed_operation_writes_once() {
        let (store, service, tracking) = setup().await;
        let op = OperationId::new("device-7:status:1");
        let cmd = UpdateDeliveryStatus::new(tracking.id(), TrackingStatus::HeadingToPickup, op);

        service.update_status(cmd.clone()).await.unwrap();
        let commits = store.commit_count();
        let replayed = service.update_status(cmd).await.unwrap();

        assert_eq!(store.commit_count(), commits);
        assert_eq!(replayed.version(), Version::new(1));
        assert_eq!(replayed.status_history().len(), 2);
    }

    #[tokio::test]
    async fn invalid_coordinates_are_a_validation_error() {
        let (_store, service, tracking) = setup().await;
        let result = service
            .update_location(UpdateLocation::new(
                tracking.id(),
                sample(-69.9, 120.0),
                OperationId::generate(),
            ))
            .await;
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }
}
