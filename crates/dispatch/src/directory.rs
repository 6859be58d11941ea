//! Driver lookup for the matcher.

use async_trait::async_trait;
use common::UserId;
use document_store::DocumentStore;
use domain::{DeliveryTracking, DomainError, GeoPoint, Repository, UserService};

use crate::scoring::Candidate;

/// Where the matcher finds drivers.
#[async_trait]
pub trait DriverDirectory: Send + Sync {
    /// Approved, online drivers with a known location within `radius_m` of
    /// `point`, nearest first. `active_deliveries` is left at 0.
    async fn find_available_near(
        &self,
        point: GeoPoint,
        radius_m: f64,
    ) -> Result<Vec<Candidate>, DomainError>;

    /// Number of live deliveries the driver is carrying.
    async fn active_delivery_count(&self, driver_id: UserId) -> Result<usize, DomainError>;
}

/// Directory backed by the user and tracking documents.
///
/// Distances are computed in process over the online driver set.
pub struct StoreDriverDirectory<S: DocumentStore> {
    users: UserService<S>,
    trackings: Repository<S, DeliveryTracking>,
}

impl<S: DocumentStore + Clone> StoreDriverDirectory<S> {
    pub fn new(store: S) -> Self {
        Self {
            users: UserService::new(store.clone()),
            trackings: Repository::new(store),
        }
    }
}

#[async_trait]
impl<S: DocumentStore> DriverDirectory for StoreDriverDirectory<S> {
    async fn find_available_near(
        &self,
        point: GeoPoint,
        radius_m: f64,
    ) -> Result<Vec<Candidate>, DomainError> {
        let mut nearby: Vec<Candidate> = self
            .users
            .available_drivers()
            .await?
            .iter()
            .filter_map(|user| {
                let profile = user.as_driver()?;
                let location = profile.location?;
                let distance_m = point.distance_m(&location);
                (distance_m <= radius_m).then(|| Candidate {
                    driver_id: user.user_id(),
                    location,
                    distance_m,
                    rating: profile.rating,
                    active_deliveries: 0,
                })
            })
            .collect();
        nearby.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
        Ok(nearby)
    }

    async fn active_delivery_count(&self, driver_id: UserId) -> Result<usize, DomainError> {
        let live = self
            .trackings
            .find(
                serde_json::json!({ "driver_id": driver_id, "is_live": true }),
                None,
            )
            .await?;
        Ok(live.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use document_store::InMemoryDocumentStore;
    use domain::{User, Vehicle, VehicleKind};

    const PICKUP: GeoPoint = GeoPoint {
        longitude: -69.9312,
        latitude: 18.4861,
    };

    async fn driver_at(
        users: &UserService<InMemoryDocumentStore>,
        location: Option<GeoPoint>,
        online: bool,
    ) -> UserId {
        let id = users
            .register(User::driver(
                "Driver",
                "driver@example.com",
                Vehicle {
                    kind: VehicleKind::Car,
                    plate: None,
                },
                4.0,
            ))
            .await
            .unwrap()
            .user_id();
        users.approve_driver(id).await.unwrap();
        if let Some(location) = location {
            users.update_driver_location(id, location).await.unwrap();
        }
        if online {
            users.set_driver_availability(id, true).await.unwrap();
        }
        id
    }

    #[tokio::test]
    async fn finds_online_drivers_within_radius_nearest_first() {
        let store = InMemoryDocumentStore::new();
        let users = UserService::new(store.clone());
        let far = driver_at(
            &users,
            Some(GeoPoint {
                longitude: -69.98,
                latitude: 18.49,
            }),
            true,
        )
        .await;
        let near = driver_at(
            &users,
            Some(GeoPoint {
                longitude: -69.932,
                latitude: 18.487,
            }),
            true,
        )
        .await;
        // Out of range, offline, and unlocated drivers are never returned.
        driver_at(
            &users,
            Some(GeoPoint {
                longitude: -70.70,
                latitude: 19.45,
            }),
            true,
        )
        .await;
        driver_at(&users, Some(PICKUP), false).await;
        driver_at(&users, None, true).await;

        let directory = StoreDriverDirectory::new(store);
        let found = directory.find_available_near(PICKUP, 15_000.0).await.unwrap();

        let ids: Vec<_> = found.iter().map(|c| c.driver_id).collect();
        assert_eq!(ids, vec![near, far]);
        assert!(found[0].distance_m < found[1].distance_m);
    }

    #[tokio::test]
    async fn drivers_without_trackings_are_idle() {
        let store = InMemoryDocumentStore::new();
        let directory = StoreDriverDirectory::new(store);
        assert_eq!(
            directory.active_delivery_count(UserId::new()).await.unwrap(),
            0
        );
    }
}
