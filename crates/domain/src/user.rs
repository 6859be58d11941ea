//! Marketplace participants.
//!
//! Customers, merchants and drivers share one document shape; the role
//! specific fields live in a tagged [`RoleProfile`] rather than side by side.

use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{AggregateId, UserId};
use document_store::{DocumentStore, Version};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aggregate::{Aggregate, DomainEvent};
use crate::error::DomainError;
use crate::geo::GeoPoint;
use crate::order::{DeliveryAddress, Money};
use crate::repository::{CommandResult, Repository};
use crate::retry::RetryPolicy;
use crate::validation::{ValidationError, require_non_blank};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum UserError {
    #[error("User {0} is not a driver")]
    NotADriver(UserId),

    #[error("User {0} is not a merchant")]
    NotAMerchant(UserId),

    #[error("Driver {0} is not approved")]
    NotApproved(UserId),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleKind {
    Bicycle,
    Motorcycle,
    Car,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub kind: VehicleKind,
    pub plate: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub default_address: Option<DeliveryAddress>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchantStats {
    pub completed_orders: u64,
    pub revenue: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantProfile {
    pub business_name: String,
    pub pickup_address: String,
    pub location: GeoPoint,
    #[serde(default)]
    pub stats: MerchantStats,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverStats {
    pub completed_deliveries: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverProfile {
    /// Set once an operator has vetted the driver. Unapproved drivers are
    /// never matched and cannot go online.
    pub approved: bool,
    pub available: bool,
    pub location: Option<GeoPoint>,
    pub location_updated_at: Option<DateTime<Utc>>,
    /// Average customer rating, 0 to 5.
    pub rating: f64,
    pub vehicle: Vehicle,
    #[serde(default)]
    pub stats: DriverStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum RoleProfile {
    Customer(CustomerProfile),
    Merchant(MerchantProfile),
    Driver(DriverProfile),
}

impl RoleProfile {
    pub fn role(&self) -> &'static str {
        match self {
            RoleProfile::Customer(_) => "customer",
            RoleProfile::Merchant(_) => "merchant",
            RoleProfile::Driver(_) => "driver",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum UserEvent {
    UserRegistered {
        user_id: UserId,
        role: String,
    },
    DriverApproved {
        driver_id: UserId,
    },
    DriverAvailabilityChanged {
        driver_id: UserId,
        available: bool,
    },
    DriverLocationUpdated {
        driver_id: UserId,
        location: GeoPoint,
    },
    StatsRecorded {
        user_id: UserId,
        completed: u64,
    },
}

impl DomainEvent for UserEvent {
    fn event_type(&self) -> &'static str {
        match self {
            UserEvent::UserRegistered { .. } => "UserRegistered",
            UserEvent::DriverApproved { .. } => "DriverApproved",
            UserEvent::DriverAvailabilityChanged { .. } => "DriverAvailabilityChanged",
            UserEvent::DriverLocationUpdated { .. } => "DriverLocationUpdated",
            UserEvent::StatsRecorded { .. } => "StatsRecorded",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    id: AggregateId,
    name: String,
    email: String,
    phone: Option<String>,
    profile: RoleProfile,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    version: Version,
}

impl Aggregate for User {
    type Event = UserEvent;
    type Error = UserError;

    fn aggregate_type() -> &'static str {
        "User"
    }

    fn collection() -> &'static str {
        "users"
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

impl User {
    fn with_profile(name: impl Into<String>, email: impl Into<String>, profile: RoleProfile) -> Self {
        let now = Utc::now();
        Self {
            id: AggregateId::new(),
            name: name.into(),
            email: email.into(),
            phone: None,
            profile,
            created_at: now,
            updated_at: now,
            version: Version::initial(),
        }
    }

    pub fn customer(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self::with_profile(name, email, RoleProfile::Customer(CustomerProfile::default()))
    }

    pub fn merchant(
        business_name: impl Into<String>,
        email: impl Into<String>,
        pickup_address: impl Into<String>,
        location: GeoPoint,
    ) -> Self {
        let business_name = business_name.into();
        Self::with_profile(
            business_name.clone(),
            email,
            RoleProfile::Merchant(MerchantProfile {
                business_name,
                pickup_address: pickup_address.into(),
                location,
                stats: MerchantStats::default(),
            }),
        )
    }

    /// A new driver, offline and awaiting approval.
    pub fn driver(
        name: impl Into<String>,
        email: impl Into<String>,
        vehicle: Vehicle,
        rating: f64,
    ) -> Self {
        Self::with_profile(
            name,
            email,
            RoleProfile::Driver(DriverProfile {
                approved: false,
                available: false,
                location: None,
                location_updated_at: None,
                rating,
                vehicle,
                stats: DriverStats::default(),
            }),
        )
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn user_id(&self) -> UserId {
        UserId::from(self.id)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }

    pub fn profile(&self) -> &RoleProfile {
        &self.profile
    }

    pub fn as_driver(&self) -> Option<&DriverProfile> {
        match &self.profile {
            RoleProfile::Driver(driver) => Some(driver),
            _ => None,
        }
    }

    pub fn as_merchant(&self) -> Option<&MerchantProfile> {
        match &self.profile {
            RoleProfile::Merchant(merchant) => Some(merchant),
            _ => None,
        }
    }

    /// Checks the fields every role needs plus the role's own constraints.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_blank("name", &self.name)?;
        require_non_blank("email", &self.email)?;
        match &self.profile {
            RoleProfile::Customer(_) => Ok(()),
            RoleProfile::Merchant(merchant) => {
                require_non_blank("pickup_address", &merchant.pickup_address)?;
                merchant.location.validate()
            }
            RoleProfile::Driver(driver) => {
                if !(0.0..=5.0).contains(&driver.rating) {
                    return Err(ValidationError::InvalidRating(driver.rating));
                }
                driver.location.as_ref().map_or(Ok(()), GeoPoint::validate)
            }
        }
    }

    fn driver_mut(&mut self) -> Result<&mut DriverProfile, UserError> {
        let id = self.user_id();
        match &mut self.profile {
            RoleProfile::Driver(driver) => Ok(driver),
            _ => Err(UserError::NotADriver(id)),
        }
    }

    fn merchant_mut(&mut self) -> Result<&mut MerchantProfile, UserError> {
        let id = self.user_id();
        match &mut self.profile {
            RoleProfile::Merchant(merchant) => Ok(merchant),
            _ => Err(UserError::NotAMerchant(id)),
        }
    }

    pub fn approve(&mut self, now: DateTime<Utc>) -> Result<Vec<UserEvent>, UserError> {
        let driver_id = self.user_id();
        let driver = self.driver_mut()?;
        if driver.approved {
            return Ok(vec![]);
        }
        driver.approved = true;
        self.updated_at = now;
        Ok(vec![UserEvent::DriverApproved { driver_id }])
    }

    /// Takes a driver on or off line. Going online requires approval.
    pub fn set_availability(
        &mut self,
        available: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<UserEvent>, UserError> {
        let driver_id = self.user_id();
        let driver = self.driver_mut()?;
        if available && !driver.approved {
            return Err(UserError::NotApproved(driver_id));
        }
        if driver.available == available {
            return Ok(vec![]);
        }
        driver.available = available;
        self.updated_at = now;
        Ok(vec![UserEvent::DriverAvailabilityChanged {
            driver_id,
            available,
        }])
    }

    pub fn update_location(
        &mut self,
        location: GeoPoint,
        now: DateTime<Utc>,
    ) -> Result<Vec<UserEvent>, UserError> {
        location.validate()?;
        let driver_id = self.user_id();
        let driver = self.driver_mut()?;
        driver.location = Some(location);
        driver.location_updated_at = Some(now);
        self.updated_at = now;
        Ok(vec![UserEvent::DriverLocationUpdated {
            driver_id,
            location,
        }])
    }

    pub fn record_delivery(&mut self, now: DateTime<Utc>) -> Result<Vec<UserEvent>, UserError> {
        let user_id = self.user_id();
        let driver = self.driver_mut()?;
        driver.stats.completed_deliveries += 1;
        let completed = driver.stats.completed_deliveries;
        self.updated_at = now;
        Ok(vec![UserEvent::StatsRecorded { user_id, completed }])
    }

    pub fn record_completed_order(
        &mut self,
        revenue: Money,
        now: DateTime<Utc>,
    ) -> Result<Vec<UserEvent>, UserError> {
        let user_id = self.user_id();
        let merchant = self.merchant_mut()?;
        merchant.stats.completed_orders += 1;
        merchant.stats.revenue = merchant.stats.revenue.saturating_add(revenue);
        let completed = merchant.stats.completed_orders;
        self.updated_at = now;
        Ok(vec![UserEvent::StatsRecorded { user_id, completed }])
    }
}

/// User registration and profile updates.
pub struct UserService<S: DocumentStore> {
    repository: Repository<S, User>,
    policy: RetryPolicy,
}

impl<S: DocumentStore + Clone> Clone for UserService<S> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            policy: self.policy.clone(),
        }
    }
}

impl<S: DocumentStore> UserService<S> {
    pub fn new(store: S) -> Self {
        Self {
            repository: Repository::new(store),
            policy: RetryPolicy::exponential(3, Duration::from_millis(50)),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn repository(&self) -> &Repository<S, User> {
        &self.repository
    }

    #[tracing::instrument(skip(self, user), fields(role = user.profile().role()))]
    pub async fn register(&self, user: User) -> Result<User, DomainError> {
        user.validate()?;
        let event = UserEvent::UserRegistered {
            user_id: user.user_id(),
            role: user.profile().role().to_string(),
        };
        let user = self.repository.insert(user, &[event]).await?;
        tracing::info!(user_id = %user.user_id(), "User registered");
        Ok(user)
    }

    pub async fn get(&self, user_id: UserId) -> Result<User, DomainError> {
        self.repository.get(user_id.as_aggregate_id()).await
    }

    pub async fn approve_driver(&self, driver_id: UserId) -> Result<User, DomainError> {
        self.update(driver_id, |user| user.approve(Utc::now())).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_driver_availability(
        &self,
        driver_id: UserId,
        available: bool,
    ) -> Result<User, DomainError> {
        self.update(driver_id, |user| user.set_availability(available, Utc::now()))
            .await
    }

    pub async fn update_driver_location(
        &self,
        driver_id: UserId,
        location: GeoPoint,
    ) -> Result<User, DomainError> {
        self.update(driver_id, |user| user.update_location(location, Utc::now()))
            .await
    }

    pub async fn record_delivery(&self, driver_id: UserId) -> Result<User, DomainError> {
        self.update(driver_id, |user| user.record_delivery(Utc::now()))
            .await
    }

    pub async fn record_completed_order(
        &self,
        merchant_id: UserId,
        revenue: Money,
    ) -> Result<User, DomainError> {
        self.update(merchant_id, |user| {
            user.record_completed_order(revenue, Utc::now())
        })
        .await
    }

    /// Approved drivers currently online.
    pub async fn available_drivers(&self) -> Result<Vec<User>, DomainError> {
        self.repository
            .find(
                serde_json::json!({
                    "profile": { "role": "driver", "approved": true, "available": true }
                }),
                None,
            )
            .await
    }

    async fn update<F>(&self, user_id: UserId, change: F) -> Result<User, DomainError>
    where
        F: Fn(&mut User) -> Result<Vec<UserEvent>, UserError>,
    {
        self.repository
            .execute_with_retry(user_id.as_aggregate_id(), &self.policy, change)
            .await
            .map(|CommandResult { aggregate, .. }| aggregate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use document_store::InMemoryDocumentStore;

    fn scooter() -> Vehicle {
        Vehicle {
            kind: VehicleKind::Motorcycle,
            plate: Some("K123456".to_string()),
        }
    }

    #[test]
    fn profile_serializes_with_role_tag() {
        let user = User::driver("Luis", "luis@example.com", scooter(), 4.8);
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["profile"]["role"], "driver");
        assert_eq!(json["profile"]["approved"], false);

        let back: User = serde_json::from_value(json).unwrap();
        assert!(back.as_driver().is_some());
        assert!(back.as_merchant().is_none());
    }

    #[test]
    fn unapproved_driver_cannot_go_online() {
        let mut user = User::driver("Luis", "luis@example.com", scooter(), 4.8);
        let id = user.user_id();
        assert_eq!(
            user.set_availability(true, Utc::now()),
            Err(UserError::NotApproved(id))
        );

        user.approve(Utc::now()).unwrap();
        assert_eq!(user.set_availability(true, Utc::now()).unwrap().len(), 1);
        assert!(user.set_availability(true, Utc::now()).unwrap().is_empty());
    }

    #[test]
    fn role_specific_commands_reject_other_roles() {
        let mut customer = User::customer("Ana", "ana@example.com");
        let id = customer.user_id();
        assert_eq!(
            customer.record_delivery(Utc::now()),
            Err(UserError::NotADriver(id))
        );
        assert_eq!(
            customer.record_completed_order(Money::from_cents(100), Utc::now()),
            Err(UserError::NotAMerchant(id))
        );
    }

    #[test]
    fn driver_rating_is_validated() {
        let user = User::driver("Luis", "luis@example.com", scooter(), 7.0);
        assert_eq!(user.validate(), Err(ValidationError::InvalidRating(7.0)));
    }

    #[test]
    fn merchant_stats_accumulate() {
        let mut merchant = User::merchant(
            "Panadería Sol",
            "sol@example.com",
            "Calle Mercedes 3",
            GeoPoint {
                longitude: -69.89,
                latitude: 18.47,
            },
        );
        merchant
            .record_completed_order(Money::from_cents(1500), Utc::now())
            .unwrap();
        merchant
            .record_completed_order(Money::from_cents(500), Utc::now())
            .unwrap();

        let stats = merchant.as_merchant().unwrap().stats;
        assert_eq!(stats.completed_orders, 2);
        assert_eq!(stats.revenue, Money::from_cents(2000));
    }

    #[tokio::test]
    async fn available_drivers_lists_only_approved_online_drivers() {
        let service = UserService::new(InMemoryDocumentStore::new());

        let online = service
            .register(User::driver("Online", "a@example.com", scooter(), 4.5))
            .await
            .unwrap();
        service.approve_driver(online.user_id()).await.unwrap();
        service
            .set_driver_availability(online.user_id(), true)
            .await
            .unwrap();

        let offline = service
            .register(User::driver("Offline", "b@example.com", scooter(), 4.9))
            .await
            .unwrap();
        service.approve_driver(offline.user_id()).await.unwrap();
        service
            .register(User::customer("Ana", "ana@example.com"))
            .await
            .unwrap();

        let drivers = service.available_drivers().await.unwrap();
        assert_eq!(drivers.len(), 1);
        assert_eq!(drivers[0].user_id(), online.user_id());
    }

    #[tokio::test]
    async fn register_rejects_invalid_user() {
        let service = UserService::new(InMemoryDocumentStore::new());
        let result = service.register(User::customer("", "ana@example.com")).await;
        assert!(matches!(
            result,
            Err(DomainError::Validation(ValidationError::MissingField("name")))
        ));
    }
}
