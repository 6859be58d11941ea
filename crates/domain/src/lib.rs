//! Domain layer for the delivery coordination system.
//!
//! This crate provides:
//! - The `Aggregate` and `DomainEvent` traits and a versioned `Repository`
//! - Order and delivery tracking aggregates with table-driven status machines
//! - Carts and users (customers, merchants, drivers)
//! - Bounded retry and multi-aggregate transactions

pub mod aggregate;
pub mod cart;
pub mod error;
pub mod geo;
pub mod history;
pub mod order;
pub mod repository;
pub mod retry;
pub mod tracking;
pub mod transaction;
pub mod user;
pub mod validation;

pub use aggregate::{Aggregate, DomainEvent};
pub use cart::{Cart, CartError, CartEvent, CartService};
pub use error::DomainError;
pub use geo::{GeoPoint, haversine_distance_m};
pub use history::StatusChange;
pub use order::{
    DeliveryAddress, DeliveryInfo, Money, Order, OrderError, OrderEvent, OrderItem, OrderService,
    OrderStatus, PaymentMethod, PlaceOrder, PricingPolicy, ProductId, UpdateOrderStatus,
};
pub use repository::{CommandResult, Repository};
pub use retry::{RetryError, RetryPolicy, retry_when};
pub use tracking::{
    CompleteDelivery, DeliveryProof, DeliveryTracking, LocationSample, TrackingError,
    TrackingEvent, TrackingPlan, TrackingService, TrackingStatus, UpdateDeliveryStatus,
    UpdateLocation,
};
pub use transaction::{
    Assignment, Transaction, assign_delivery_person, create_order_and_clear_cart,
    with_retry, with_transaction,
};
pub use user::{User, UserError, UserEvent, UserService, Vehicle, VehicleKind};
pub use validation::ValidationError;
