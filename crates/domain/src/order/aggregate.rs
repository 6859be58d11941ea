//! Order aggregate implementation.

use chrono::{DateTime, Duration, Utc};
use common::{AggregateId, UserId};
use document_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregate;
use crate::cart::Cart;
use crate::history::StatusChange;
use crate::validation::ValidationError;

use super::{
    DeliveryInfo, Money, OrderError, OrderEvent, OrderItem, OrderStatus, OrderTotals,
    PaymentMethod, PricingPolicy,
    events::{DriverAssignedData, OrderPlacedData, OrderStatusChangedData},
};

/// Minutes a merchant needs before any item is prepared.
const BASE_PREPARATION_MINUTES: i64 = 30;
/// Additional preparation minutes per unit ordered.
const MINUTES_PER_ITEM: i64 = 5;
/// Fixed allowance for the trip from merchant to customer.
const TRANSIT_MINUTES: i64 = 20;

/// Order aggregate root.
///
/// Represents a purchase from placement at checkout to delivery or
/// cancellation. The status only changes through [`Order::update_status`]
/// (or [`Order::assign_driver`], which goes through it), so every accepted
/// change appends exactly one history entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    id: AggregateId,

    /// Human readable reference, `ORD-YYYYMMDD-XXXXXX`.
    order_number: String,

    customer_id: UserId,
    merchant_id: UserId,

    /// Driver bound by the assignment transaction. Stored as `null` while
    /// unassigned so the waiting queue can filter on it.
    driver_id: Option<UserId>,

    items: Vec<OrderItem>,
    totals: OrderTotals,
    delivery: DeliveryInfo,
    payment_method: PaymentMethod,
    status: OrderStatus,
    status_history: Vec<StatusChange<OrderStatus>>,

    estimated_delivery_time: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    prepared_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,

    /// Current version for optimistic concurrency.
    #[serde(default)]
    version: Version,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn collection() -> &'static str {
        "orders"
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
impl Order {
    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn customer_id(&self) -> UserId {
        self.customer_id
    }

    pub fn merchant_id(&self) -> UserId {
        self.merchant_id
    }

    pub fn driver_id(&self) -> Option<UserId> {
        self.driver_id
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    /// Returns the total quantity of all items.
    pub fn total_quantity(&self) -> u32 {
        self.items
            .iter()
            .fold(0u32, |total, item| total.saturating_add(item.quantity))
    }

    pub fn totals(&self) -> &OrderTotals {
        &self.totals
    }

    pub fn total(&self) -> Money {
        self.totals.total()
    }

    pub fn delivery(&self) -> &DeliveryInfo {
        &self.delivery
    }

    pub fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn status_history(&self) -> &[StatusChange<OrderStatus>] {
        &self.status_history
    }

    pub fn estimated_delivery_time(&self) -> DateTime<Utc> {
        self.estimated_delivery_time
    }

    pub fn confirmed_at(&self) -> Option<DateTime<Utc>> {
        self.confirmed_at
    }

    pub fn prepared_at(&self) -> Option<DateTime<Utc>> {
        self.prepared_at
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns true if the transition table has an edge from the current status to `next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.status.can_transition_to(next)
    }

    /// Returns true if the order is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// Command methods (mutate in place and return events)
impl Order {
    /// Places an order from a cart snapshot.
    ///
    /// The order starts `pending` at version 0 with a single history entry.
    /// The cart itself is not touched; clearing it is the caller's job.
    pub fn place(
        id: AggregateId,
        cart: &Cart,
        delivery: DeliveryInfo,
        payment_method: PaymentMethod,
        pricing: &PricingPolicy,
        now: DateTime<Utc>,
    ) -> Result<(Self, Vec<OrderEvent>), ValidationError> {
        let merchant_id = match cart.merchant_id() {
            Some(merchant_id) if !cart.is_empty() => merchant_id,
            _ => return Err(ValidationError::EmptyCart),
        };
        delivery.validate()?;
        for item in cart.items() {
            item.validate()?;
        }

        let totals = pricing.quote(cart.subtotal()?, cart.discount())?;
        let order = Self {
            id,
            order_number: order_number(id, now),
            customer_id: cart.customer_id(),
            merchant_id,
            driver_id: None,
            items: cart.items().to_vec(),
            totals,
            delivery,
            payment_method,
            status: OrderStatus::Pending,
            status_history: vec![StatusChange::manual(
                OrderStatus::Pending,
                OrderStatus::Pending.default_description(),
                Some(cart.customer_id()),
                now,
            )],
            estimated_delivery_time: calculate_delivery_time(cart.total_quantity(), now),
            confirmed_at: None,
            prepared_at: None,
            delivered_at: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
            version: Version::initial(),
        };

        let event = OrderEvent::OrderPlaced(OrderPlacedData {
            order_id: order.id,
            order_number: order.order_number.clone(),
            customer_id: order.customer_id,
            merchant_id: order.merchant_id,
            total: order.total(),
            item_count: order.total_quantity(),
            estimated_delivery_time: order.estimated_delivery_time,
            placed_at: now,
        });
        Ok((order, vec![event]))
    }

    /// Moves the order to `next`, appending one history entry.
    ///
    /// `description` defaults to a per-status message. Fails with
    /// `InvalidTransition` and leaves the order untouched when the table has
    /// no edge from the current status to `next`.
    pub fn update_status(
        &mut self,
        next: OrderStatus,
        description: Option<String>,
        actor: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        let from = self.status;
        if !from.can_transition_to(next) {
            return Err(OrderError::InvalidTransition { from, to: next });
        }

        self.status = next;
        self.status_history.push(StatusChange::manual(
            next,
            description.unwrap_or_else(|| next.default_description().to_string()),
            actor,
            now,
        ));
        match next {
            OrderStatus::Confirmed => self.confirmed_at = Some(now),
            OrderStatus::Ready => self.prepared_at = Some(now),
            OrderStatus::Delivered => self.delivered_at = Some(now),
            OrderStatus::Cancelled => self.cancelled_at = Some(now),
            _ => {}
        }
        self.updated_at = now;

        Ok(vec![OrderEvent::OrderStatusChanged(OrderStatusChangedData {
            order_id: self.id,
            order_number: self.order_number.clone(),
            customer_id: self.customer_id,
            merchant_id: self.merchant_id,
            driver_id: self.driver_id,
            from,
            to: next,
            total: self.total(),
            actor,
            changed_at: now,
        })])
    }

    /// Binds a driver and moves the order from `ready` to `assigned`.
    pub fn assign_driver(
        &mut self,
        driver_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if let Some(existing) = self.driver_id {
            return Err(OrderError::DriverAlreadyAssigned {
                driver_id: existing,
            });
        }
        if !self.can_transition_to(OrderStatus::Assigned) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: OrderStatus::Assigned,
            });
        }

        self.driver_id = Some(driver_id);
        let mut events = vec![OrderEvent::DriverAssigned(DriverAssignedData {
            order_id: self.id,
            driver_id,
            assigned_at: now,
        })];
        events.extend(self.update_status(OrderStatus::Assigned, None, None, now)?);
        Ok(events)
    }
}

/// Estimated delivery: base preparation, plus time per unit, plus transit.
pub fn calculate_delivery_time(total_quantity: u32, now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::minutes(
        BASE_PREPARATION_MINUTES + MINUTES_PER_ITEM * i64::from(total_quantity) + TRANSIT_MINUTES,
    )
}

fn order_number(id: AggregateId, now: DateTime<Utc>) -> String {
    let suffix: String = id.as_uuid().simple().to_string()[..6].to_uppercase();
    format!("ORD-{}-{}", now.format("%Y%m%d"), suffix)
}
