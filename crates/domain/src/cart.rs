//! Pre-checkout cart, one per customer.
//!
//! A cart holds line items from a single merchant. It is emptied exactly
//! when an order is created from it, in the same commit as the order insert.

use chrono::{DateTime, Utc};
use common::{AggregateId, UserId};
use document_store::{DocumentStore, Version};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::aggregate::{Aggregate, DomainEvent};
use crate::error::DomainError;
use crate::order::{Money, OrderItem, ProductId};
use crate::repository::Repository;
use crate::retry::{RetryPolicy, retry_when};
use crate::validation::ValidationError;

/// Errors that can occur during cart operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CartError {
    /// Items from a second merchant cannot join a non-empty cart.
    #[error("Cart holds items from merchant {current}, cannot add from {requested}")]
    MerchantMismatch { current: UserId, requested: UserId },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CartEvent {
    CartItemAdded {
        cart_id: AggregateId,
        customer_id: UserId,
        merchant_id: UserId,
        product_id: ProductId,
        quantity: u32,
    },
    CartDiscountApplied {
        cart_id: AggregateId,
        discount: Money,
    },
    CartCleared {
        cart_id: AggregateId,
        customer_id: UserId,
        cleared_items: usize,
    },
}

impl DomainEvent for CartEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CartEvent::CartItemAdded { .. } => "CartItemAdded",
            CartEvent::CartDiscountApplied { .. } => "CartDiscountApplied",
            CartEvent::CartCleared { .. } => "CartCleared",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    id: AggregateId,
    customer_id: UserId,
    merchant_id: Option<UserId>,
    items: Vec<OrderItem>,
    discount: Money,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    version: Version,
}

impl Aggregate for Cart {
    type Event = CartEvent;
    type Error = CartError;

    fn aggregate_type() -> &'static str {
        "Cart"
    }

    fn collection() -> &'static str {
        "carts"
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

impl Cart {
    /// An empty cart for `customer_id`.
    pub fn new(customer_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: Self::id_for(customer_id),
            customer_id,
            merchant_id: None,
            items: Vec::new(),
            discount: Money::zero(),
            updated_at: now,
            version: Version::initial(),
        }
    }

    /// The cart document ID of a customer. Derived, so each customer has
    /// exactly one cart and it never collides with the user document.
    pub fn id_for(customer_id: UserId) -> AggregateId {
        AggregateId::from_uuid(Uuid::new_v5(&customer_id.as_uuid(), b"cart"))
    }

    pub fn customer_id(&self) -> UserId {
        self.customer_id
    }

    pub fn merchant_id(&self) -> Option<UserId> {
        self.merchant_id
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn discount(&self) -> Money {
        self.discount
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn subtotal(&self) -> Result<Money, ValidationError> {
        Money::checked_sum(self.items.iter().map(|item| item.subtotal))
    }

    pub fn total_quantity(&self) -> u32 {
        self.items
            .iter()
            .fold(0u32, |total, item| total.saturating_add(item.quantity))
    }

    /// Adds an item, merging quantities for a product already in the cart.
    pub fn add_item(
        &mut self,
        merchant_id: UserId,
        item: OrderItem,
        now: DateTime<Utc>,
    ) -> Result<Vec<CartEvent>, CartError> {
        item.validate()?;
        if let Some(current) = self.merchant_id
            && current != merchant_id
            && !self.items.is_empty()
        {
            return Err(CartError::MerchantMismatch {
                current,
                requested: merchant_id,
            });
        }

        let event = CartEvent::CartItemAdded {
            cart_id: self.id,
            customer_id: self.customer_id,
            merchant_id,
            product_id: item.product_id.clone(),
            quantity: item.quantity,
        };

        let mut items = self.items.clone();
        match items
            .iter_mut()
            .find(|existing| existing.product_id == item.product_id)
        {
            Some(existing) => {
                let quantity = existing
                    .quantity
                    .checked_add(item.quantity)
                    .ok_or(ValidationError::AmountOverflow)?;
                *existing = OrderItem::new(
                    item.product_id,
                    item.product_name,
                    quantity,
                    item.unit_price,
                )?;
            }
            None => items.push(item),
        }
        // The cart must stay priceable after every change.
        Money::checked_sum(items.iter().map(|line| line.subtotal))?;

        self.items = items;
        self.merchant_id = Some(merchant_id);
        self.updated_at = now;
        Ok(vec![event])
    }

    pub fn apply_discount(
        &mut self,
        discount: Money,
        now: DateTime<Utc>,
    ) -> Result<Vec<CartEvent>, CartError> {
        if discount.is_negative() {
            return Err(ValidationError::InvalidPrice {
                cents: discount.cents(),
            }
            .into());
        }
        self.discount = discount;
        self.updated_at = now;
        Ok(vec![CartEvent::CartDiscountApplied {
            cart_id: self.id,
            discount,
        }])
    }

    /// Empties the cart entirely. Emits nothing when it is already empty.
    pub fn clear(&mut self, now: DateTime<Utc>) -> Vec<CartEvent> {
        if self.items.is_empty() && self.discount == Money::zero() {
            return vec![];
        }
        let cleared_items = self.items.len();
        self.items.clear();
        self.merchant_id = None;
        self.discount = Money::zero();
        self.updated_at = now;
        vec![CartEvent::CartCleared {
            cart_id: self.id,
            customer_id: self.customer_id,
            cleared_items,
        }]
    }
}

/// Cart reads and item edits.
pub struct CartService<S: DocumentStore> {
    repository: Repository<S, Cart>,
}

impl<S: DocumentStore + Clone> Clone for CartService<S> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
        }
    }
}

impl<S: DocumentStore> CartService<S> {
    pub fn new(store: S) -> Self {
        Self {
            repository: Repository::new(store),
        }
    }

    /// Returns the customer's cart, or an empty one if none was stored yet.
    pub async fn get_cart(&self, customer_id: UserId) -> Result<Cart, DomainError> {
        Ok(self
            .repository
            .load(Cart::id_for(customer_id))
            .await?
            .unwrap_or_else(|| Cart::new(customer_id, Utc::now())))
    }

    #[tracing::instrument(skip(self, item), fields(product_id = %item.product_id))]
    pub async fn add_item(
        &self,
        customer_id: UserId,
        merchant_id: UserId,
        item: OrderItem,
    ) -> Result<Cart, DomainError> {
        self.upsert(customer_id, |cart| {
            cart.add_item(merchant_id, item.clone(), Utc::now())
        })
        .await
        .inspect(|cart| tracing::debug!(items = cart.items().len(), "Cart item added"))
    }

    pub async fn apply_discount(
        &self,
        customer_id: UserId,
        discount: Money,
    ) -> Result<Cart, DomainError> {
        self.upsert(customer_id, |cart| cart.apply_discount(discount, Utc::now()))
            .await
    }

    /// Applies `change` to the stored cart, creating it on first use. A
    /// concurrent first write surfaces as a conflict and is re-run.
    async fn upsert<F>(&self, customer_id: UserId, change: F) -> Result<Cart, DomainError>
    where
        F: Fn(&mut Cart) -> Result<Vec<CartEvent>, CartError>,
    {
        retry_when(&RetryPolicy::immediate(3), DomainError::is_conflict, || {
            self.try_upsert(customer_id, &change)
        })
        .await
        .map_err(|err| err.into_inner())
    }

    async fn try_upsert<F>(&self, customer_id: UserId, change: &F) -> Result<Cart, DomainError>
    where
        F: Fn(&mut Cart) -> Result<Vec<CartEvent>, CartError>,
    {
        let id = Cart::id_for(customer_id);
        if self.repository.load(id).await?.is_some() {
            return Ok(self.repository.execute(id, None, change).await?.aggregate);
        }

        let mut cart = Cart::new(customer_id, Utc::now());
        let events = change(&mut cart)?;
        self.repository.insert(cart, &events).await
    }
}
