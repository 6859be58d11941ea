//! Value objects for the order domain.

use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;
use crate::validation::{ValidationError, require_non_blank};

/// Product identifier (SKU).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(String);

impl ProductId {
    /// Creates a new product ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the product ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProductId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ProductId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Money amount represented in cents to avoid floating point issues.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a new Money amount from cents.
    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.0
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies by a quantity, or `None` when the product overflows.
    pub fn checked_multiply(&self, quantity: u32) -> Option<Money> {
        self.0.checked_mul(i64::from(quantity)).map(Money)
    }

    pub fn checked_add(&self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    pub fn checked_sub(&self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).map(Money)
    }

    /// Adds, clamping at the bounds. Used for running statistics.
    pub fn saturating_add(&self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }

    /// Applies a rate in basis points (1/100 of a percent), rounding half up.
    /// `None` when the result does not fit.
    pub fn basis_points(&self, bps: u32) -> Option<Money> {
        let scaled = (i128::from(self.0) * i128::from(bps) + 5_000) / 10_000;
        i64::try_from(scaled).ok().map(Money)
    }

    /// Sums amounts, failing with `AmountOverflow` instead of wrapping.
    pub fn checked_sum(amounts: impl IntoIterator<Item = Money>) -> Result<Money, ValidationError> {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |acc, m| acc.checked_add(m))
            .ok_or(ValidationError::AmountOverflow)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(
            f,
            "{sign}${}.{:02}",
            self.0.unsigned_abs() / 100,
            self.0.unsigned_abs() % 100
        )
    }
}

/// A line item: price, quantity and the subtotal derived from them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub subtotal: Money,
}

impl OrderItem {
    /// Creates a validated line item, computing its subtotal.
    pub fn new(
        product_id: impl Into<ProductId>,
        product_name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Result<Self, ValidationError> {
        let mut item = Self {
            product_id: product_id.into(),
            product_name: product_name.into(),
            quantity,
            unit_price,
            subtotal: Money::zero(),
        };
        item.validate_fields()?;
        item.subtotal = unit_price
            .checked_multiply(quantity)
            .ok_or(ValidationError::AmountOverflow)?;
        Ok(item)
    }

    /// Re-checks an item, including that its subtotal is the exact product of
    /// price and quantity.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.validate_fields()?;
        match self.unit_price.checked_multiply(self.quantity) {
            Some(subtotal) if subtotal == self.subtotal => Ok(()),
            Some(_) => Err(ValidationError::InvalidPrice {
                cents: self.subtotal.cents(),
            }),
            None => Err(ValidationError::AmountOverflow),
        }
    }

    fn validate_fields(&self) -> Result<(), ValidationError> {
        require_non_blank("product_name", &self.product_name)?;
        if self.quantity == 0 {
            return Err(ValidationError::InvalidQuantity {
                quantity: self.quantity,
            });
        }
        if !self.unit_price.is_positive() {
            return Err(ValidationError::InvalidPrice {
                cents: self.unit_price.cents(),
            });
        }
        Ok(())
    }
}

/// Where an order is delivered to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryAddress {
    pub street: String,
    pub city: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
}

impl DeliveryAddress {
    pub fn new(street: impl Into<String>, city: impl Into<String>) -> Self {
        Self {
            street: street.into(),
            city: city.into(),
            state: None,
            postal_code: None,
            instructions: None,
        }
    }
}

impl std::fmt::Display for DeliveryAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}", self.street, self.city)
    }
}

/// Delivery details captured at checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryInfo {
    pub address: DeliveryAddress,
    pub location: GeoPoint,
    #[serde(default)]
    pub contact_phone: Option<String>,
}

impl DeliveryInfo {
    /// Checks the required address fields and the coordinate bounds.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_non_blank("delivery.address.street", &self.address.street)?;
        require_non_blank("delivery.address.city", &self.address.city)?;
        self.location.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Wallet,
}

/// The monetary breakdown of an order.
///
/// `total = subtotal + delivery_fee + service_fee + tax - discount` always holds;
/// the only way to build one is [`OrderTotals::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    subtotal: Money,
    delivery_fee: Money,
    service_fee: Money,
    tax: Money,
    discount: Money,
    total: Money,
}

impl OrderTotals {
    pub fn new(
        subtotal: Money,
        delivery_fee: Money,
        service_fee: Money,
        tax: Money,
        discount: Money,
    ) -> Result<Self, ValidationError> {
        let total = Money::checked_sum([subtotal, delivery_fee, service_fee, tax])?
            .checked_sub(discount)
            .ok_or(ValidationError::AmountOverflow)?;
        if total.is_negative() {
            return Err(ValidationError::NegativeTotal {
                cents: total.cents(),
            });
        }
        Ok(Self {
            subtotal,
            delivery_fee,
            service_fee,
            tax,
            discount,
            total,
        })
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    pub fn delivery_fee(&self) -> Money {
        self.delivery_fee
    }

    pub fn service_fee(&self) -> Money {
        self.service_fee
    }

    pub fn tax(&self) -> Money {
        self.tax
    }

    pub fn discount(&self) -> Money {
        self.discount
    }

    pub fn total(&self) -> Money {
        self.total
    }
}

/// Fees and tax applied at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    /// Flat delivery fee.
    pub delivery_fee: Money,

    /// Service fee as basis points of the item subtotal.
    pub service_fee_bps: u32,

    /// Tax as basis points of the item subtotal.
    pub tax_bps: u32,
}

impl PricingPolicy {
    /// Prices a subtotal, applying `discount` last.
    pub fn quote(&self, subtotal: Money, discount: Money) -> Result<OrderTotals, ValidationError> {
        OrderTotals::new(
            subtotal,
            self.delivery_fee,
            subtotal
                .basis_points(self.service_fee_bps)
                .ok_or(ValidationError::AmountOverflow)?,
            subtotal
                .basis_points(self.tax_bps)
                .ok_or(ValidationError::AmountOverflow)?,
            discount,
        )
    }
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            delivery_fee: Money::from_cents(299),
            service_fee_bps: 500,
            tax_bps: 800,
        }
    }
}
