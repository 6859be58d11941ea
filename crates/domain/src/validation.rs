//! Input validation errors, raised before anything is persisted.

use thiserror::Error;

/// Malformed or out-of-range input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("{axis} {value} is out of range")]
    CoordinateOutOfRange { axis: &'static str, value: f64 },

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    #[error("Invalid price: {cents} (must be greater than 0)")]
    InvalidPrice { cents: i64 },

    #[error("Amount exceeds the supported range")]
    AmountOverflow,

    #[error("Order total would be negative: {cents}")]
    NegativeTotal { cents: i64 },

    #[error("Invalid rating: {0} (must be between 0 and 5)")]
    InvalidRating(f64),
}

/// Fails with `MissingField` when `value` is empty or whitespace.
pub fn require_non_blank(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_are_missing() {
        assert_eq!(
            require_non_blank("street", "   "),
            Err(ValidationError::MissingField("street"))
        );
        assert!(require_non_blank("street", "12 Calle El Conde").is_ok());
    }
}
