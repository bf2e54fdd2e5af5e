//! # Validation Module
//!
//! Input validation utilities for the settlement engine.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Frontend (TypeScript)                                        │
//! │  ├── Basic format checks (empty, length)                               │
//! │  └── Immediate user feedback                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE (Rust)                                           │
//! │  ├── Business rule validation                                          │
//! │  └── Runs BEFORE any bill mutation or payment initiation               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: The entities themselves                                      │
//! │  ├── Status machine guards (Open/Paid/Closed)                          │
//! │  └── Monetary invariants (totals, allocation sums)                     │
//! │                                                                         │
//! │  Defense in depth: Multiple layers catch different errors              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::{MAX_BILL_ITEMS, MAX_ITEM_PRICE_CENTS, MAX_ITEM_QUANTITY, MAX_SPLIT_PARTICIPANTS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a line item name.
///
/// ## Rules
/// - Must not be empty
/// - Must be between 1 and 200 characters
pub fn validate_item_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.len() > 200 {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: 200,
        });
    }

    Ok(())
}

/// Validates an on-chain address.
///
/// ## Rules
/// - Must not be empty
/// - `0x` prefix followed by 40 hex characters (EVM account format)
pub fn validate_address(field: &str, address: &str) -> ValidationResult<()> {
    let address = address.trim();

    if address.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    let valid = address.len() == 42
        && address.starts_with("0x")
        && address[2..].chars().all(|c| c.is_ascii_hexdigit());

    if !valid {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must be 0x followed by 40 hex characters".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line item quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price in cents.
///
/// ## Rules
/// - Must be non-negative (>= 0)
/// - Zero is allowed (comped items, zero-cost options)
/// - Must not exceed MAX_ITEM_PRICE_CENTS, which keeps line subtotals
///   (price × quantity) from ever overflowing i64
pub fn validate_price_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 || cents > MAX_ITEM_PRICE_CENTS {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_ITEM_PRICE_CENTS,
        });
    }

    Ok(())
}

/// Validates a payment amount in cents.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Cannot pay zero or negative amounts
pub fn validate_payment_amount(cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "payment amount".to_string(),
        });
    }

    Ok(())
}

/// Validates a tip amount in cents.
///
/// ## Rules
/// - Must be non-negative (tips are optional, never negative)
pub fn validate_tip_amount(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "tip amount".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a custom split share amount in cents.
///
/// ## Rules
/// - Must be non-negative (a zero share is allowed - a guest who ordered
///   nothing - but nobody may owe negative money)
pub fn validate_share_amount(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "share amount".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a tax or service fee rate in basis points.
///
/// ## Rules
/// - Must be between 0 and 10000 (0% to 100%)
/// - Most real rates are 0-2500 (0% to 25%)
pub fn validate_rate_bps(field: &str, bps: u32) -> ValidationResult<()> {
    if bps > 10000 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: 10000,
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates bill size (number of line items) before an add.
///
/// ## Rules
/// - Must not exceed MAX_BILL_ITEMS (200)
pub fn validate_bill_size(current_items: usize) -> ValidationResult<()> {
    if current_items >= MAX_BILL_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "line items".to_string(),
            min: 0,
            max: MAX_BILL_ITEMS as i64,
        });
    }

    Ok(())
}

/// Validates a split participant count.
///
/// ## Rules
/// - Must be positive (a split needs at least one participant)
/// - Must not exceed MAX_SPLIT_PARTICIPANTS (50)
pub fn validate_participant_count(count: usize) -> ValidationResult<()> {
    if count == 0 {
        return Err(ValidationError::MustBePositive {
            field: "participant count".to_string(),
        });
    }

    if count > MAX_SPLIT_PARTICIPANTS {
        return Err(ValidationError::OutOfRange {
            field: "participant count".to_string(),
            min: 1,
            max: MAX_SPLIT_PARTICIPANTS as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_item_name() {
        assert!(validate_item_name("Pad Thai").is_ok());
        assert!(validate_item_name("").is_err());
        assert!(validate_item_name("   ").is_err());
        assert!(validate_item_name(&"A".repeat(300)).is_err());
    }

    #[test]
    fn test_validate_address() {
        assert!(
            validate_address("settlement_address", "0x52908400098527886E0F7030069857D2E4169EE7")
                .is_ok()
        );
        assert!(validate_address("settlement_address", "").is_err());
        assert!(validate_address("settlement_address", "not-an-address").is_err());
        assert!(validate_address("settlement_address", "0x1234").is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_price_cents() {
        assert!(validate_price_cents("price", 0).is_ok());
        assert!(validate_price_cents("price", 1099).is_ok());
        assert!(validate_price_cents("price", MAX_ITEM_PRICE_CENTS).is_ok());

        assert!(validate_price_cents("price", -100).is_err());
        // Beyond the cap, price × quantity could overflow a line subtotal.
        assert!(validate_price_cents("price", MAX_ITEM_PRICE_CENTS + 1).is_err());
        assert!(validate_price_cents("price", i64::MAX).is_err());
    }

    #[test]
    fn test_validate_share_amount() {
        assert!(validate_share_amount(0).is_ok());
        assert!(validate_share_amount(4250).is_ok());
        assert!(validate_share_amount(-1).is_err());
    }

    #[test]
    fn test_validate_payment_and_tip() {
        assert!(validate_payment_amount(4250).is_ok());
        assert!(validate_payment_amount(0).is_err());
        assert!(validate_payment_amount(-50).is_err());

        assert!(validate_tip_amount(0).is_ok());
        assert!(validate_tip_amount(500).is_ok());
        assert!(validate_tip_amount(-1).is_err());
    }

    #[test]
    fn test_validate_rate_bps() {
        assert!(validate_rate_bps("tax_rate", 0).is_ok());
        assert!(validate_rate_bps("tax_rate", 825).is_ok());
        assert!(validate_rate_bps("tax_rate", 10000).is_ok());
        assert!(validate_rate_bps("tax_rate", 10001).is_err());
    }

    #[test]
    fn test_validate_participant_count() {
        assert!(validate_participant_count(1).is_ok());
        assert!(validate_participant_count(50).is_ok());
        assert!(validate_participant_count(0).is_err());
        assert!(validate_participant_count(51).is_err());
    }
}
