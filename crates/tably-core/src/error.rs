//! # Error Types
//!
//! Domain-specific error types for tably-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tably-core errors (this file)                                         │
//! │  ├── BillError        - Bill / split / payment domain errors           │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  tably-settle errors (separate crate)                                  │
//! │  ├── SettleError      - Concurrency, saga and ledger failures          │
//! │  └── ChainError       - Blockchain gateway failures                    │
//! │                                                                         │
//! │  Flow: ValidationError → BillError → SettleError → Caller              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (bill ID, key, amounts)
//! 3. Errors are enum variants, never String
//! 4. Validation errors always fire BEFORE any state change

use thiserror::Error;

// =============================================================================
// Bill Error
// =============================================================================

/// Settlement domain errors.
///
/// These errors represent business rule violations. Every one of them is
/// raised before any money moves; none of them leaves a bill half-mutated.
#[derive(Debug, Error)]
pub enum BillError {
    /// The operation is not valid for the bill's current status.
    ///
    /// ## When This Occurs
    /// - Adding a line item to a bill that is already `Paid` or `Closed`
    #[error("Bill {bill_id} is {status}, cannot perform operation")]
    InvalidState { bill_id: String, status: String },

    /// The bill is closed and rejects further payments or a second close.
    #[error("Bill {bill_id} is closed")]
    BillClosed { bill_id: String },

    /// An idempotency key was reused with a DIFFERENT amount or tip.
    ///
    /// ## When This Occurs
    /// Reusing a key with the *same* amounts is a silent success (retry
    /// safety). Reusing it with different amounts means two distinct
    /// payments claimed the same key - a wire bug worth surfacing.
    #[error("Idempotency key {key} already confirmed with a different amount")]
    DuplicatePayment { key: String },

    /// Custom split amounts do not sum to the bill total.
    ///
    /// ## When This Occurs
    /// - `custom_split` with amounts summing to anything but `total_cents`.
    ///   Validation is strict equality; no internal rounding is performed.
    #[error("Split amounts sum to {actual} but the bill total is {expected}")]
    AllocationMismatch { expected: i64, actual: i64 },

    /// A by-item split left a line item without a participant.
    #[error("Line item {item_id} has no participant assigned")]
    UnassignedItem { item_id: String },

    /// The split plan was derived against an older item list.
    ///
    /// ## When This Occurs
    /// - Items were added to the bill after the plan was derived. The plan's
    ///   shares no longer partition the bill; callers must re-derive.
    #[error("Split plan derived at items version {plan_version}, bill is at {bill_version}")]
    StalePlan { plan_version: i64, bill_version: i64 },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when caller input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, malformed address).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with BillError.
pub type BillResult<T> = Result<T, BillError>;

// =============================================================================
// Unit Tests
// =============================================================================
