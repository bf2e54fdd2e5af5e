//! # tably-core: Pure Settlement Logic for Tably
//!
//! This crate is the **heart** of the Tably settlement engine. It contains
//! every monetary rule as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tably Architecture                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │               Consumers (guest UI, staff tools)                 │   │
//! │  │    Split a tab ──► Pay a share ──► Watch the bill settle       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    tably-settle (async layer)                   │   │
//! │  │    SagaDriver, Reconciler, LedgerBackend, chain gateways       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tably-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   money   │  │   bill    │  │   split   │  │  payment  │  │   │
//! │  │   │   Money   │  │   Bill    │  │ SplitPlan │  │  Record   │  │   │
//! │  │   │ allocate  │  │ LineItem  │  │   Share   │  │   Store   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO NETWORK • NO CLOCK BRANCHING • PURE FUNCTIONS    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Money type with integer arithmetic and largest-remainder
//!   allocation (no floating point!)
//! - [`bill`] - The Bill entity: items, totals, payments, status machine
//! - [`split`] - Split plan derivation (equal / by-item / custom)
//! - [`payment`] - Payment records and the idempotent record store
//! - [`validation`] - Business rule validation
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic - same input = same output
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: All monetary values are in minor units (i64) to avoid float errors
//! 4. **Explicit Errors**: All errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use tably_core::money::{allocate, Money};
//!
//! // Three diners on a $100.00 tab: nobody pays a phantom cent,
//! // nobody loses one.
//! let shares = allocate(Money::from_cents(10_000), &[1, 1, 1]);
//! let cents: Vec<i64> = shares.iter().map(|m| m.cents()).collect();
//! assert_eq!(cents, vec![3334, 3333, 3333]);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod bill;
pub mod error;
pub mod money;
pub mod payment;
pub mod split;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use tably_core::Money` instead of
// `use tably_core::money::Money`

pub use bill::{Bill, BillStatus, BillTotals, LineItem, PaymentOutcome};
pub use error::{BillError, BillResult, ValidationError};
pub use money::{allocate, Money, RateBps};
pub use payment::{PaymentMethod, PaymentRecord, PaymentRecordStore, PaymentStatus, StoreOutcome};
pub use split::{Share, ShareStatus, SplitPlan, SplitStrategy};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum line items allowed on a single bill.
///
/// ## Business Reason
/// Prevents runaway tabs and keeps split-plan derivation bounded.
/// Can be made configurable per-venue in future versions.
pub const MAX_BILL_ITEMS: usize = 200;

/// Maximum quantity of a single line item.
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10).
/// Configurable per-venue in future versions.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Maximum unit price (and options total) of a line item, in cents.
///
/// ## Business Reason
/// $1,000,000 per unit catches fat-finger entries, and together with
/// `MAX_ITEM_QUANTITY` and `MAX_BILL_ITEMS` it keeps every bill total far
/// inside i64 - line subtotals cannot overflow.
pub const MAX_ITEM_PRICE_CENTS: i64 = 100_000_000;

/// Maximum participants in a single split plan.
///
/// ## Business Reason
/// Allocation is O(n log n) in participants; a table realistically tops out
/// well below this, and the cap keeps per-share amounts above zero noise.
pub const MAX_SPLIT_PARTICIPANTS: usize = 50;
