//! # Bill Ledger
//!
//! The authoritative representation of one bill: items, computed totals,
//! accumulated payments, status.
//!
//! ## Bill Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Bill Lifecycle                                   │
//! │                                                                         │
//! │  1. OPEN                                                               │
//! │     └── add_line_item() → recompute subtotal, tax, fee, total          │
//! │     └── add_line_item() → ...                                          │
//! │                                                                         │
//! │  2. PAYMENTS ARRIVE (any channel, any order)                           │
//! │     └── apply_payment() → paid_cents += amount, tip_cents += tip       │
//! │     └── paid >= total?  → status: Open → Paid                          │
//! │                                                                         │
//! │  3. CLOSE (staff action)                                               │
//! │     └── close() → status: Closed, items frozen forever                 │
//! │         Allowed even while paid < total - the shortfall stays          │
//! │         visible through remaining()                                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Versioning
//! Two counters ride on every bill:
//! - `version` bumps on EVERY mutation and is the optimistic-concurrency
//!   token the reconciliation layer checks before persisting.
//! - `items_version` bumps only when the item list changes, and is what
//!   split plans pin themselves to. A payment must not invalidate another
//!   participant's derived share - only a menu change may.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{BillError, BillResult};
use crate::money::{Money, RateBps};
use crate::payment::PaymentRecord;
use crate::validation;

// =============================================================================
// Bill Status
// =============================================================================

/// The status of a bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum BillStatus {
    /// Running tab: items may be added, payments accepted.
    Open,
    /// Payments cover the total. Still accepts payments (overpay/tips).
    Paid,
    /// Frozen by staff. No further items or payments.
    Closed,
}

impl Default for BillStatus {
    fn default() -> Self {
        BillStatus::Open
    }
}

impl std::fmt::Display for BillStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BillStatus::Open => write!(f, "open"),
            BillStatus::Paid => write!(f, "paid"),
            BillStatus::Closed => write!(f, "closed"),
        }
    }
}

// =============================================================================
// Line Item
// =============================================================================

/// A line item on a bill.
/// Uses snapshot pattern: name and prices are frozen at ordering time, so a
/// later menu edit never changes what the table owes.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Dish name at ordering time (frozen).
    pub name: String,

    /// Unit price in cents at ordering time (frozen).
    pub unit_price_cents: i64,

    /// Quantity ordered (positive).
    pub quantity: i64,

    /// Total of selected options/modifiers per unit, in cents.
    pub options_total_cents: i64,

    /// When this item was added to the bill.
    #[ts(as = "String")]
    pub added_at: DateTime<Utc>,
}

impl LineItem {
    /// Creates a new line item with a generated ID.
    pub fn new(name: &str, unit_price: Money, quantity: i64, options_total: Money) -> Self {
        LineItem {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            unit_price_cents: unit_price.cents(),
            quantity,
            options_total_cents: options_total.cents(),
            added_at: Utc::now(),
        }
    }

    /// Line subtotal: `(unit_price + options_total) × quantity`.
    ///
    /// Bounded by validation: prices top out at `MAX_ITEM_PRICE_CENTS` and
    /// quantity at `MAX_ITEM_QUANTITY`, so the product stays far inside i64.
    #[inline]
    pub fn subtotal_cents(&self) -> i64 {
        self.subtotal().cents()
    }

    /// Returns the line subtotal as Money.
    #[inline]
    pub fn subtotal(&self) -> Money {
        (Money::from_cents(self.unit_price_cents) + Money::from_cents(self.options_total_cents))
            .multiply_quantity(self.quantity)
    }
}

// =============================================================================
// Bill
// =============================================================================

/// The running tab for a table/counter; the unit of settlement.
///
/// ## Ownership
/// The bill is mutated ONLY through its methods, and persisted only through
/// the reconciliation layer's optimistic-concurrency gate. UIs and staff
/// tools never touch fields directly.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Business-facing bill number (printed on the receipt).
    pub bill_number: String,

    /// Ordered line items.
    pub items: Vec<LineItem>,

    /// Tax rate in basis points (825 = 8.25%).
    pub tax_rate_bps: u32,

    /// Service fee rate in basis points.
    pub service_fee_rate_bps: u32,

    /// Sum of line item subtotals, in cents.
    pub subtotal_cents: i64,

    /// Tax on the subtotal, in cents.
    pub tax_cents: i64,

    /// Service fee on the subtotal, in cents.
    pub service_fee_cents: i64,

    /// `subtotal + tax + service_fee`, in cents.
    pub total_cents: i64,

    /// Confirmed payments accumulated so far, in cents.
    pub paid_cents: i64,

    /// Tips accumulated so far, in cents. Never part of `total_cents`.
    pub tip_cents: i64,

    /// Current status.
    pub status: BillStatus,

    /// On-chain address receiving settlement funds.
    pub settlement_address: String,

    /// On-chain address receiving tips.
    pub tipping_address: String,

    /// Idempotency keys already applied to this bill.
    pub applied_keys: Vec<String>,

    /// Optimistic-concurrency counter; bumps on every mutation.
    pub version: i64,

    /// Bumps only when the item list changes; split plans pin this.
    pub items_version: i64,

    /// When the bill was opened.
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    /// When the bill was last mutated.
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,

    /// When the bill was closed, if it was.
    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,
}

/// Outcome of applying a payment to a bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// The payment moved `paid_cents`/`tip_cents`.
    Applied,
    /// The idempotency key had already been applied; nothing changed.
    /// Reported as success to the caller - this is what makes retries safe.
    Duplicate,
}

impl Bill {
    /// Opens a new empty bill.
    ///
    /// ## Validation
    /// Rates must be 0..=10000 bps; both addresses must be well-formed
    /// on-chain accounts. Fails before the bill exists, never after.
    pub fn open(
        tax_rate: RateBps,
        service_fee_rate: RateBps,
        settlement_address: &str,
        tipping_address: &str,
    ) -> BillResult<Self> {
        validation::validate_rate_bps("tax_rate", tax_rate.bps())?;
        validation::validate_rate_bps("service_fee_rate", service_fee_rate.bps())?;
        validation::validate_address("settlement_address", settlement_address)?;
        validation::validate_address("tipping_address", tipping_address)?;

        let now = Utc::now();
        Ok(Bill {
            id: Uuid::new_v4().to_string(),
            bill_number: generate_bill_number(&now),
            items: Vec::new(),
            tax_rate_bps: tax_rate.bps(),
            service_fee_rate_bps: service_fee_rate.bps(),
            subtotal_cents: 0,
            tax_cents: 0,
            service_fee_cents: 0,
            total_cents: 0,
            paid_cents: 0,
            tip_cents: 0,
            status: BillStatus::Open,
            settlement_address: settlement_address.to_string(),
            tipping_address: tipping_address.to_string(),
            applied_keys: Vec::new(),
            version: 0,
            items_version: 0,
            created_at: now,
            updated_at: now,
            closed_at: None,
        })
    }

    /// Adds a line item and recomputes all totals.
    ///
    /// ## Errors
    /// - [`BillError::InvalidState`] unless the bill is `Open`
    /// - [`BillError::Validation`] on a bad name, quantity or price
    pub fn add_line_item(&mut self, item: LineItem) -> BillResult<()> {
        if self.status != BillStatus::Open {
            return Err(BillError::InvalidState {
                bill_id: self.id.clone(),
                status: self.status.to_string(),
            });
        }

        validation::validate_bill_size(self.items.len())?;
        validation::validate_item_name(&item.name)?;
        validation::validate_quantity(item.quantity)?;
        validation::validate_price_cents("unit_price", item.unit_price_cents)?;
        validation::validate_price_cents("options_total", item.options_total_cents)?;

        self.items.push(item);
        self.recompute_totals();
        self.items_version += 1;
        self.touch();
        Ok(())
    }

    /// Applies a payment record.
    ///
    /// ## Behavior
    /// - `Closed` bill: [`BillError::BillClosed`]
    /// - Known idempotency key: [`PaymentOutcome::Duplicate`], no change
    /// - Otherwise: accumulates amount and tip, bumps `version`, and
    ///   transitions `Open → Paid` once `paid_cents >= total_cents`
    pub fn apply_payment(&mut self, record: &PaymentRecord) -> BillResult<PaymentOutcome> {
        if self.status == BillStatus::Closed {
            return Err(BillError::BillClosed {
                bill_id: self.id.clone(),
            });
        }

        if self.applied_keys.iter().any(|k| k == &record.idempotency_key) {
            return Ok(PaymentOutcome::Duplicate);
        }

        validation::validate_payment_amount(record.amount_cents)?;
        validation::validate_tip_amount(record.tip_cents)?;

        self.paid_cents += record.amount_cents;
        self.tip_cents += record.tip_cents;
        self.applied_keys.push(record.idempotency_key.clone());

        if self.status == BillStatus::Open && self.paid_cents >= self.total_cents {
            self.status = BillStatus::Paid;
        }

        self.touch();
        Ok(PaymentOutcome::Applied)
    }

    /// Closes the bill.
    ///
    /// Staff may close regardless of payment completeness - a deliberate
    /// business policy. The shortfall (or overpay) stays visible through
    /// [`Bill::remaining`] on the closed bill.
    pub fn close(&mut self) -> BillResult<()> {
        if self.status == BillStatus::Closed {
            return Err(BillError::BillClosed {
                bill_id: self.id.clone(),
            });
        }

        self.status = BillStatus::Closed;
        self.closed_at = Some(Utc::now());
        self.touch();
        Ok(())
    }

    /// What is still owed: `total - paid`.
    ///
    /// Negative on overpay. Never clamped - the discrepancy must stay
    /// visible to staff.
    #[inline]
    pub fn remaining(&self) -> Money {
        Money::from_cents(self.total_cents - self.paid_cents)
    }

    /// Returns the subtotal as Money.
    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }

    /// Returns the grand total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Returns the tax rate.
    #[inline]
    pub fn tax_rate(&self) -> RateBps {
        RateBps::from_bps(self.tax_rate_bps)
    }

    /// Returns the service fee rate.
    #[inline]
    pub fn service_fee_rate(&self) -> RateBps {
        RateBps::from_bps(self.service_fee_rate_bps)
    }

    /// Recomputes subtotal, tax, service fee and total from the item list.
    ///
    /// Tax and fee are each derived from the full subtotal through the
    /// fixed-point rate path; floats never enter.
    fn recompute_totals(&mut self) {
        self.subtotal_cents = self.items.iter().map(LineItem::subtotal_cents).sum();
        let subtotal = Money::from_cents(self.subtotal_cents);
        self.tax_cents = subtotal.apply_rate(self.tax_rate()).cents();
        self.service_fee_cents = subtotal.apply_rate(self.service_fee_rate()).cents();
        self.total_cents = self.subtotal_cents + self.tax_cents + self.service_fee_cents;
    }

    /// Bumps the OCC version and the updated-at timestamp.
    fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }
}

// =============================================================================
// Bill Totals Summary
// =============================================================================

/// Bill totals summary for API responses.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct BillTotals {
    pub item_count: usize,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub service_fee_cents: i64,
    pub total_cents: i64,
    pub paid_cents: i64,
    pub tip_cents: i64,
    pub remaining_cents: i64,
    pub status: BillStatus,
}

impl From<&Bill> for BillTotals {
    fn from(bill: &Bill) -> Self {
        BillTotals {
            item_count: bill.items.len(),
            subtotal_cents: bill.subtotal_cents,
            tax_cents: bill.tax_cents,
            service_fee_cents: bill.service_fee_cents,
            total_cents: bill.total_cents,
            paid_cents: bill.paid_cents,
            tip_cents: bill.tip_cents,
            remaining_cents: bill.remaining().cents(),
            status: bill.status,
        }
    }
}

// =============================================================================
// Bill Number Generation
// =============================================================================

/// Generates a business-facing bill number: `B-YYYYMMDD-XXXXXX`.
///
/// The suffix is derived from a fresh UUID rather than a daily counter, so
/// two counters opening bills at the same instant never collide.
fn generate_bill_number(now: &DateTime<Utc>) -> String {
    let date_part = now.format("%Y%m%d");
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(6)
        .collect::<String>()
        .to_uppercase();
    format!("B-{}-{}", date_part, suffix)
}

// =============================================================================
// Unit Tests
// =============================================================================
