//! # Payment Records
//!
//! Payment records and the append-only, idempotent record store.
//!
//! ## The De-duplication Invariant
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  IDEMPOTENCY KEYS                                                       │
//! │                                                                         │
//! │  Crypto payment  → key = on-chain transaction hash                     │
//! │  Cash / card     → key = generated UUID v4                             │
//! │                                                                         │
//! │  A given key may appear AT MOST ONCE in the Confirmed state.           │
//! │                                                                         │
//! │  Retry with the SAME key + SAME amounts  → silent success (no-op)      │
//! │  Retry with the SAME key + OTHER amounts → DuplicatePayment error      │
//! │                                                                         │
//! │  This is what makes the saga's ledger-notification step safe to        │
//! │  repeat indefinitely: a dropped notification is a visibility delay,    │
//! │  never a double-charge.                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{BillError, BillResult};
use crate::money::Money;

// =============================================================================
// Payment Method
// =============================================================================

/// How a payment reached the bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// On-chain token transfer through the settlement contract.
    Crypto,
    /// Physical cash handed to staff.
    Cash,
    /// Card payment on an external terminal, recorded by staff.
    Card,
}

// =============================================================================
// Payment Status
// =============================================================================

/// Lifecycle of a single payment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Initiated but not yet confirmed (crypto awaiting finality).
    Pending,
    /// Applied to the bill. Immutable from here on.
    Confirmed,
    /// Definitively failed; never applied to the bill.
    Failed,
}

// =============================================================================
// Payment Record
// =============================================================================

/// One payment towards a bill.
///
/// A bill can accumulate multiple records: several diners paying their
/// split shares, or a cash payment topping up a partial card payment.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Bill this payment settles (or partially settles).
    pub bill_id: String,

    /// Payment channel.
    pub method: PaymentMethod,

    /// Amount applied against the bill total, in cents.
    pub amount_cents: i64,

    /// Tip on top of the amount, in cents.
    pub tip_cents: i64,

    /// Wallet address (crypto) or staff-entered identifier (cash/card).
    pub payer_reference: String,

    /// Transaction hash for crypto, generated UUID for other methods.
    pub idempotency_key: String,

    /// For cash: amount the customer handed over (to compute change).
    pub tendered_cents: Option<i64>,

    /// For cash: change returned to the customer.
    pub change_cents: Option<i64>,

    /// When this record was applied to the bill.
    #[ts(as = "String")]
    pub applied_at: DateTime<Utc>,

    /// Lifecycle status. Confirmed records are immutable.
    pub status: PaymentStatus,
}

impl PaymentRecord {
    /// Creates a crypto payment record keyed by its transaction hash.
    ///
    /// The tx hash doubles as the idempotency key: the chain already
    /// guarantees it identifies exactly one transfer.
    pub fn crypto(
        bill_id: &str,
        amount: Money,
        tip: Money,
        payer_wallet: &str,
        tx_hash: &str,
    ) -> Self {
        PaymentRecord {
            id: Uuid::new_v4().to_string(),
            bill_id: bill_id.to_string(),
            method: PaymentMethod::Crypto,
            amount_cents: amount.cents(),
            tip_cents: tip.cents(),
            payer_reference: payer_wallet.to_string(),
            idempotency_key: tx_hash.to_string(),
            tendered_cents: None,
            change_cents: None,
            applied_at: Utc::now(),
            status: PaymentStatus::Pending,
        }
    }

    /// Creates a staff-recorded cash payment.
    ///
    /// ## Change Computation
    /// `change = tendered - (amount + tip)`, clamped at zero when the
    /// customer tendered exactly or staff chose to round down.
    pub fn cash(bill_id: &str, amount: Money, tip: Money, staff_ref: &str, tendered: Money) -> Self {
        let change = (tendered - amount - tip).cents().max(0);
        PaymentRecord {
            id: Uuid::new_v4().to_string(),
            bill_id: bill_id.to_string(),
            method: PaymentMethod::Cash,
            amount_cents: amount.cents(),
            tip_cents: tip.cents(),
            payer_reference: staff_ref.to_string(),
            idempotency_key: Uuid::new_v4().to_string(),
            tendered_cents: Some(tendered.cents()),
            change_cents: Some(change),
            applied_at: Utc::now(),
            status: PaymentStatus::Pending,
        }
    }

    /// Creates a staff-recorded external card payment.
    pub fn card(bill_id: &str, amount: Money, tip: Money, staff_ref: &str) -> Self {
        PaymentRecord {
            id: Uuid::new_v4().to_string(),
            bill_id: bill_id.to_string(),
            method: PaymentMethod::Card,
            amount_cents: amount.cents(),
            tip_cents: tip.cents(),
            payer_reference: staff_ref.to_string(),
            idempotency_key: Uuid::new_v4().to_string(),
            tendered_cents: None,
            change_cents: None,
            applied_at: Utc::now(),
            status: PaymentStatus::Pending,
        }
    }

    /// Returns the payment amount as Money.
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }

    /// Returns the tip as Money.
    #[inline]
    pub fn tip(&self) -> Money {
        Money::from_cents(self.tip_cents)
    }

    /// True when this record carries the same money as `other`.
    /// Used to distinguish a safe retry from a conflicting key reuse.
    fn same_money(&self, other: &PaymentRecord) -> bool {
        self.amount_cents == other.amount_cents && self.tip_cents == other.tip_cents
    }
}

// =============================================================================
// Payment Record Store
// =============================================================================

/// Outcome of applying a record to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    /// The record was new and is now Confirmed.
    Applied,
    /// The key was already Confirmed with identical amounts; nothing changed.
    Duplicate,
}

/// Append-only, idempotent store of applied payments.
///
/// ## Invariant
/// A given idempotency key appears at most once in the Confirmed state.
/// `apply` with a known key and matching amounts is a no-op reported as
/// [`StoreOutcome::Duplicate`] - success to the caller, per retry-safety.
///
/// ## Purity
/// Plain in-memory struct with no interior mutability; the settle crate
/// decides where it lives and how it is synchronized.
#[derive(Debug, Default)]
pub struct PaymentRecordStore {
    /// Records by idempotency key.
    by_key: HashMap<String, PaymentRecord>,

    /// Keys in application order, for per-bill listings.
    order: Vec<String>,
}

impl PaymentRecordStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a payment record, de-duplicating by idempotency key.
    ///
    /// ## Behavior
    /// - New key: record enters the store as Confirmed.
    /// - Known key, same amounts: no-op, `Duplicate` (treated as success).
    /// - Known key, different amounts: [`BillError::DuplicatePayment`].
    pub fn apply(&mut self, mut record: PaymentRecord) -> BillResult<StoreOutcome> {
        if let Some(existing) = self.by_key.get(&record.idempotency_key) {
            if existing.same_money(&record) {
                return Ok(StoreOutcome::Duplicate);
            }
            return Err(BillError::DuplicatePayment {
                key: record.idempotency_key.clone(),
            });
        }

        record.status = PaymentStatus::Confirmed;
        record.applied_at = Utc::now();
        self.order.push(record.idempotency_key.clone());
        self.by_key.insert(record.idempotency_key.clone(), record);
        Ok(StoreOutcome::Applied)
    }

    /// Looks up a record by idempotency key.
    pub fn get(&self, idempotency_key: &str) -> Option<&PaymentRecord> {
        self.by_key.get(idempotency_key)
    }

    /// Returns all records for a bill in application order.
    pub fn records_for_bill(&self, bill_id: &str) -> Vec<&PaymentRecord> {
        self.order
            .iter()
            .filter_map(|key| self.by_key.get(key))
            .filter(|record| record.bill_id == bill_id)
            .collect()
    }

    /// Sum of confirmed amounts (excluding tips) for a bill.
    pub fn confirmed_total(&self, bill_id: &str) -> Money {
        let cents = self
            .records_for_bill(bill_id)
            .iter()
            .filter(|record| record.status == PaymentStatus::Confirmed)
            .map(|record| record.amount_cents)
            .sum();
        Money::from_cents(cents)
    }

    /// Number of records in the store.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True when no record has been applied yet.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn crypto_record(key: &str, amount: i64, tip: i64) -> PaymentRecord {
        PaymentRecord::crypto(
            "bill-1",
            Money::from_cents(amount),
            Money::from_cents(tip),
            "0xabc",
            key,
        )
    }

    #[test]
    fn test_apply_confirms_record() {
        let mut store = PaymentRecordStore::new();
        let outcome = store.apply(crypto_record("0xhash1", 4250, 500)).unwrap();

        assert_eq!(outcome, StoreOutcome::Applied);
        assert_eq!(store.get("0xhash1").unwrap().status, PaymentStatus::Confirmed);
        assert_eq!(store.confirmed_total("bill-1").cents(), 4250);
    }

    #[test]
    fn test_same_key_same_money_is_silent_duplicate() {
        let mut store = PaymentRecordStore::new();
        store.apply(crypto_record("0xhash1", 4250, 500)).unwrap();

        let outcome = store.apply(crypto_record("0xhash1", 4250, 500)).unwrap();
        assert_eq!(outcome, StoreOutcome::Duplicate);

        // The total moved exactly once.
        assert_eq!(store.confirmed_total("bill-1").cents(), 4250);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_same_key_different_money_is_conflict() {
        let mut store = PaymentRecordStore::new();
        store.apply(crypto_record("0xhash1", 4250, 500)).unwrap();

        let err = store.apply(crypto_record("0xhash1", 9999, 0)).unwrap_err();
        assert!(matches!(err, BillError::DuplicatePayment { .. }));
        assert_eq!(store.confirmed_total("bill-1").cents(), 4250);
    }

    #[test]
    fn test_records_for_bill_filters_and_orders() {
        let mut store = PaymentRecordStore::new();
        store.apply(crypto_record("0xa", 100, 0)).unwrap();
        store
            .apply(PaymentRecord::card(
                "bill-2",
                Money::from_cents(200),
                Money::zero(),
                "staff-7",
            ))
            .unwrap();
        store.apply(crypto_record("0xb", 300, 0)).unwrap();

        let records = store.records_for_bill("bill-1");
        let keys: Vec<&str> = records.iter().map(|r| r.idempotency_key.as_str()).collect();
        assert_eq!(keys, vec!["0xa", "0xb"]);
    }

    #[test]
    fn test_cash_change_computation() {
        // $42.50 bill share + $5.00 tip, customer hands over $50.00.
        let record = PaymentRecord::cash(
            "bill-1",
            Money::from_cents(4250),
            Money::from_cents(500),
            "staff-3",
            Money::from_cents(5000),
        );
        assert_eq!(record.tendered_cents, Some(5000));
        assert_eq!(record.change_cents, Some(250));

        // Exact tender: no change.
        let exact = PaymentRecord::cash(
            "bill-1",
            Money::from_cents(4250),
            Money::zero(),
            "staff-3",
            Money::from_cents(4250),
        );
        assert_eq!(exact.change_cents, Some(0));
    }

    #[test]
    fn test_alternative_methods_get_generated_keys() {
        let cash = PaymentRecord::cash(
            "bill-1",
            Money::from_cents(100),
            Money::zero(),
            "staff-1",
            Money::from_cents(100),
        );
        let card = PaymentRecord::card("bill-1", Money::from_cents(100), Money::zero(), "staff-1");

        // Generated UUIDs, distinct per record.
        assert_ne!(cash.idempotency_key, card.idempotency_key);
        assert!(Uuid::parse_str(&cash.idempotency_key).is_ok());
        assert!(Uuid::parse_str(&card.idempotency_key).is_ok());
    }
}
