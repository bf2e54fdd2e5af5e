//! # Ledger Backend
//!
//! The versioned bill store behind the reconciler.
//!
//! ## Optimistic Concurrency
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 The OCC Gate                                            │
//! │                                                                         │
//! │  Writer A                      Writer B                                │
//! │  ────────                      ────────                                │
//! │  fetch bill (version 4)        fetch bill (version 4)                  │
//! │  apply payment → version 5     apply payment → version 5               │
//! │  store(expected = 4)  ✓        store(expected = 4)  ✗                  │
//! │                                └── ConcurrentModification              │
//! │                                    reload at version 5, re-apply,      │
//! │                                    store(expected = 5)  ✓              │
//! │                                                                         │
//! │  Payments are applied in the order the gate ACCEPTS them, not the      │
//! │  order they were submitted. Two participants confirming on-chain       │
//! │  simultaneously cannot corrupt paid_cents.                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Placement
//! The trait mirrors the hosted ledger API (`GET /bills/{id}`,
//! `POST /bills/{id}/payments`); the in-memory implementation runs the same
//! invariants in-process. The engine is agnostic to which one it talks to.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{SettleError, SettleResult};
use tably_core::Bill;

// =============================================================================
// Ledger Backend Trait
// =============================================================================

/// Versioned bill storage.
#[async_trait]
pub trait LedgerBackend: Send + Sync {
    /// Registers a newly opened bill.
    async fn create_bill(&self, bill: Bill) -> SettleResult<Bill>;

    /// Loads the current bill, version included.
    async fn fetch_bill(&self, bill_id: &str) -> SettleResult<Bill>;

    /// Persists a mutated bill if nobody else advanced it first.
    ///
    /// ## Errors
    /// - [`SettleError::ConcurrentModification`] when the stored version no
    ///   longer equals `expected_version`
    /// - [`SettleError::BillNotFound`] when the bill was never created
    async fn store_bill(&self, bill: Bill, expected_version: i64) -> SettleResult<Bill>;
}

// =============================================================================
// In-Memory Ledger
// =============================================================================

/// In-memory `LedgerBackend` guarded by a tokio `RwLock`.
///
/// ## Thread Safety
/// The lock is held only for the map operation itself; version checking and
/// the insert happen under one write guard, which is what makes the OCC
/// check atomic.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    bills: Arc<RwLock<HashMap<String, Bill>>>,
}

impl InMemoryLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerBackend for InMemoryLedger {
    async fn create_bill(&self, bill: Bill) -> SettleResult<Bill> {
        debug!(bill_id = %bill.id, bill_number = %bill.bill_number, "Creating bill");
        let mut bills = self.bills.write().await;
        bills.insert(bill.id.clone(), bill.clone());
        Ok(bill)
    }

    async fn fetch_bill(&self, bill_id: &str) -> SettleResult<Bill> {
        let bills = self.bills.read().await;
        bills
            .get(bill_id)
            .cloned()
            .ok_or_else(|| SettleError::BillNotFound {
                bill_id: bill_id.to_string(),
            })
    }

    async fn store_bill(&self, bill: Bill, expected_version: i64) -> SettleResult<Bill> {
        let mut bills = self.bills.write().await;

        let current = bills
            .get(&bill.id)
            .ok_or_else(|| SettleError::BillNotFound {
                bill_id: bill.id.clone(),
            })?;

        if current.version != expected_version {
            debug!(
                bill_id = %bill.id,
                expected = expected_version,
                actual = current.version,
                "OCC conflict on store"
            );
            return Err(SettleError::ConcurrentModification {
                bill_id: bill.id.clone(),
            });
        }

        bills.insert(bill.id.clone(), bill.clone());
        Ok(bill)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tably_core::{Money, PaymentRecord, RateBps};

    const SETTLE_ADDR: &str = "0x52908400098527886E0F7030069857D2E4169EE7";
    const TIP_ADDR: &str = "0x8617E340B3D01FA5F11F306F4090FD50E238070D";

    fn open_bill() -> Bill {
        Bill::open(RateBps::zero(), RateBps::zero(), SETTLE_ADDR, TIP_ADDR).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_unknown_bill() {
        let ledger = InMemoryLedger::new();
        let err = ledger.fetch_bill("nope").await.unwrap_err();
        assert!(matches!(err, SettleError::BillNotFound { .. }));
    }

    #[tokio::test]
    async fn test_store_round_trip() {
        let ledger = InMemoryLedger::new();
        let bill = ledger.create_bill(open_bill()).await.unwrap();

        let mut loaded = ledger.fetch_bill(&bill.id).await.unwrap();
        let loaded_version = loaded.version;

        let record = PaymentRecord::card(&loaded.id, Money::from_cents(100), Money::zero(), "s1");
        loaded.apply_payment(&record).unwrap();
        let stored = ledger.store_bill(loaded, loaded_version).await.unwrap();
        assert_eq!(stored.paid_cents, 100);
        assert_eq!(stored.version, loaded_version + 1);
    }

    #[tokio::test]
    async fn test_stale_version_is_rejected() {
        let ledger = InMemoryLedger::new();
        let bill = ledger.create_bill(open_bill()).await.unwrap();

        // Two writers load the same version.
        let mut first = ledger.fetch_bill(&bill.id).await.unwrap();
        let mut second = ledger.fetch_bill(&bill.id).await.unwrap();
        let base_version = first.version;

        let r1 = PaymentRecord::card(&bill.id, Money::from_cents(100), Money::zero(), "s1");
        let r2 = PaymentRecord::card(&bill.id, Money::from_cents(200), Money::zero(), "s2");

        first.apply_payment(&r1).unwrap();
        ledger.store_bill(first, base_version).await.unwrap();

        // The slower writer must be turned away.
        second.apply_payment(&r2).unwrap();
        let err = ledger.store_bill(second, base_version).await.unwrap_err();
        assert!(matches!(err, SettleError::ConcurrentModification { .. }));
    }
}
