//! # Reconciliation Facade
//!
//! The single entry point through which ANY payment - on-chain, cash, card,
//! full bill or split share - reaches a bill.
//!
//! ## Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 Reconciler Write Path                                   │
//! │                                                                         │
//! │  record_payment(request)                                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  validate amounts, build PaymentRecord (key fixed ONCE)                │
//! │       │                                                                 │
//! │       ▼                          retry ≤ max_reconcile_retries         │
//! │  ┌─► fetch bill + version  ◄──────────────────────────┐                │
//! │  │        │                                           │                │
//! │  │        ▼                                           │                │
//! │  │   Bill::apply_payment  ──► Duplicate? return       │                │
//! │  │        │                   unchanged bill (success)│                │
//! │  │        ▼                                           │                │
//! │  └── store(expected version) ── ConcurrentModification┘                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │      append to PaymentRecordStore, return ledger-confirmed bill        │
//! │                                                                         │
//! │  Consumers NEVER mutate Bill fields directly - this loop is the only   │
//! │  path, and the OCC gate is where concurrent payments serialize.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::SettleConfig;
use crate::error::{SettleError, SettleResult};
use crate::ledger::LedgerBackend;
use tably_core::{
    validation, Bill, Money, PaymentMethod, PaymentOutcome, PaymentRecord, PaymentRecordStore,
    SplitPlan, ValidationError,
};

// =============================================================================
// Payment Request
// =============================================================================

/// A request to apply one payment to a bill.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    /// Target bill.
    pub bill_id: String,

    /// Payment channel.
    pub method: PaymentMethod,

    /// Amount against the bill total.
    pub amount: Money,

    /// Tip on top of the amount.
    pub tip: Money,

    /// Wallet address (crypto) or staff identifier (cash/card).
    pub payer_reference: String,

    /// Transaction hash for crypto payments. Cash/card requests leave this
    /// unset and receive a generated UUID key.
    pub idempotency_key: Option<String>,

    /// For cash: amount tendered, to compute change.
    pub tendered: Option<Money>,
}

impl PaymentRequest {
    /// A crypto payment keyed by its transaction hash.
    pub fn crypto(bill_id: &str, amount: Money, tip: Money, wallet: &str, tx_hash: &str) -> Self {
        PaymentRequest {
            bill_id: bill_id.to_string(),
            method: PaymentMethod::Crypto,
            amount,
            tip,
            payer_reference: wallet.to_string(),
            idempotency_key: Some(tx_hash.to_string()),
            tendered: None,
        }
    }

    /// A staff-recorded cash payment.
    pub fn cash(bill_id: &str, amount: Money, tip: Money, staff_ref: &str, tendered: Money) -> Self {
        PaymentRequest {
            bill_id: bill_id.to_string(),
            method: PaymentMethod::Cash,
            amount,
            tip,
            payer_reference: staff_ref.to_string(),
            idempotency_key: None,
            tendered: Some(tendered),
        }
    }

    /// A staff-recorded external card payment.
    pub fn card(bill_id: &str, amount: Money, tip: Money, staff_ref: &str) -> Self {
        PaymentRequest {
            bill_id: bill_id.to_string(),
            method: PaymentMethod::Card,
            amount,
            tip,
            payer_reference: staff_ref.to_string(),
            idempotency_key: None,
            tendered: None,
        }
    }

    /// Builds the payment record. Called exactly once per request so the
    /// idempotency key is fixed before any retry loop starts.
    fn into_record(self) -> SettleResult<PaymentRecord> {
        validation::validate_payment_amount(self.amount.cents())
            .map_err(tably_core::BillError::from)?;
        validation::validate_tip_amount(self.tip.cents()).map_err(tably_core::BillError::from)?;

        let record = match self.method {
            PaymentMethod::Crypto => {
                let tx_hash = self.idempotency_key.ok_or_else(|| {
                    tably_core::BillError::from(ValidationError::Required {
                        field: "idempotency_key".to_string(),
                    })
                })?;
                PaymentRecord::crypto(
                    &self.bill_id,
                    self.amount,
                    self.tip,
                    &self.payer_reference,
                    &tx_hash,
                )
            }
            PaymentMethod::Cash => PaymentRecord::cash(
                &self.bill_id,
                self.amount,
                self.tip,
                &self.payer_reference,
                self.tendered.unwrap_or(self.amount + self.tip),
            ),
            PaymentMethod::Card => {
                PaymentRecord::card(&self.bill_id, self.amount, self.tip, &self.payer_reference)
            }
        };
        Ok(record)
    }
}

// =============================================================================
// Reconciler
// =============================================================================

/// The reconciliation facade.
pub struct Reconciler {
    /// Bill storage with the OCC gate.
    ledger: Arc<dyn LedgerBackend>,

    /// Append-only record of applied payments.
    records: Mutex<PaymentRecordStore>,

    /// Retry bounds.
    config: SettleConfig,
}

impl Reconciler {
    /// Creates a reconciler over a ledger backend.
    pub fn new(ledger: Arc<dyn LedgerBackend>, config: SettleConfig) -> Self {
        Reconciler {
            ledger,
            records: Mutex::new(PaymentRecordStore::new()),
            config,
        }
    }

    /// Applies one payment to a bill and returns the ledger-confirmed bill.
    ///
    /// ## Retry Semantics
    /// `ConcurrentModification` restarts the whole fetch-apply-store cycle
    /// (never just the write) up to `max_reconcile_retries` times, then
    /// surfaces. A duplicate idempotency key returns the unchanged bill as
    /// success - the retry-safety contract the saga's notification step
    /// depends on.
    pub async fn record_payment(&self, request: PaymentRequest) -> SettleResult<Bill> {
        let record = request.into_record()?;
        self.apply_record(record, None).await
    }

    /// Applies a payment against one share of a split plan.
    ///
    /// ## Additional Checks
    /// Fails with `StalePlan` before any money moves if the bill's items
    /// changed since the plan was derived. The freshness check runs against
    /// EVERY fetch inside the retry loop - an item added concurrently in the
    /// fetch/store window surfaces as `StalePlan` on the retry instead of
    /// letting a stale share pay. Marks the share's status after the ledger
    /// confirms the payment.
    pub async fn record_share_payment(
        &self,
        plan: &mut SplitPlan,
        participant_id: &str,
        request: PaymentRequest,
    ) -> SettleResult<Bill> {
        if plan.share_for(participant_id).is_none() {
            return Err(SettleError::UnknownParticipant {
                participant_id: participant_id.to_string(),
            });
        }

        let record = request.into_record()?;
        let amount = Money::from_cents(record.amount_cents);
        let tip = Money::from_cents(record.tip_cents);
        let updated = self.apply_record(record, Some(plan)).await?;

        // Unwrap-free by the check above.
        if let Some(share) = plan.share_for_mut(participant_id) {
            share.apply_payment(amount, tip);
            debug!(
                bill_id = %updated.id,
                participant_id = %participant_id,
                share_status = ?share.status,
                "Share updated"
            );
        }

        Ok(updated)
    }

    /// Closes a bill through the same OCC gate as payments.
    pub async fn close_bill(&self, bill_id: &str) -> SettleResult<Bill> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let current = self.ledger.fetch_bill(bill_id).await?;
            let loaded_version = current.version;

            let mut updated = current;
            updated.close()?;

            match self.ledger.store_bill(updated, loaded_version).await {
                Ok(stored) => {
                    info!(bill_id = %stored.id, remaining = %stored.remaining(), "Bill closed");
                    return Ok(stored);
                }
                Err(SettleError::ConcurrentModification { .. })
                    if attempt <= self.config.max_reconcile_retries =>
                {
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Read-only view of a bill.
    pub async fn bill(&self, bill_id: &str) -> SettleResult<Bill> {
        self.ledger.fetch_bill(bill_id).await
    }

    /// The ledger backend behind this reconciler, for bill creation and
    /// composition at wiring time.
    pub fn ledger(&self) -> &Arc<dyn LedgerBackend> {
        &self.ledger
    }

    /// Payment records applied to a bill, in application order.
    pub async fn payments_for(&self, bill_id: &str) -> Vec<PaymentRecord> {
        let records = self.records.lock().await;
        records
            .records_for_bill(bill_id)
            .into_iter()
            .cloned()
            .collect()
    }

    /// The fetch-apply-store cycle behind every payment. When a split plan
    /// is supplied, its freshness is re-verified against each fetch, so a
    /// retry never applies a share derived from an older item list.
    async fn apply_record(
        &self,
        record: PaymentRecord,
        plan: Option<&SplitPlan>,
    ) -> SettleResult<Bill> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let current = self.ledger.fetch_bill(&record.bill_id).await?;
            let loaded_version = current.version;

            if let Some(plan) = plan {
                plan.ensure_fresh(&current)?;
            }

            let mut updated = current.clone();
            let outcome = updated.apply_payment(&record)?;

            if outcome == PaymentOutcome::Duplicate {
                // A replay with matching amounts is a safe retry; the same
                // key with different money is a conflict, never a no-op.
                let records = self.records.lock().await;
                if let Some(existing) = records.get(&record.idempotency_key) {
                    if existing.amount_cents != record.amount_cents
                        || existing.tip_cents != record.tip_cents
                    {
                        return Err(tably_core::BillError::DuplicatePayment {
                            key: record.idempotency_key.clone(),
                        }
                        .into());
                    }
                }
                debug!(
                    bill_id = %record.bill_id,
                    key = %record.idempotency_key,
                    "Duplicate idempotency key; returning unchanged bill"
                );
                return Ok(current);
            }

            match self.ledger.store_bill(updated, loaded_version).await {
                Ok(stored) => {
                    // The bill accepted the key; mirror it into the record
                    // store. A replayed key lands here as a silent Duplicate.
                    self.records.lock().await.apply(record.clone())?;
                    info!(
                        bill_id = %stored.id,
                        method = ?record.method,
                        amount = %record.amount(),
                        tip = %record.tip(),
                        paid = stored.paid_cents,
                        status = %stored.status,
                        "Payment applied"
                    );
                    return Ok(stored);
                }
                Err(SettleError::ConcurrentModification { bill_id })
                    if attempt <= self.config.max_reconcile_retries =>
                {
                    debug!(bill_id = %bill_id, attempt, "OCC conflict; retrying whole operation");
                    continue;
                }
                Err(err) => {
                    warn!(bill_id = %record.bill_id, error = %err, "Payment not applied");
                    return Err(err);
                }
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use tably_core::{BillError, BillStatus, LineItem, RateBps};

    const SETTLE_ADDR: &str = "0x52908400098527886E0F7030069857D2E4169EE7";
    const TIP_ADDR: &str = "0x8617E340B3D01FA5F11F306F4090FD50E238070D";

    async fn reconciler_with_bill(total: i64) -> (Reconciler, String) {
        let ledger = Arc::new(InMemoryLedger::new());
        let mut bill = Bill::open(RateBps::zero(), RateBps::zero(), SETTLE_ADDR, TIP_ADDR).unwrap();
        bill.add_line_item(LineItem::new(
            "Tasting menu",
            Money::from_cents(total),
            1,
            Money::zero(),
        ))
        .unwrap();
        let bill = ledger.create_bill(bill).await.unwrap();

        (
            Reconciler::new(ledger, SettleConfig::default()),
            bill.id,
        )
    }

    #[tokio::test]
    async fn test_record_payment_reaches_paid() {
        let (reconciler, bill_id) = reconciler_with_bill(4250).await;

        let bill = reconciler
            .record_payment(PaymentRequest::crypto(
                &bill_id,
                Money::from_cents(4250),
                Money::zero(),
                "0xpayer",
                "0xhash1",
            ))
            .await
            .unwrap();

        assert_eq!(bill.status, BillStatus::Paid);
        assert_eq!(bill.remaining().cents(), 0);
        assert_eq!(reconciler.payments_for(&bill_id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_key_is_success_and_applies_once() {
        let (reconciler, bill_id) = reconciler_with_bill(4250).await;
        let request = PaymentRequest::crypto(
            &bill_id,
            Money::from_cents(2000),
            Money::from_cents(100),
            "0xpayer",
            "0xhash1",
        );

        let first = reconciler.record_payment(request.clone()).await.unwrap();
        let second = reconciler.record_payment(request).await.unwrap();

        assert_eq!(first.paid_cents, 2000);
        assert_eq!(second.paid_cents, 2000);
        assert_eq!(second.tip_cents, 100);
        assert_eq!(reconciler.payments_for(&bill_id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_same_key_different_money_is_rejected() {
        let (reconciler, bill_id) = reconciler_with_bill(4250).await;
        reconciler
            .record_payment(PaymentRequest::crypto(
                &bill_id,
                Money::from_cents(2000),
                Money::zero(),
                "0xpayer",
                "0xhash1",
            ))
            .await
            .unwrap();

        let err = reconciler
            .record_payment(PaymentRequest::crypto(
                &bill_id,
                Money::from_cents(9999),
                Money::zero(),
                "0xpayer",
                "0xhash1",
            ))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SettleError::Core(BillError::DuplicatePayment { .. })
        ));

        let bill = reconciler.bill(&bill_id).await.unwrap();
        assert_eq!(bill.paid_cents, 2000);
    }

    #[tokio::test]
    async fn test_concurrent_payments_both_land() {
        let (reconciler, bill_id) = reconciler_with_bill(10_000).await;
        let reconciler = Arc::new(reconciler);

        let a = {
            let reconciler = Arc::clone(&reconciler);
            let bill_id = bill_id.clone();
            tokio::spawn(async move {
                reconciler
                    .record_payment(PaymentRequest::crypto(
                        &bill_id,
                        Money::from_cents(6000),
                        Money::zero(),
                        "0xana",
                        "0xhash-a",
                    ))
                    .await
            })
        };
        let b = {
            let reconciler = Arc::clone(&reconciler);
            let bill_id = bill_id.clone();
            tokio::spawn(async move {
                reconciler
                    .record_payment(PaymentRequest::crypto(
                        &bill_id,
                        Money::from_cents(4000),
                        Money::zero(),
                        "0xben",
                        "0xhash-b",
                    ))
                    .await
            })
        };

        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        // No lost update: both amounts are in.
        let bill = reconciler.bill(&bill_id).await.unwrap();
        assert_eq!(bill.paid_cents, 10_000);
        assert_eq!(bill.status, BillStatus::Paid);
    }

    #[tokio::test]
    async fn test_share_payment_marks_share_and_rejects_stale_plan() {
        let (reconciler, bill_id) = reconciler_with_bill(10_000).await;
        let bill = reconciler.bill(&bill_id).await.unwrap();
        let mut plan = SplitPlan::equal_split(&bill, 2).unwrap();
        let owed = plan.shares[0].amount_owed_cents;

        let updated = reconciler
            .record_share_payment(
                &mut plan,
                "participant-1",
                PaymentRequest::crypto(
                    &bill_id,
                    Money::from_cents(owed),
                    Money::from_cents(500),
                    "0xana",
                    "0xhash-a",
                ),
            )
            .await
            .unwrap();

        assert_eq!(updated.paid_cents, owed);
        assert_eq!(
            plan.share_for("participant-1").unwrap().status,
            tably_core::ShareStatus::Paid
        );

        // Items change behind the plan's back: next share payment refuses.
        let mut changed = reconciler.bill(&bill_id).await.unwrap();
        let version = changed.version;
        changed
            .add_line_item(LineItem::new(
                "Late dessert",
                Money::from_cents(900),
                1,
                Money::zero(),
            ))
            .unwrap();
        reconciler
            .ledger
            .store_bill(changed, version)
            .await
            .unwrap();

        let err = reconciler
            .record_share_payment(
                &mut plan,
                "participant-2",
                PaymentRequest::crypto(
                    &bill_id,
                    Money::from_cents(owed),
                    Money::zero(),
                    "0xben",
                    "0xhash-b",
                ),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SettleError::Core(BillError::StalePlan { .. })
        ));
    }

    #[tokio::test]
    async fn test_share_payment_detects_item_added_mid_write() {
        use async_trait::async_trait;
        use std::sync::atomic::{AtomicBool, Ordering};

        // Ledger that interleaves another terminal's add_line_item into the
        // first writer's fetch/store window, then reports the conflict.
        struct RacingLedger {
            inner: InMemoryLedger,
            raced: AtomicBool,
        }

        #[async_trait]
        impl LedgerBackend for RacingLedger {
            async fn create_bill(&self, bill: Bill) -> SettleResult<Bill> {
                self.inner.create_bill(bill).await
            }

            async fn fetch_bill(&self, bill_id: &str) -> SettleResult<Bill> {
                self.inner.fetch_bill(bill_id).await
            }

            async fn store_bill(&self, bill: Bill, expected_version: i64) -> SettleResult<Bill> {
                if !self.raced.swap(true, Ordering::SeqCst) {
                    let mut other = self.inner.fetch_bill(&bill.id).await?;
                    let version = other.version;
                    other
                        .add_line_item(LineItem::new(
                            "Late dessert",
                            Money::from_cents(900),
                            1,
                            Money::zero(),
                        ))
                        .expect("bill is open");
                    self.inner.store_bill(other, version).await?;
                    return Err(SettleError::ConcurrentModification {
                        bill_id: bill.id.clone(),
                    });
                }
                self.inner.store_bill(bill, expected_version).await
            }
        }

        let ledger = Arc::new(RacingLedger {
            inner: InMemoryLedger::new(),
            raced: AtomicBool::new(false),
        });
        let mut bill = Bill::open(RateBps::zero(), RateBps::zero(), SETTLE_ADDR, TIP_ADDR).unwrap();
        bill.add_line_item(LineItem::new(
            "Tasting menu",
            Money::from_cents(10_000),
            1,
            Money::zero(),
        ))
        .unwrap();
        let bill = ledger.create_bill(bill).await.unwrap();
        let reconciler = Reconciler::new(ledger, SettleConfig::default());

        let mut plan = SplitPlan::equal_split(&bill, 2).unwrap();
        let owed = plan.shares[0].amount_owed_cents;

        // The retry re-fetches, sees the new item, and refuses the stale
        // share instead of applying it.
        let err = reconciler
            .record_share_payment(
                &mut plan,
                "participant-1",
                PaymentRequest::crypto(
                    &bill.id,
                    Money::from_cents(owed),
                    Money::zero(),
                    "0xana",
                    "0xhash-a",
                ),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SettleError::Core(BillError::StalePlan { .. })
        ));

        // No money moved and the share is untouched.
        let current = reconciler.bill(&bill.id).await.unwrap();
        assert_eq!(current.paid_cents, 0);
        assert_eq!(
            plan.share_for("participant-1").unwrap().status,
            tably_core::ShareStatus::Unpaid
        );
    }

    #[tokio::test]
    async fn test_close_bill_with_shortfall() {
        let (reconciler, bill_id) = reconciler_with_bill(4250).await;
        reconciler
            .record_payment(PaymentRequest::cash(
                &bill_id,
                Money::from_cents(2000),
                Money::zero(),
                "staff-1",
                Money::from_cents(2000),
            ))
            .await
            .unwrap();

        let closed = reconciler.close_bill(&bill_id).await.unwrap();
        assert_eq!(closed.status, BillStatus::Closed);
        assert_eq!(closed.remaining().cents(), 2250);

        // A closed bill takes no more payments.
        let err = reconciler
            .record_payment(PaymentRequest::card(
                &bill_id,
                Money::from_cents(2250),
                Money::zero(),
                "staff-1",
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, SettleError::Core(BillError::BillClosed { .. })));
    }

    #[tokio::test]
    async fn test_crypto_request_requires_tx_hash() {
        let (reconciler, bill_id) = reconciler_with_bill(1000).await;
        let request = PaymentRequest {
            bill_id,
            method: PaymentMethod::Crypto,
            amount: Money::from_cents(1000),
            tip: Money::zero(),
            payer_reference: "0xpayer".to_string(),
            idempotency_key: None,
            tendered: None,
        };

        let err = reconciler.record_payment(request).await.unwrap_err();
        assert!(matches!(err, SettleError::Core(BillError::Validation(_))));
    }
}
