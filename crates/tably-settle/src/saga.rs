//! # Crypto Settlement Saga
//!
//! Drives a single on-chain payment from allowance check to ledger
//! notification as an explicit, resumable state machine.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 Settlement Saga                                         │
//! │                                                                         │
//! │  CheckingAllowance ──allowance covers──────────────┐                    │
//! │       │ shortfall                                  │                    │
//! │       ▼                                            ▼                    │
//! │  AwaitingApproval ──approve(EXACT amount)──► Approved                   │
//! │       │ payer rejects                              │                    │
//! │       ▼                                            ▼                    │
//! │    Failed (not resumable)                  SubmittingPayment            │
//! │                                                    │ payBill            │
//! │                 resume ──► CheckingAllowance ◄─────┤ submission fails   │
//! │                 (never re-approves blindly)        ▼                    │
//! │                                           AwaitingConfirmation ──┐     │
//! │                                                    │ timeout:    │     │
//! │                                                    │ STILL       │     │
//! │                                                    │ PENDING,    │     │
//! │                                                    ▼ not failure─┘     │
//! │                                                Confirmed               │
//! │                                                    │                    │
//! │                                                    ▼                    │
//! │                 resume ──► NotifyingLedger ◄── notification fails       │
//! │                                                    │                    │
//! │                                                    ▼                    │
//! │                                                Complete                 │
//! │                                                                         │
//! │  Cancellation is allowed ONLY before anything irreversible exists:     │
//! │  CheckingAllowance and AwaitingApproval. From SubmittingPayment on,    │
//! │  the saga must run to Confirmed or Failed on its own.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Resume Semantics
//! A failed submission resumes at `CheckingAllowance`, not at
//! `SubmittingPayment`: the earlier approval usually still stands, so the
//! re-check skips straight to `Approved` without bothering the payer's
//! wallet again. A failed ledger notification resumes at `NotifyingLedger`
//! alone - the money already moved on-chain, and the idempotency key (the
//! tx hash) makes the retry safe to repeat indefinitely.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chain::{ChainError, PayBillRequest, SettlementGateway, TokenGateway, TxRef};
use crate::config::SettleConfig;
use crate::error::{SettleError, SettleResult};
use crate::facade::{PaymentRequest, Reconciler};
use tably_core::{validation, Bill, BillError, BillStatus, Money, SplitPlan};

// =============================================================================
// Saga Step
// =============================================================================

/// Where a settlement saga currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaStep {
    /// Reading the payer's current token allowance.
    CheckingAllowance,
    /// An approval transaction is in the payer's wallet.
    AwaitingApproval,
    /// Allowance covers the charge; ready to submit.
    Approved,
    /// Submitting the payment transaction.
    SubmittingPayment,
    /// Submitted; watching confirmation depth.
    AwaitingConfirmation,
    /// Finality reached on-chain.
    Confirmed,
    /// Recording the confirmed payment in the bill ledger.
    NotifyingLedger,
    /// Done; the bill reflects the payment.
    Complete,
    /// Stopped. `resume_step` says whether and where it can pick up.
    Failed,
}

impl SagaStep {
    /// Human-readable step name for errors and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStep::CheckingAllowance => "checking_allowance",
            SagaStep::AwaitingApproval => "awaiting_approval",
            SagaStep::Approved => "approved",
            SagaStep::SubmittingPayment => "submitting_payment",
            SagaStep::AwaitingConfirmation => "awaiting_confirmation",
            SagaStep::Confirmed => "confirmed",
            SagaStep::NotifyingLedger => "notifying_ledger",
            SagaStep::Complete => "complete",
            SagaStep::Failed => "failed",
        }
    }
}

// =============================================================================
// Settlement Saga
// =============================================================================

/// One on-chain payment attempt, with enough state to survive a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementSaga {
    /// Unique saga identifier (UUID v4).
    pub id: String,

    /// Bill being settled.
    pub bill_id: String,

    /// Set when this saga pays one share of a split plan.
    pub participant_id: Option<String>,

    /// Payer's wallet address.
    pub payer_address: String,

    /// Amount against the bill, in cents.
    pub amount_cents: i64,

    /// Tip routed to the tipping address, in cents.
    pub tip_cents: i64,

    /// Venue's settlement address, captured from the bill.
    pub business_address: String,

    /// Venue's tipping address, captured from the bill.
    pub tip_address: String,

    /// Current step.
    pub step: SagaStep,

    /// Where `resume` re-enters after a failure. `None` while Failed means
    /// the saga is a dead end (payer rejection, cancellation).
    pub resume_step: Option<SagaStep>,

    /// Last error message, for operator visibility.
    pub last_error: Option<String>,

    /// Approval transaction, once issued.
    pub approval_tx: Option<TxRef>,

    /// Payment transaction, once submitted. Doubles as the ledger
    /// idempotency key.
    pub payment_tx: Option<TxRef>,

    /// When the saga was created.
    pub created_at: DateTime<Utc>,
}

impl SettlementSaga {
    /// Starts a saga paying a bill's full remaining balance.
    ///
    /// ## Errors
    /// - [`BillError::BillClosed`] when the bill no longer takes payments
    /// - validation failure when nothing remains to pay
    pub fn for_bill(bill: &Bill, payer_address: &str, tip: Money) -> SettleResult<SettlementSaga> {
        if bill.status == BillStatus::Closed {
            return Err(BillError::BillClosed {
                bill_id: bill.id.clone(),
            }
            .into());
        }
        let amount = bill.remaining();
        validation::validate_payment_amount(amount.cents()).map_err(BillError::from)?;
        validation::validate_tip_amount(tip.cents()).map_err(BillError::from)?;
        validation::validate_address("payer_address", payer_address).map_err(BillError::from)?;

        Ok(Self::new(bill, None, payer_address, amount, tip))
    }

    /// Starts a saga paying one participant's remaining share.
    ///
    /// Checks plan freshness first: a share derived from an older item list
    /// is never settled against the current bill.
    pub fn for_share(
        bill: &Bill,
        plan: &SplitPlan,
        participant_id: &str,
        payer_address: &str,
        tip: Money,
    ) -> SettleResult<SettlementSaga> {
        if bill.status == BillStatus::Closed {
            return Err(BillError::BillClosed {
                bill_id: bill.id.clone(),
            }
            .into());
        }
        plan.ensure_fresh(bill)?;

        let share = plan
            .share_for(participant_id)
            .ok_or_else(|| SettleError::UnknownParticipant {
                participant_id: participant_id.to_string(),
            })?;
        let amount = share.remaining();
        validation::validate_payment_amount(amount.cents()).map_err(BillError::from)?;
        validation::validate_tip_amount(tip.cents()).map_err(BillError::from)?;
        validation::validate_address("payer_address", payer_address).map_err(BillError::from)?;

        Ok(Self::new(
            bill,
            Some(participant_id.to_string()),
            payer_address,
            amount,
            tip,
        ))
    }

    fn new(
        bill: &Bill,
        participant_id: Option<String>,
        payer_address: &str,
        amount: Money,
        tip: Money,
    ) -> SettlementSaga {
        SettlementSaga {
            id: Uuid::new_v4().to_string(),
            bill_id: bill.id.clone(),
            participant_id,
            payer_address: payer_address.to_string(),
            amount_cents: amount.cents(),
            tip_cents: tip.cents(),
            business_address: bill.settlement_address.clone(),
            tip_address: bill.tipping_address.clone(),
            step: SagaStep::CheckingAllowance,
            resume_step: None,
            last_error: None,
            approval_tx: None,
            payment_tx: None,
            created_at: Utc::now(),
        }
    }

    /// Total the payer is charged on-chain, in cents.
    #[inline]
    pub fn charge_cents(&self) -> i64 {
        self.amount_cents + self.tip_cents
    }

    /// Abandons the saga before anything irreversible exists.
    ///
    /// ## Errors
    /// [`SettleError::NotCancellable`] once an approval or payment
    /// transaction may be in flight.
    pub fn cancel(&mut self) -> SettleResult<()> {
        match self.step {
            SagaStep::CheckingAllowance | SagaStep::AwaitingApproval => {
                self.step = SagaStep::Failed;
                self.resume_step = None;
                self.last_error = Some("cancelled by payer".to_string());
                Ok(())
            }
            step => Err(SettleError::NotCancellable {
                step: step.as_str().to_string(),
            }),
        }
    }

    fn fail(&mut self, resume_step: Option<SagaStep>, error: &SettleError) {
        self.step = SagaStep::Failed;
        self.resume_step = resume_step;
        self.last_error = Some(error.to_string());
    }

    fn pay_request(&self) -> PayBillRequest {
        PayBillRequest {
            bill_id: self.bill_id.clone(),
            amount_cents: self.amount_cents,
            tip_cents: self.tip_cents,
            business_address: self.business_address.clone(),
            tip_address: self.tip_address.clone(),
        }
    }
}

// =============================================================================
// Saga Driver
// =============================================================================

/// Executes settlement sagas against the chain gateways and the reconciler.
pub struct SagaDriver {
    token: Arc<dyn TokenGateway>,
    settlement: Arc<dyn SettlementGateway>,
    reconciler: Arc<Reconciler>,
    config: SettleConfig,
}

impl SagaDriver {
    /// Wires a driver to its collaborators.
    pub fn new(
        token: Arc<dyn TokenGateway>,
        settlement: Arc<dyn SettlementGateway>,
        reconciler: Arc<Reconciler>,
        config: SettleConfig,
    ) -> Self {
        SagaDriver {
            token,
            settlement,
            reconciler,
            config,
        }
    }

    /// Runs the saga until it completes, fails, or reports still-pending.
    ///
    /// ## Return Values
    /// - `Ok(())` with `step == Complete`: the bill reflects the payment.
    /// - `Ok(())` with `step == AwaitingConfirmation`: the transaction is
    ///   submitted but not yet final; call `run` again later.
    /// - `Err(..)` with `step == Failed`: see `resume_step` for whether
    ///   [`SagaDriver::resume`] can pick it up.
    pub async fn run(&self, saga: &mut SettlementSaga) -> SettleResult<()> {
        loop {
            let before = saga.step;
            self.advance(saga).await?;

            match saga.step {
                SagaStep::Complete => return Ok(()),
                // A confirmation poll that ran out of patience: submitted,
                // not final, not failed. The caller checks back later.
                SagaStep::AwaitingConfirmation if before == SagaStep::AwaitingConfirmation => {
                    return Ok(());
                }
                _ => continue,
            }
        }
    }

    /// Re-enters a failed saga at its recorded resume step and runs it.
    pub async fn resume(&self, saga: &mut SettlementSaga) -> SettleResult<()> {
        if saga.step != SagaStep::Failed {
            return Err(SettleError::NotResumable {
                reason: format!("saga is {}, not failed", saga.step.as_str()),
            });
        }
        let resume_step = saga.resume_step.take().ok_or_else(|| {
            SettleError::NotResumable {
                reason: saga
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "no resume point recorded".to_string()),
            }
        })?;

        info!(
            saga_id = %saga.id,
            bill_id = %saga.bill_id,
            resume_step = resume_step.as_str(),
            "Resuming saga"
        );
        saga.step = resume_step;
        saga.last_error = None;
        self.run(saga).await
    }

    /// Advances the saga by one step.
    async fn advance(&self, saga: &mut SettlementSaga) -> SettleResult<()> {
        debug!(
            saga_id = %saga.id,
            bill_id = %saga.bill_id,
            step = saga.step.as_str(),
            "Advancing saga"
        );

        match saga.step {
            SagaStep::CheckingAllowance => self.check_allowance(saga).await,
            SagaStep::AwaitingApproval => self.request_approval(saga).await,
            SagaStep::Approved => {
                saga.step = SagaStep::SubmittingPayment;
                Ok(())
            }
            SagaStep::SubmittingPayment => self.submit_payment(saga).await,
            SagaStep::AwaitingConfirmation => self.await_confirmation(saga).await,
            SagaStep::Confirmed => {
                saga.step = SagaStep::NotifyingLedger;
                Ok(())
            }
            SagaStep::NotifyingLedger => self.notify_ledger(saga).await,
            SagaStep::Complete => Ok(()),
            SagaStep::Failed => Err(SettleError::NotResumable {
                reason: "advance called on a failed saga; use resume".to_string(),
            }),
        }
    }

    /// Reads the allowance; skips approval entirely when it already covers
    /// the charge. This is the step a post-submission resume lands on, so a
    /// still-standing approval is never repeated.
    async fn check_allowance(&self, saga: &mut SettlementSaga) -> SettleResult<()> {
        let spender = self.settlement.contract_address();
        let allowance = match self.token.allowance(&saga.payer_address, spender).await {
            Ok(allowance) => allowance,
            Err(chain_err) => {
                let err = SettleError::from(chain_err);
                saga.fail(Some(SagaStep::CheckingAllowance), &err);
                return Err(err);
            }
        };

        if allowance >= saga.charge_cents() {
            debug!(
                saga_id = %saga.id,
                allowance,
                charge = saga.charge_cents(),
                "Existing allowance covers the charge"
            );
            saga.step = SagaStep::Approved;
        } else {
            saga.step = SagaStep::AwaitingApproval;
        }
        Ok(())
    }

    /// Requests approval for EXACTLY the charge - never an unlimited
    /// allowance. A payer rejection is terminal, not resumable: the payer
    /// said no, and a fresh saga is the only way to ask again.
    async fn request_approval(&self, saga: &mut SettlementSaga) -> SettleResult<()> {
        let spender = self.settlement.contract_address();
        match self
            .token
            .approve(&saga.payer_address, spender, saga.charge_cents())
            .await
        {
            Ok(tx) => {
                debug!(saga_id = %saga.id, approval_tx = %tx, "Approval issued");
                saga.approval_tx = Some(tx);
                saga.step = SagaStep::Approved;
                Ok(())
            }
            Err(ChainError::Rejected) => {
                let err = SettleError::UserRejected;
                saga.fail(None, &err);
                warn!(saga_id = %saga.id, "Payer rejected the approval");
                Err(err)
            }
            Err(chain_err) => {
                let err = SettleError::from(chain_err);
                saga.fail(Some(SagaStep::AwaitingApproval), &err);
                Err(err)
            }
        }
    }

    /// Submits the payment transaction. On failure, resume re-enters at the
    /// allowance check rather than here: the approval may still stand, and
    /// the re-check proves it before any wallet interaction.
    async fn submit_payment(&self, saga: &mut SettlementSaga) -> SettleResult<()> {
        let request = saga.pay_request();
        match self.settlement.pay_bill(&saga.payer_address, &request).await {
            Ok(tx) => {
                info!(
                    saga_id = %saga.id,
                    bill_id = %saga.bill_id,
                    payment_tx = %tx,
                    amount = saga.amount_cents,
                    tip = saga.tip_cents,
                    "Payment submitted"
                );
                saga.payment_tx = Some(tx);
                saga.step = SagaStep::AwaitingConfirmation;
                Ok(())
            }
            Err(chain_err) => {
                let err = SettleError::from(chain_err);
                saga.fail(Some(SagaStep::CheckingAllowance), &err);
                warn!(saga_id = %saga.id, error = %err, "Payment submission failed");
                Err(err)
            }
        }
    }

    /// Polls confirmation depth until finality or the configured patience
    /// runs out. Running out of patience is NOT a failure: the transaction
    /// is on-chain and may yet confirm, so the saga simply stays here.
    async fn await_confirmation(&self, saga: &mut SettlementSaga) -> SettleResult<()> {
        let tx = match &saga.payment_tx {
            Some(tx) => tx.clone(),
            None => {
                // Unreachable through the driver; recorded defensively as a
                // resumable failure rather than a panic.
                let err = SettleError::NotResumable {
                    reason: "awaiting confirmation without a payment tx".to_string(),
                };
                saga.fail(Some(SagaStep::CheckingAllowance), &err);
                return Err(err);
            }
        };

        let deadline = Instant::now() + self.config.confirmation_timeout();
        loop {
            match self.settlement.confirmations(&tx).await {
                Ok(count) if count >= self.config.required_confirmations => {
                    info!(saga_id = %saga.id, payment_tx = %tx, confirmations = count, "Payment confirmed");
                    saga.step = SagaStep::Confirmed;
                    return Ok(());
                }
                Ok(count) => {
                    debug!(
                        saga_id = %saga.id,
                        confirmations = count,
                        required = self.config.required_confirmations,
                        "Still awaiting confirmations"
                    );
                }
                // RPC hiccups during polling are transient; keep polling
                // until the patience budget decides.
                Err(chain_err) => {
                    debug!(saga_id = %saga.id, error = %chain_err, "Confirmation poll failed; will retry");
                }
            }

            if Instant::now() + self.config.confirmation_poll() > deadline {
                debug!(saga_id = %saga.id, payment_tx = %tx, "Confirmation pending past patience budget");
                return Ok(());
            }
            sleep(self.config.confirmation_poll()).await;
        }
    }

    /// Records the confirmed payment in the bill ledger, keyed by the tx
    /// hash. Safe to repeat: a replay lands as a silent duplicate.
    async fn notify_ledger(&self, saga: &mut SettlementSaga) -> SettleResult<()> {
        let tx = match &saga.payment_tx {
            Some(tx) => tx.clone(),
            None => {
                let err = SettleError::NotResumable {
                    reason: "notifying ledger without a payment tx".to_string(),
                };
                saga.fail(None, &err);
                return Err(err);
            }
        };

        let request = PaymentRequest::crypto(
            &saga.bill_id,
            Money::from_cents(saga.amount_cents),
            Money::from_cents(saga.tip_cents),
            &saga.payer_address,
            tx.as_str(),
        );

        match self.reconciler.record_payment(request).await {
            Ok(bill) => {
                info!(
                    saga_id = %saga.id,
                    bill_id = %bill.id,
                    paid = bill.paid_cents,
                    bill_status = %bill.status,
                    "Ledger notified"
                );
                saga.step = SagaStep::Complete;
                Ok(())
            }
            Err(err) => {
                // The money already moved; only the notification retries.
                saga.fail(Some(SagaStep::NotifyingLedger), &err);
                warn!(saga_id = %saga.id, error = %err, "Ledger notification failed");
                Err(err)
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
    use tably_core::{LineItem, PaymentRecord, RateBps};

    const SETTLE_ADDR: &str = "0x52908400098527886E0F7030069857D2E4169EE7";
    const TIP_ADDR: &str = "0x8617E340B3D01FA5F11F306F4090FD50E238070D";
    const PAYER: &str = "0xDE709F2102306220921060314715629080E2FB77";

    fn bill_with_total(total: i64) -> Bill {
        let mut bill = Bill::open(RateBps::zero(), RateBps::zero(), SETTLE_ADDR, TIP_ADDR).unwrap();
        bill.add_line_item(LineItem::new(
            "Tasting menu",
            Money::from_cents(total),
            1,
            Money::zero(),
        ))
        .unwrap();
        bill
    }

    #[test]
    fn test_for_bill_charges_remaining_balance() {
        let mut bill = bill_with_total(10_000);
        let record = PaymentRecord::card(&bill.id, Money::from_cents(4000), Money::zero(), "s1");
        bill.apply_payment(&record).unwrap();

        let saga = SettlementSaga::for_bill(&bill, PAYER, Money::from_cents(500)).unwrap();
        assert_eq!(saga.amount_cents, 6000);
        assert_eq!(saga.charge_cents(), 6500);
        assert_eq!(saga.step, SagaStep::CheckingAllowance);
        assert_eq!(saga.business_address, SETTLE_ADDR);
        assert_eq!(saga.tip_address, TIP_ADDR);
    }

    #[test]
    fn test_for_bill_rejects_settled_and_closed_bills() {
        let mut bill = bill_with_total(1000);
        let record = PaymentRecord::card(&bill.id, Money::from_cents(1000), Money::zero(), "s1");
        bill.apply_payment(&record).unwrap();

        // Fully paid: nothing to charge.
        assert!(SettlementSaga::for_bill(&bill, PAYER, Money::zero()).is_err());

        bill.close().unwrap();
        let err = SettlementSaga::for_bill(&bill, PAYER, Money::zero()).unwrap_err();
        assert!(matches!(err, SettleError::Core(BillError::BillClosed { .. })));
    }

    #[test]
    fn test_for_share_uses_share_remaining() {
        let bill = bill_with_total(10_000);
        let plan = SplitPlan::equal_split(&bill, 4).unwrap();

        let saga =
            SettlementSaga::for_share(&bill, &plan, "participant-2", PAYER, Money::zero()).unwrap();
        assert_eq!(saga.amount_cents, 2500);
        assert_eq!(saga.participant_id.as_deref(), Some("participant-2"));

        let err = SettlementSaga::for_share(&bill, &plan, "nobody", PAYER, Money::zero())
            .unwrap_err();
        assert!(matches!(err, SettleError::UnknownParticipant { .. }));
    }

    #[test]
    fn test_for_share_rejects_stale_plan() {
        let mut bill = bill_with_total(10_000);
        let plan = SplitPlan::equal_split(&bill, 2).unwrap();

        bill.add_line_item(LineItem::new(
            "Late dessert",
            Money::from_cents(900),
            1,
            Money::zero(),
        ))
        .unwrap();

        let err =
            SettlementSaga::for_share(&bill, &plan, "participant-1", PAYER, Money::zero())
                .unwrap_err();
        assert!(matches!(err, SettleError::Core(BillError::StalePlan { .. })));
    }

    #[test]
    fn test_cancel_window() {
        let bill = bill_with_total(1000);
        let mut saga = SettlementSaga::for_bill(&bill, PAYER, Money::zero()).unwrap();

        // Cancellable before anything irreversible.
        let mut early = saga.clone();
        early.cancel().unwrap();
        assert_eq!(early.step, SagaStep::Failed);
        assert!(early.resume_step.is_none());

        // Once a payment may be in flight, cancellation is refused.
        saga.step = SagaStep::SubmittingPayment;
        let err = saga.cancel().unwrap_err();
        assert!(matches!(err, SettleError::NotCancellable { .. }));
        assert_eq!(saga.step, SagaStep::SubmittingPayment);
    }
}
