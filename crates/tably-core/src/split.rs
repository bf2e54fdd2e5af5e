//! # Split Plan Engine
//!
//! Partitions one bill's totals into per-participant shares.
//!
//! ## Strategies
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Split Strategies                                 │
//! │                                                                         │
//! │  EQUAL                                                                 │
//! │  ─────                                                                 │
//! │  • Unit weight per participant                                         │
//! │  • Subtotal, tax and service fee each allocated independently,         │
//! │    then summed per participant                                         │
//! │                                                                         │
//! │  BY ITEM                                                               │
//! │  ───────                                                               │
//! │  • Every line item assigned to exactly one participant                 │
//! │  • Participant subtotal = sum of assigned item subtotals (exact)       │
//! │  • Tax/fee prorated by those subtotals via allocate()                  │
//! │                                                                         │
//! │  CUSTOM                                                                │
//! │  ──────                                                                │
//! │  • Caller supplies the amounts outright                                │
//! │  • Strict equality check against the bill total - NO rounding          │
//! │                                                                         │
//! │  INVARIANT (all strategies):                                           │
//! │    Σ share.amount_owed_cents == bill.total_cents   EXACTLY             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Tips
//! Tip is never pre-allocated. Each participant adds their own tip at
//! settlement time; it lands on their share and the bill's `tip_cents`,
//! never on anyone else's amount owed.
//!
//! ## Staleness
//! A plan pins the bill's `items_version` at derivation. If items change
//! afterwards, every operation through the plan fails with `StalePlan` -
//! shares are never silently reused against a changed bill.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::bill::Bill;
use crate::error::{BillError, BillResult};
use crate::money::{allocate, Money};
use crate::validation;

// =============================================================================
// Split Strategy
// =============================================================================

/// How the bill is partitioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SplitStrategy {
    /// Even split across participants.
    Equal,
    /// Each participant pays for their own items.
    ByItem,
    /// Caller-specified amounts, validated to the cent.
    Custom,
}

// =============================================================================
// Share Status
// =============================================================================

/// Payment progress of a single share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ShareStatus {
    /// Nothing paid yet.
    Unpaid,
    /// Some, but not all, of the amount owed has arrived.
    PartiallyPaid,
    /// The amount owed is covered.
    Paid,
}

// =============================================================================
// Share
// =============================================================================

/// One participant's slice of the bill.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Share {
    /// Participant identifier (session ID, seat number, name - opaque here).
    pub participant_id: String,

    /// Items this share covers (ByItem strategy only, empty otherwise).
    pub item_ids: Vec<String>,

    /// What this participant owes, in cents.
    pub amount_owed_cents: i64,

    /// The tax portion inside `amount_owed_cents`.
    pub tax_share_cents: i64,

    /// The service fee portion inside `amount_owed_cents`.
    pub service_fee_share_cents: i64,

    /// Tip this participant added at settlement time.
    pub tip_cents: i64,

    /// Amount paid towards this share so far.
    pub paid_cents: i64,

    /// Payment progress.
    pub status: ShareStatus,
}

impl Share {
    fn new(
        participant_id: &str,
        item_ids: Vec<String>,
        amount_owed: Money,
        tax_share: Money,
        service_fee_share: Money,
    ) -> Self {
        Share {
            participant_id: participant_id.to_string(),
            item_ids,
            amount_owed_cents: amount_owed.cents(),
            tax_share_cents: tax_share.cents(),
            service_fee_share_cents: service_fee_share.cents(),
            tip_cents: 0,
            paid_cents: 0,
            status: ShareStatus::Unpaid,
        }
    }

    /// Records a payment against this share and re-derives its status.
    ///
    /// Tips accumulate on the share but never count towards the amount
    /// owed - a generous tipper is not "overpaying" their share.
    pub fn apply_payment(&mut self, amount: Money, tip: Money) {
        self.paid_cents += amount.cents();
        self.tip_cents += tip.cents();
        self.status = if self.paid_cents >= self.amount_owed_cents {
            ShareStatus::Paid
        } else if self.paid_cents > 0 {
            ShareStatus::PartiallyPaid
        } else {
            ShareStatus::Unpaid
        };
    }

    /// What is still owed on this share (never counts tips).
    #[inline]
    pub fn remaining(&self) -> Money {
        Money::from_cents(self.amount_owed_cents - self.paid_cents)
    }
}

// =============================================================================
// Split Plan
// =============================================================================

/// A partition of one bill's totals into per-participant shares.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SplitPlan {
    /// Bill this plan partitions.
    pub bill_id: String,

    /// The bill's `items_version` at derivation time.
    pub bill_items_version: i64,

    /// Strategy that produced the shares.
    pub strategy: SplitStrategy,

    /// Ordered shares; Σ amount_owed == bill total, exactly.
    pub shares: Vec<Share>,
}

impl SplitPlan {
    /// Derives an equal split across `participant_count` participants.
    ///
    /// Subtotal, tax and service fee are each allocated independently with
    /// unit weights, then summed per participant. Allocating the components
    /// separately keeps every share's tax portion reportable on its own,
    /// and the largest-remainder routine keeps each component - and hence
    /// the sum - exact.
    pub fn equal_split(bill: &Bill, participant_count: usize) -> BillResult<SplitPlan> {
        validation::validate_participant_count(participant_count)?;

        let weights = vec![1i64; participant_count];
        let subtotals = allocate(bill.subtotal(), &weights);
        let taxes = allocate(Money::from_cents(bill.tax_cents), &weights);
        let fees = allocate(Money::from_cents(bill.service_fee_cents), &weights);

        let shares = (0..participant_count)
            .map(|i| {
                Share::new(
                    &format!("participant-{}", i + 1),
                    Vec::new(),
                    subtotals[i] + taxes[i] + fees[i],
                    taxes[i],
                    fees[i],
                )
            })
            .collect();

        Ok(SplitPlan {
            bill_id: bill.id.clone(),
            bill_items_version: bill.items_version,
            strategy: SplitStrategy::Equal,
            shares,
        })
    }

    /// Derives a by-item split from an `item_id → participant_id` assignment.
    ///
    /// ## Errors
    /// [`BillError::UnassignedItem`] if any line item lacks an assignment.
    /// Fires before any share is built.
    ///
    /// ## Ordering
    /// Participants appear in the order their first assigned item appears
    /// on the bill, which also fixes who wins allocation tie-breaks.
    pub fn by_item_split(
        bill: &Bill,
        assignment: &[(String, String)],
    ) -> BillResult<SplitPlan> {
        // Participant order + their items, following bill item order.
        let mut participants: Vec<String> = Vec::new();
        let mut items_of: Vec<Vec<String>> = Vec::new();
        let mut weight_of: Vec<i64> = Vec::new();

        for item in &bill.items {
            let participant = assignment
                .iter()
                .find(|(item_id, _)| *item_id == item.id)
                .map(|(_, participant_id)| participant_id.clone())
                .ok_or_else(|| BillError::UnassignedItem {
                    item_id: item.id.clone(),
                })?;

            let index = match participants.iter().position(|p| *p == participant) {
                Some(index) => index,
                None => {
                    participants.push(participant);
                    items_of.push(Vec::new());
                    weight_of.push(0);
                    participants.len() - 1
                }
            };

            items_of[index].push(item.id.clone());
            weight_of[index] += item.subtotal_cents();
        }

        validation::validate_participant_count(participants.len())?;

        // Own subtotals are exact; only tax and fee need proration.
        let taxes = allocate(Money::from_cents(bill.tax_cents), &weight_of);
        let fees = allocate(Money::from_cents(bill.service_fee_cents), &weight_of);

        let shares = participants
            .iter()
            .enumerate()
            .map(|(i, participant_id)| {
                Share::new(
                    participant_id,
                    items_of[i].clone(),
                    Money::from_cents(weight_of[i]) + taxes[i] + fees[i],
                    taxes[i],
                    fees[i],
                )
            })
            .collect();

        Ok(SplitPlan {
            bill_id: bill.id.clone(),
            bill_items_version: bill.items_version,
            strategy: SplitStrategy::ByItem,
            shares,
        })
    }

    /// Builds a custom split from caller-specified amounts.
    ///
    /// ## Errors
    /// Every amount must be non-negative, and together they must sum to the
    /// bill total EXACTLY ([`BillError::AllocationMismatch`] otherwise). No
    /// internal rounding, no shares on failure.
    ///
    /// Tax/fee portions are prorated across the custom amounts for
    /// reporting; the amounts owed are exactly what the caller specified.
    pub fn custom_split(
        bill: &Bill,
        amounts: &[(String, Money)],
    ) -> BillResult<SplitPlan> {
        validation::validate_participant_count(amounts.len())?;
        for (_, amount) in amounts {
            validation::validate_share_amount(amount.cents())?;
        }

        let sum: i64 = amounts.iter().map(|(_, amount)| amount.cents()).sum();
        if sum != bill.total_cents {
            return Err(BillError::AllocationMismatch {
                expected: bill.total_cents,
                actual: sum,
            });
        }

        let weights: Vec<i64> = amounts.iter().map(|(_, amount)| amount.cents()).collect();
        let taxes = allocate(Money::from_cents(bill.tax_cents), &weights);
        let fees = allocate(Money::from_cents(bill.service_fee_cents), &weights);

        let shares = amounts
            .iter()
            .enumerate()
            .map(|(i, (participant_id, amount))| {
                Share::new(participant_id, Vec::new(), *amount, taxes[i], fees[i])
            })
            .collect();

        Ok(SplitPlan {
            bill_id: bill.id.clone(),
            bill_items_version: bill.items_version,
            strategy: SplitStrategy::Custom,
            shares,
        })
    }

    /// Checks the plan still matches the bill's item list.
    ///
    /// ## Errors
    /// [`BillError::StalePlan`] when items changed since derivation.
    /// Callers MUST run this before initiating any payment against a share.
    pub fn ensure_fresh(&self, bill: &Bill) -> BillResult<()> {
        if self.bill_items_version != bill.items_version {
            return Err(BillError::StalePlan {
                plan_version: self.bill_items_version,
                bill_version: bill.items_version,
            });
        }
        Ok(())
    }

    /// Finds a share by participant.
    pub fn share_for(&self, participant_id: &str) -> Option<&Share> {
        self.shares
            .iter()
            .find(|share| share.participant_id == participant_id)
    }

    /// Finds a share by participant, mutably.
    pub fn share_for_mut(&mut self, participant_id: &str) -> Option<&mut Share> {
        self.shares
            .iter_mut()
            .find(|share| share.participant_id == participant_id)
    }

    /// Sum of amounts owed across all shares, in cents.
    pub fn total_owed_cents(&self) -> i64 {
        self.shares.iter().map(|share| share.amount_owed_cents).sum()
    }

    /// True when every share is paid.
    pub fn is_settled(&self) -> bool {
        self.shares
            .iter()
            .all(|share| share.status == ShareStatus::Paid)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
