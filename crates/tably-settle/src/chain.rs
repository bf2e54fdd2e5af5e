//! # Blockchain Gateways
//!
//! Trait seams over the token contract and the settlement contract, plus
//! deterministic in-memory mocks for tests.
//!
//! ## Contract Surface
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   On-Chain Collaborators                                │
//! │                                                                         │
//! │  Token contract (ERC-20 style)                                         │
//! │  ├── allowance(owner, spender) → amount the spender may pull           │
//! │  └── approve(spender, amount)  → EXACT amount, never unlimited         │
//! │                                                                         │
//! │  Settlement contract                                                   │
//! │  ├── payBill(billId, amount, tip, businessAddr, tipAddr) → tx hash     │
//! │  └── finality observed via confirmation count on that hash             │
//! │                                                                         │
//! │  Amounts cross this boundary in minor units (cents); the gateway       │
//! │  implementation owns the conversion to token decimals.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// Transaction Reference
// =============================================================================

/// An on-chain transaction hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxRef(pub String);

impl TxRef {
    /// The raw hash string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Chain Error
// =============================================================================

/// Failures from a blockchain gateway call.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The payer declined the transaction in their wallet.
    #[error("transaction rejected by payer")]
    Rejected,

    /// The contract reverted the transaction.
    #[error("transaction reverted: {reason}")]
    Reverted { reason: String },

    /// The RPC endpoint failed or returned garbage.
    #[error("rpc error: {message}")]
    Rpc { message: String },

    /// The RPC endpoint did not answer in time.
    #[error("rpc timeout")]
    Timeout,
}

// =============================================================================
// Pay Bill Request
// =============================================================================

/// Payload for the settlement contract's `payBill` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayBillRequest {
    /// Bill being settled (or partially settled).
    pub bill_id: String,

    /// Amount against the bill total, in cents.
    pub amount_cents: i64,

    /// Tip routed to the tip address, in cents.
    pub tip_cents: i64,

    /// Venue's settlement address.
    pub business_address: String,

    /// Venue's tipping address.
    pub tip_address: String,
}

// =============================================================================
// Gateway Traits
// =============================================================================

/// Read/write access to the token contract.
#[async_trait]
pub trait TokenGateway: Send + Sync {
    /// Current allowance `owner` has granted `spender`.
    async fn allowance(&self, owner: &str, spender: &str) -> Result<i64, ChainError>;

    /// Requests approval for EXACTLY `amount_cents`. The payer's wallet may
    /// reject, surfacing [`ChainError::Rejected`].
    async fn approve(&self, owner: &str, spender: &str, amount_cents: i64)
        -> Result<TxRef, ChainError>;
}

/// Write access to the settlement contract plus finality observation.
#[async_trait]
pub trait SettlementGateway: Send + Sync {
    /// The settlement contract's address (the `spender` for approvals).
    fn contract_address(&self) -> &str;

    /// Submits the payment transaction. Returns the tx hash immediately;
    /// finality is observed separately through [`Self::confirmations`].
    async fn pay_bill(&self, payer: &str, request: &PayBillRequest) -> Result<TxRef, ChainError>;

    /// Confirmation count for a submitted transaction (0 = not yet mined).
    async fn confirmations(&self, tx: &TxRef) -> Result<u64, ChainError>;
}

// =============================================================================
// Mock Gateways (for tests and local development)
// =============================================================================

/// Deterministic in-memory chain, implementing both gateway traits.
///
/// Scriptable failure behavior lets tests exercise every saga path:
/// rejected approvals, failed submissions, delayed confirmations.
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use uuid::Uuid;

    /// An in-memory token + settlement contract pair.
    ///
    /// `approve` SETS the allowance (ERC-20 semantics); `pay_bill` consumes
    /// it. Confirmation counts are scripted per transaction.
    pub struct MockChain {
        contract: String,
        allowances: Mutex<HashMap<String, i64>>,
        confirmations: Mutex<HashMap<String, u64>>,
        /// Confirmations granted to a tx the moment it is submitted.
        auto_confirmations: u64,
        /// Next N `pay_bill` calls fail with an RPC error.
        submit_failures: AtomicU32,
        /// Next N `approve` calls are rejected by the payer.
        approval_rejections: AtomicU32,
        approve_calls: AtomicU32,
        pay_calls: AtomicU32,
    }

    impl MockChain {
        /// A chain whose submissions confirm instantly.
        pub fn new() -> Self {
            Self::with_auto_confirmations(u64::MAX)
        }

        /// A chain granting `auto` confirmations on submission. Use `0` to
        /// exercise the still-pending path, then script the count with
        /// [`MockChain::set_confirmations`].
        pub fn with_auto_confirmations(auto: u64) -> Self {
            MockChain {
                contract: "0x00000000000000000000000000000000C047AC75".to_string(),
                allowances: Mutex::new(HashMap::new()),
                confirmations: Mutex::new(HashMap::new()),
                auto_confirmations: auto,
                submit_failures: AtomicU32::new(0),
                approval_rejections: AtomicU32::new(0),
                approve_calls: AtomicU32::new(0),
                pay_calls: AtomicU32::new(0),
            }
        }

        /// Pre-seeds an allowance for a payer.
        pub fn seed_allowance(&self, owner: &str, amount_cents: i64) {
            self.allowances
                .lock()
                .expect("allowance mutex poisoned")
                .insert(owner.to_string(), amount_cents);
        }

        /// Makes the next `n` submissions fail with an RPC error.
        pub fn fail_next_submissions(&self, n: u32) {
            self.submit_failures.store(n, Ordering::SeqCst);
        }

        /// Makes the next `n` approvals come back payer-rejected.
        pub fn reject_next_approvals(&self, n: u32) {
            self.approval_rejections.store(n, Ordering::SeqCst);
        }

        /// Scripts the confirmation count of a submitted transaction.
        pub fn set_confirmations(&self, tx: &TxRef, count: u64) {
            self.confirmations
                .lock()
                .expect("confirmation mutex poisoned")
                .insert(tx.0.clone(), count);
        }

        /// How many approval transactions were issued.
        pub fn approve_call_count(&self) -> u32 {
            self.approve_calls.load(Ordering::SeqCst)
        }

        /// How many payment submissions were attempted.
        pub fn pay_call_count(&self) -> u32 {
            self.pay_calls.load(Ordering::SeqCst)
        }

        fn fresh_tx() -> TxRef {
            TxRef(format!("0x{}", Uuid::new_v4().simple()))
        }

        fn take_scripted_failure(counter: &AtomicU32) -> bool {
            counter
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    impl Default for MockChain {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl TokenGateway for MockChain {
        async fn allowance(&self, owner: &str, _spender: &str) -> Result<i64, ChainError> {
            Ok(*self
                .allowances
                .lock()
                .expect("allowance mutex poisoned")
                .get(owner)
                .unwrap_or(&0))
        }

        async fn approve(
            &self,
            owner: &str,
            _spender: &str,
            amount_cents: i64,
        ) -> Result<TxRef, ChainError> {
            if Self::take_scripted_failure(&self.approval_rejections) {
                return Err(ChainError::Rejected);
            }

            self.approve_calls.fetch_add(1, Ordering::SeqCst);
            self.allowances
                .lock()
                .expect("allowance mutex poisoned")
                .insert(owner.to_string(), amount_cents);
            Ok(Self::fresh_tx())
        }
    }

    #[async_trait]
    impl SettlementGateway for MockChain {
        fn contract_address(&self) -> &str {
            &self.contract
        }

        async fn pay_bill(
            &self,
            payer: &str,
            request: &PayBillRequest,
        ) -> Result<TxRef, ChainError> {
            self.pay_calls.fetch_add(1, Ordering::SeqCst);

            if Self::take_scripted_failure(&self.submit_failures) {
                return Err(ChainError::Rpc {
                    message: "connection reset".to_string(),
                });
            }

            let charge = request.amount_cents + request.tip_cents;
            let mut allowances = self.allowances.lock().expect("allowance mutex poisoned");
            let allowance = allowances.entry(payer.to_string()).or_insert(0);
            if *allowance < charge {
                return Err(ChainError::Reverted {
                    reason: "insufficient allowance".to_string(),
                });
            }
            *allowance -= charge;
            drop(allowances);

            let tx = Self::fresh_tx();
            self.confirmations
                .lock()
                .expect("confirmation mutex poisoned")
                .insert(tx.0.clone(), self.auto_confirmations);
            Ok(tx)
        }

        async fn confirmations(&self, tx: &TxRef) -> Result<u64, ChainError> {
            Ok(*self
                .confirmations
                .lock()
                .expect("confirmation mutex poisoned")
                .get(&tx.0)
                .unwrap_or(&0))
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::mock::MockChain;
    use super::*;

    fn request(amount: i64, tip: i64) -> PayBillRequest {
        PayBillRequest {
            bill_id: "bill-1".to_string(),
            amount_cents: amount,
            tip_cents: tip,
            business_address: "0x52908400098527886E0F7030069857D2E4169EE7".to_string(),
            tip_address: "0x8617E340B3D01FA5F11F306F4090FD50E238070D".to_string(),
        }
    }

    #[tokio::test]
    async fn test_approve_sets_allowance_exactly() {
        let chain = MockChain::new();
        let spender = chain.contract_address().to_string();

        assert_eq!(chain.allowance("0xpayer", &spender).await.unwrap(), 0);
        chain.approve("0xpayer", &spender, 4750).await.unwrap();
        assert_eq!(chain.allowance("0xpayer", &spender).await.unwrap(), 4750);
        assert_eq!(chain.approve_call_count(), 1);
    }

    #[tokio::test]
    async fn test_pay_bill_consumes_allowance() {
        let chain = MockChain::new();
        chain.seed_allowance("0xpayer", 5000);

        let tx = chain.pay_bill("0xpayer", &request(4250, 500)).await.unwrap();
        assert_eq!(
            chain.allowance("0xpayer", chain.contract_address()).await.unwrap(),
            250
        );
        assert!(chain.confirmations(&tx).await.unwrap() > 0);
    }

    #[tokio::test]
    async fn test_pay_bill_reverts_without_allowance() {
        let chain = MockChain::new();
        let err = chain.pay_bill("0xpayer", &request(100, 0)).await.unwrap_err();
        assert!(matches!(err, ChainError::Reverted { .. }));
    }

    #[tokio::test]
    async fn test_scripted_failures_are_consumed() {
        let chain = MockChain::new();
        chain.seed_allowance("0xpayer", 1000);
        chain.fail_next_submissions(1);

        assert!(chain.pay_bill("0xpayer", &request(100, 0)).await.is_err());
        assert!(chain.pay_bill("0xpayer", &request(100, 0)).await.is_ok());
    }

    #[tokio::test]
    async fn test_rejected_approval() {
        let chain = MockChain::new();
        chain.reject_next_approvals(1);

        let spender = chain.contract_address().to_string();
        let err = chain.approve("0xpayer", &spender, 100).await.unwrap_err();
        assert!(matches!(err, ChainError::Rejected));

        // The rejection did not count as an issued approval.
        assert_eq!(chain.approve_call_count(), 0);
    }
}
