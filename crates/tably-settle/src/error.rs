//! # Settlement Error Types
//!
//! Errors for the async settlement layer.
//!
//! ## Propagation Policy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Error Propagation                                   │
//! │                                                                         │
//! │  Validation / state errors (tably-core)                                │
//! │  └── Recoverable locally; BLOCK payment initiation                     │
//! │                                                                         │
//! │  ConcurrentModification                                                │
//! │  └── Retried automatically up to a bounded count, then surfaced;       │
//! │      the caller retries the WHOLE operation, not just the write        │
//! │                                                                         │
//! │  UserRejected                                                          │
//! │  └── Saga aborted cleanly, no automatic retry                          │
//! │                                                                         │
//! │  Chain failures after submission                                       │
//! │  └── Never silently retried from scratch; only the post-confirmation   │
//! │      ledger notification retries indefinitely                          │
//! │                                                                         │
//! │  Confirmation timeout                                                  │
//! │  └── NOT an error - the saga stays AwaitingConfirmation                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::chain::ChainError;
use tably_core::BillError;

// =============================================================================
// Settle Error
// =============================================================================

/// Errors from the settlement layer.
#[derive(Debug, Error)]
pub enum SettleError {
    /// A core domain rule rejected the operation.
    #[error(transparent)]
    Core(#[from] BillError),

    /// The requested bill does not exist in the ledger.
    #[error("Bill not found: {bill_id}")]
    BillNotFound { bill_id: String },

    /// Another writer advanced the bill's version first.
    ///
    /// ## When This Occurs
    /// Two participants confirming payments at the same moment. The caller
    /// must reload the bill and retry the whole operation; the reconciler
    /// does this automatically up to its configured bound.
    #[error("Bill {bill_id} was modified concurrently")]
    ConcurrentModification { bill_id: String },

    /// The payer declined the approval transaction in their wallet.
    ///
    /// The saga is discarded cleanly - no side effects exist to unwind,
    /// and no automatic retry is offered.
    #[error("Payer rejected the approval transaction")]
    UserRejected,

    /// The saga cannot be cancelled at its current step.
    ///
    /// Once a transaction has been submitted, the saga must resolve to
    /// Confirmed or Failed on its own.
    #[error("Saga cannot be cancelled while {step}")]
    NotCancellable { step: String },

    /// The saga is not in a resumable state.
    #[error("Saga cannot be resumed: {reason}")]
    NotResumable { reason: String },

    /// The split plan has no share for this participant.
    #[error("No share for participant {participant_id}")]
    UnknownParticipant { participant_id: String },

    /// A blockchain gateway call failed.
    #[error(transparent)]
    Chain(#[from] ChainError),
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with SettleError.
pub type SettleResult<T> = Result<T, SettleError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_convert() {
        let core = BillError::BillClosed {
            bill_id: "b-1".to_string(),
        };
        let settle: SettleError = core.into();
        assert!(matches!(settle, SettleError::Core(_)));
        assert_eq!(settle.to_string(), "Bill b-1 is closed");
    }

    #[test]
    fn test_chain_errors_convert() {
        let chain = ChainError::Reverted {
            reason: "insufficient allowance".to_string(),
        };
        let settle: SettleError = chain.into();
        assert!(matches!(settle, SettleError::Chain(_)));
    }
}
