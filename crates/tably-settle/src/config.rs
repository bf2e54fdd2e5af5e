//! # Settlement Configuration
//!
//! Tunables for confirmation polling and reconciliation retries.
//!
//! ## What Is (and Isn't) Configurable
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Settlement Tunables                                    │
//! │                                                                         │
//! │  CONFIGURABLE                                                          │
//! │  ────────────                                                          │
//! │  • required_confirmations   - finality depth before Confirmed          │
//! │  • confirmation_poll        - how often to ask the network             │
//! │  • confirmation_timeout     - when to report "still pending" instead   │
//! │    of looping forever (the tx may yet confirm - never a failure)       │
//! │  • max_reconcile_retries    - OCC retry bound in the reconciler        │
//! │                                                                         │
//! │  DELIBERATELY NOT CONFIGURABLE                                         │
//! │  ─────────────────────────────                                         │
//! │  • No timeout on approval or submission - irreversible on-chain        │
//! │    steps are never raced against a clock                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

// =============================================================================
// Settle Config
// =============================================================================

/// Configuration for the settlement layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SettleConfig {
    /// Confirmations required before a payment counts as final.
    pub required_confirmations: u64,

    /// Milliseconds between confirmation polls.
    pub confirmation_poll_ms: u64,

    /// Milliseconds of polling before reporting still-pending.
    ///
    /// Past this threshold the saga REMAINS `AwaitingConfirmation`; the
    /// caller decides whether to keep waiting or surface a "check later"
    /// state. It is never converted into a failure.
    pub confirmation_timeout_ms: u64,

    /// How many times the reconciler retries on `ConcurrentModification`
    /// before surfacing it.
    pub max_reconcile_retries: u32,
}

impl Default for SettleConfig {
    fn default() -> Self {
        SettleConfig {
            required_confirmations: 1,
            confirmation_poll_ms: 1_000,
            confirmation_timeout_ms: 30_000,
            max_reconcile_retries: 5,
        }
    }
}

impl SettleConfig {
    /// Poll cadence as a Duration.
    pub fn confirmation_poll(&self) -> Duration {
        Duration::from_millis(self.confirmation_poll_ms)
    }

    /// Pending threshold as a Duration.
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SettleConfig::default();
        assert_eq!(config.required_confirmations, 1);
        assert_eq!(config.confirmation_poll(), Duration::from_millis(1_000));
        assert_eq!(config.confirmation_timeout(), Duration::from_millis(30_000));
        assert_eq!(config.max_reconcile_retries, 5);
    }

    #[test]
    fn test_serde_round_trip() {
        let config = SettleConfig {
            required_confirmations: 3,
            confirmation_poll_ms: 250,
            confirmation_timeout_ms: 5_000,
            max_reconcile_retries: 2,
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: SettleConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.required_confirmations, 3);
        assert_eq!(back.confirmation_poll_ms, 250);
    }
}
