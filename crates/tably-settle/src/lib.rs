//! # Tably Settle
//!
//! The async settlement layer over `tably-core`: bill storage with
//! optimistic concurrency, the reconciliation facade every payment flows
//! through, and the resumable saga that drives on-chain settlements.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   Settlement Layer                                      │
//! │                                                                         │
//! │   SagaDriver ───────────────┐                                           │
//! │   (crypto payments,         │                                           │
//! │    chain gateways)          ▼                                           │
//! │                        Reconciler  ◄── cash / card / share payments    │
//! │                             │                                           │
//! │                             ▼                                           │
//! │                       LedgerBackend (OCC gate)                          │
//! │                             │                                           │
//! │                             ▼                                           │
//! │                     tably-core (pure domain rules)                      │
//! │                                                                         │
//! │  Everything that touches the network or the clock lives HERE;          │
//! │  tably-core stays synchronous and deterministic.                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod chain;
pub mod config;
pub mod error;
pub mod facade;
pub mod ledger;
pub mod saga;

pub use chain::{ChainError, PayBillRequest, SettlementGateway, TokenGateway, TxRef};
pub use config::SettleConfig;
pub use error::{SettleError, SettleResult};
pub use facade::{PaymentRequest, Reconciler};
pub use ledger::{InMemoryLedger, LedgerBackend};
pub use saga::{SagaDriver, SagaStep, SettlementSaga};
