//! Core settlement logic module
//!
//! This module contains the settlement components:
//! - `traits` - Collaborator abstractions (chain oracle, stores, pricing, clock)
//! - `engine` - The verification and settlement state machine
//! - `config` - Engine configuration and the expiry policy
//! - `ledger_store` - In-memory deposit record store with compare-and-set
//! - `balance_ledger` - In-memory per-user balances and portfolio history
//! - `pricing` - Fixed-table USD price source
//! - `clock` - System and manual clocks

pub mod balance_ledger;
pub mod clock;
pub mod config;
pub mod engine;
pub mod ledger_store;
pub mod pricing;
pub mod traits;

pub use balance_ledger::InMemoryBalanceLedger;
pub use clock::{ManualClock, SystemClock};
pub use config::{ExpiryPolicy, SettlementConfig};
pub use engine::SettlementEngine;
pub use ledger_store::InMemoryLedgerStore;
pub use pricing::FixedPriceSource;
pub use traits::{BalanceLedger, ChainLookup, Clock, LedgerStore, PriceSource};
