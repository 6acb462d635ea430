//! Deposit Settlement Engine Library
//! # Overview
//!
//! This library settles pending crypto deposits exactly once: a pending
//! record is checked against a chain oracle, and the first matching
//! transfer completes it and credits the user's balance a single time, no
//! matter how many callers race on the same record.
//!
//! # Architecture
//!
//! - [`types`] - Core data types (DepositRecord, UserAccount, errors, etc.)
//! - [`core`] - Settlement logic:
//!   - [`core::engine`] - The `verify_once` state machine
//!   - [`core::ledger_store`] - Deposit records with compare-and-set transitions
//!   - [`core::balance_ledger`] - Per-user balances and portfolio history
//!   - [`core::traits`] - Collaborator seams (chain, store, ledger, prices, clock)
//! - [`oracle`] - In-memory chain oracle over observed transfers
//! - [`service`] - Callers of the engine (transport adapter, poller,
//!   reconciler, batch run)
//! - [`io`] - CSV input and report output
//! - [`cli`] - CLI arguments parsing and log setup
//!
//! # Record Lifecycle
//!
//! - **pending**: awaiting a matching transfer
//! - **completed**: a transfer of at least the requested amount arrived;
//!   amount, tx hash and completion time are recorded and the user credited
//! - **failed**: the record stayed pending past the 30 minute window
//!
//! Both terminal states are final: later calls report them without touching
//! the oracle or the balances.

pub mod cli;
pub mod core;
pub mod io;
pub mod oracle;
pub mod service;
pub mod types;

pub use core::{InMemoryBalanceLedger, InMemoryLedgerStore, SettlementConfig, SettlementEngine};
pub use service::{SettlementRun, StatusResponse};
pub use types::{
    Currency, DepositRecord, DepositStatus, RecordId, SettlementError, UserAccount, UserId,
    VerificationOutcome,
};
