//! Types module
//!
//! Contains core data structures used throughout the crate.
//! This module organizes types into logical submodules:
//! - `deposit`: Deposit records, statuses, currencies and chain matches
//! - `balance`: Per-user accounts and portfolio-history entries
//! - `outcome`: Result of a single verification attempt
//! - `error`: Error types for the settlement engine

pub mod balance;
pub mod deposit;
pub mod error;
pub mod outcome;

pub use balance::{PortfolioHistoryEntry, UserAccount};
pub use deposit::{
    ChainMatch, Currency, DepositRecord, DepositStatus, RecordId, RecordTransition, UserId,
};
pub use error::{OracleKind, SettlementError};
pub use outcome::VerificationOutcome;
