//! Error types for the settlement engine
//!
//! This module defines every error that can occur while verifying and settling
//! deposit records, plus the I/O errors of the CSV front end.
//!
//! # Error Categories
//!
//! - **Lookup Errors**: the record does not exist
//! - **Transient Collaborator Errors**: chain oracle, price oracle or store
//!   unreachable or timed out; persisted state is untouched
//! - **Credit Errors**: the record settled but the balance credit was not
//!   applied; these need out-of-band reconciliation
//! - **Input Errors**: malformed CSV rows, impossible record states

use rust_decimal::Decimal;
use thiserror::Error;

/// Which external oracle failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleKind {
    /// The chain lookup collaborator
    Chain,
    /// The USD price collaborator
    Price,
}

impl std::fmt::Display for OracleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OracleKind::Chain => f.write_str("chain"),
            OracleKind::Price => f.write_str("price"),
        }
    }
}

/// Main error type for the settlement engine
///
/// Each variant carries enough context to log it and to decide whether the
/// caller should retry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettlementError {
    /// Deposit record does not exist
    ///
    /// Not retried by the engine.
    #[error("Deposit record {id} not found")]
    NotFound {
        /// The record identifier that was looked up
        id: String,
    },

    /// An oracle could not be reached or did not answer in time
    ///
    /// Transient. The record is left unchanged in `pending`.
    #[error("{oracle} oracle unavailable: {message}")]
    OracleUnavailable {
        /// Which oracle failed
        oracle: OracleKind,
        /// Description of the failure
        message: String,
    },

    /// The ledger store or balance ledger could not be reached in time
    ///
    /// Transient. No state change was published.
    #[error("Store unavailable during {operation}: {message}")]
    StoreUnavailable {
        /// Store operation that failed
        operation: String,
        /// Description of the failure
        message: String,
    },

    /// The record is completed but its balance credit was not applied
    ///
    /// Not retried by `verify_once`; the reconciler repairs it.
    #[error("Credit of {amount} {currency} for record {id} (user {user}) failed: {reason}")]
    CreditFailed {
        /// The completed record
        id: String,
        /// The user who should have been credited
        user: String,
        /// Currency code of the credit
        currency: String,
        /// Amount that was not credited
        amount: Decimal,
        /// Why the credit failed
        reason: String,
    },

    /// The balance ledger already holds a credit for this record
    #[error("Record {id} has already been credited")]
    DuplicateCredit {
        /// The record identifier
        id: String,
    },

    /// A checked balance addition overflowed
    #[error("Arithmetic overflow crediting {currency} for user {user}")]
    ArithmeticOverflow {
        /// User whose balance would overflow
        user: String,
        /// Currency code of the balance
        currency: String,
    },

    /// A record is malformed or in an impossible state
    #[error("Invalid record{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    InvalidRecord {
        /// Line number of the offending CSV row (if available)
        line: Option<u64>,
        /// Description of the problem
        message: String,
    },

    /// I/O error occurred while reading or writing files
    #[error("I/O error: {message}")]
    IoError {
        /// Description of the I/O error
        message: String,
    },

    /// CSV parsing error occurred
    #[error("CSV parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    ParseError {
        /// Line number where the error occurred (if available)
        line: Option<u64>,
        /// Description of the parsing error
        message: String,
    },
}

impl From<std::io::Error> for SettlementError {
    fn from(error: std::io::Error) -> Self {
        SettlementError::IoError {
            message: error.to_string(),
        }
    }
}

impl From<csv::Error> for SettlementError {
    fn from(error: csv::Error) -> Self {
        let line = error.position().map(|pos| pos.line());

        SettlementError::ParseError {
            line,
            message: error.to_string(),
        }
    }
}

// Helper functions for creating common errors

impl SettlementError {
    /// Create a NotFound error
    pub fn not_found(id: &str) -> Self {
        SettlementError::NotFound { id: id.to_string() }
    }

    /// Create an OracleUnavailable error for the chain oracle
    pub fn chain_unavailable(message: impl Into<String>) -> Self {
        SettlementError::OracleUnavailable {
            oracle: OracleKind::Chain,
            message: message.into(),
        }
    }

    /// Create an OracleUnavailable error for the price oracle
    pub fn price_unavailable(message: impl Into<String>) -> Self {
        SettlementError::OracleUnavailable {
            oracle: OracleKind::Price,
            message: message.into(),
        }
    }

    /// Create a StoreUnavailable error
    pub fn store_unavailable(operation: &str, message: impl Into<String>) -> Self {
        SettlementError::StoreUnavailable {
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    /// Create a CreditFailed error
    pub fn credit_failed(
        id: &str,
        user: &str,
        currency: &str,
        amount: Decimal,
        reason: impl Into<String>,
    ) -> Self {
        SettlementError::CreditFailed {
            id: id.to_string(),
            user: user.to_string(),
            currency: currency.to_string(),
            amount,
            reason: reason.into(),
        }
    }

    /// Create a DuplicateCredit error
    pub fn duplicate_credit(id: &str) -> Self {
        SettlementError::DuplicateCredit { id: id.to_string() }
    }

    /// Create an ArithmeticOverflow error
    pub fn arithmetic_overflow(user: &str, currency: &str) -> Self {
        SettlementError::ArithmeticOverflow {
            user: user.to_string(),
            currency: currency.to_string(),
        }
    }

    /// Create an InvalidRecord error
    pub fn invalid_record(line: Option<u64>, message: impl Into<String>) -> Self {
        SettlementError::InvalidRecord {
            line,
            message: message.into(),
        }
    }

    /// Whether a later retry of the same call may succeed without outside help
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SettlementError::OracleUnavailable { .. } | SettlementError::StoreUnavailable { .. }
        )
    }
}
