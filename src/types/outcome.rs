//! Caller-facing result of one verification attempt

use super::deposit::{DepositRecord, DepositStatus};
use std::fmt;

/// Outcome of `SettlementEngine::verify_once`
///
/// Errors are reported separately through `SettlementError`; an outcome is
/// always a faithful reading of the record's state after the attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// The record is completed with this chain transaction
    Confirmed { tx_hash: String },
    /// No matching payment yet; the caller should retry later
    Pending,
    /// The record expired without a payment
    Failed,
}

impl VerificationOutcome {
    /// Whether polling may stop
    pub fn is_terminal(&self) -> bool {
        !matches!(self, VerificationOutcome::Pending)
    }

    /// Read the outcome off a stored record
    ///
    /// A completed record whose hash is missing cannot be reported as
    /// confirmed; callers validate records with `check_invariants` first.
    pub fn from_record(record: &DepositRecord) -> Option<Self> {
        match record.status {
            DepositStatus::Completed => record
                .tx_hash
                .clone()
                .map(|tx_hash| VerificationOutcome::Confirmed { tx_hash }),
            DepositStatus::Failed => Some(VerificationOutcome::Failed),
            DepositStatus::Pending => Some(VerificationOutcome::Pending),
        }
    }
}

impl fmt::Display for VerificationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationOutcome::Confirmed { tx_hash } => write!(f, "confirmed ({})", tx_hash),
            VerificationOutcome::Pending => f.write_str("pending"),
            VerificationOutcome::Failed => f.write_str("failed"),
        }
    }
}
