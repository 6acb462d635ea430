//! Deposit-related types for the settlement engine
//!
//! This module defines the deposit record tracked by the ledger store, its
//! lifecycle status, the supported currencies, and the ephemeral chain match
//! returned by the chain lookup oracle.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Deposit record identifier
///
/// Opaque to the engine; assigned by the upstream deposit-request flow.
pub type RecordId = String;

/// Identifier of the user owning a deposit record
pub type UserId = String;

/// Currencies accepted for deposits
///
/// Matching against the chain is exact on the currency code; there is no
/// cross-currency or partial matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Bitcoin
    Btc,
    /// Tether (USD-pegged stable coin)
    Usdt,
}

impl Currency {
    /// Upper-case currency code as used on the wire and in CSV files
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Btc => "BTC",
            Currency::Usdt => "USDT",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = String;

    /// Parse a currency code. Codes are case-sensitive: only `BTC` and `USDT`
    /// are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BTC" => Ok(Currency::Btc),
            "USDT" => Ok(Currency::Usdt),
            other => Err(format!("Unsupported currency '{}'", other)),
        }
    }
}

/// Lifecycle status of a deposit record
///
/// ```text
/// pending ──► completed   (terminal)
///    │
///    └─────► failed      (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepositStatus {
    /// Waiting for a matching payment on chain
    Pending,
    /// Payment found, record settled and balance credit requested
    Completed,
    /// Expired without a matching payment
    Failed,
}

impl DepositStatus {
    /// Whether no further transition is permitted from this status
    pub fn is_terminal(&self) -> bool {
        matches!(self, DepositStatus::Completed | DepositStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DepositStatus::Pending => "pending",
            DepositStatus::Completed => "completed",
            DepositStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for DepositStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DepositStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(DepositStatus::Pending),
            "completed" => Ok(DepositStatus::Completed),
            "failed" => Ok(DepositStatus::Failed),
            other => Err(format!("Invalid deposit status '{}'", other)),
        }
    }
}

/// One expected inbound payment and its resolution state
///
/// `amount`, `tx_hash` and `completed_at` are set if and only if `status` is
/// [`DepositStatus::Completed`]. Use [`DepositRecord::check_invariants`] when
/// loading records from an untrusted source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositRecord {
    /// Unique record identifier
    pub id: RecordId,

    /// The user whose balance is credited when this deposit settles
    pub user: UserId,

    /// Deposit address to watch
    pub address: String,

    /// Currency the payment is expected in
    pub currency: Currency,

    /// Current lifecycle status
    pub status: DepositStatus,

    /// Amount requested by the upstream deposit flow, if known
    ///
    /// Scheduled polling passes this as the oracle's inclusive lower bound.
    pub expected_amount: Option<Decimal>,

    /// Settled amount, copied from the chain match
    pub amount: Option<Decimal>,

    /// Chain transaction identifier, copied from the chain match
    pub tx_hash: Option<String>,

    /// Creation timestamp
    pub initiated_at: DateTime<Utc>,

    /// Settlement timestamp, taken from the chain match
    pub completed_at: Option<DateTime<Utc>>,
}

impl DepositRecord {
    /// Create a new pending record
    pub fn pending(
        id: impl Into<RecordId>,
        user: impl Into<UserId>,
        address: impl Into<String>,
        currency: Currency,
        initiated_at: DateTime<Utc>,
    ) -> Self {
        DepositRecord {
            id: id.into(),
            user: user.into(),
            address: address.into(),
            currency,
            status: DepositStatus::Pending,
            expected_amount: None,
            amount: None,
            tx_hash: None,
            initiated_at,
            completed_at: None,
        }
    }

    /// Builder-style setter for the requested amount
    pub fn with_expected_amount(mut self, amount: Decimal) -> Self {
        self.expected_amount = Some(amount);
        self
    }

    /// Verify the settlement fields agree with the status
    ///
    /// # Returns
    ///
    /// * `Ok(())` if the record is consistent
    /// * `Err(String)` describing the first inconsistency found
    pub fn check_invariants(&self) -> Result<(), String> {
        let settled = self.status == DepositStatus::Completed;
        let fields = [
            ("amount", self.amount.is_some()),
            ("tx_hash", self.tx_hash.is_some()),
            ("completed_at", self.completed_at.is_some()),
        ];

        for (name, present) in fields {
            if present != settled {
                return Err(format!(
                    "record {}: {} must be {} when status is {}",
                    self.id,
                    name,
                    if settled { "set" } else { "unset" },
                    self.status
                ));
            }
        }

        if let Some(amount) = self.amount {
            if amount <= Decimal::ZERO {
                return Err(format!("record {}: settled amount must be positive", self.id));
            }
        }

        Ok(())
    }
}

/// Inbound transaction reported by the chain lookup oracle
///
/// Never persisted on its own; its fields are copied into the deposit record
/// when the record settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainMatch {
    pub tx_hash: String,
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// A state change requested through the store's compare-and-set
#[derive(Debug, Clone, PartialEq)]
pub enum RecordTransition {
    /// `pending -> completed`, stamping the settlement fields
    Settle {
        amount: Decimal,
        tx_hash: String,
        completed_at: DateTime<Utc>,
    },
    /// `pending -> failed` after the expiry window elapsed
    Expire,
}

impl RecordTransition {
    /// Settlement transition carrying the fields of a chain match
    pub fn settle(chain_match: &ChainMatch) -> Self {
        RecordTransition::Settle {
            amount: chain_match.amount,
            tx_hash: chain_match.tx_hash.clone(),
            completed_at: chain_match.timestamp,
        }
    }

    /// The status a record has after this transition
    pub fn target_status(&self) -> DepositStatus {
        match self {
            RecordTransition::Settle { .. } => DepositStatus::Completed,
            RecordTransition::Expire => DepositStatus::Failed,
        }
    }

    /// Apply the transition to a record in place
    pub fn apply(self, record: &mut DepositRecord) {
        record.status = self.target_status();
        if let RecordTransition::Settle {
            amount,
            tx_hash,
            completed_at,
        } = self
        {
            record.amount = Some(amount);
            record.tx_hash = Some(tx_hash);
            record.completed_at = Some(completed_at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn record() -> DepositRecord {
        DepositRecord::pending(
            "r1",
            "u1",
            "addr1",
            Currency::Btc,
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        )
    }

    #[rstest]
    #[case("BTC", Ok(Currency::Btc))]
    #[case("USDT", Ok(Currency::Usdt))]
    #[case("btc", Err(()))]
    #[case("ETH", Err(()))]
    #[case("", Err(()))]
    fn test_currency_parsing(#[case] input: &str, #[case] expected: Result<Currency, ()>) {
        assert_eq!(input.parse::<Currency>().map_err(|_| ()), expected);
    }

    #[rstest]
    #[case(DepositStatus::Pending, false)]
    #[case(DepositStatus::Completed, true)]
    #[case(DepositStatus::Failed, true)]
    fn test_terminal_statuses(#[case] status: DepositStatus, #[case] terminal: bool) {
        assert_eq!(status.is_terminal(), terminal);
    }

    #[test]
    fn test_pending_record_satisfies_invariants() {
        assert!(record().check_invariants().is_ok());
    }

    #[test]
    fn test_settle_transition_stamps_fields() {
        let mut record = record();
        let timestamp = Utc.with_ymd_and_hms(2024, 1, 1, 12, 5, 0).unwrap();
        let chain_match = ChainMatch {
            tx_hash: "0xabc".to_string(),
            amount: Decimal::new(1, 2),
            timestamp,
        };

        RecordTransition::settle(&chain_match).apply(&mut record);

        assert_eq!(record.status, DepositStatus::Completed);
        assert_eq!(record.amount, Some(Decimal::new(1, 2)));
        assert_eq!(record.tx_hash.as_deref(), Some("0xabc"));
        assert_eq!(record.completed_at, Some(timestamp));
        assert!(record.check_invariants().is_ok());
    }

    #[test]
    fn test_expire_transition_leaves_settlement_fields_unset() {
        let mut record = record();
        RecordTransition::Expire.apply(&mut record);

        assert_eq!(record.status, DepositStatus::Failed);
        assert!(record.amount.is_none());
        assert!(record.tx_hash.is_none());
        assert!(record.check_invariants().is_ok());
    }

    #[test]
    fn test_completed_record_without_hash_is_inconsistent() {
        let mut record = record();
        record.status = DepositStatus::Completed;
        record.amount = Some(Decimal::ONE);
        record.completed_at = Some(record.initiated_at);

        let err = record.check_invariants().unwrap_err();
        assert!(err.contains("tx_hash must be set"));
    }

    #[test]
    fn test_failed_record_with_amount_is_inconsistent() {
        let mut record = record();
        record.status = DepositStatus::Failed;
        record.amount = Some(Decimal::ONE);

        assert!(record.check_invariants().is_err());
    }
}
