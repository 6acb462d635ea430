//! Collaborator traits for the settlement engine
//!
//! The engine never talks to a database, a chain node or a price feed
//! directly. Each of these is a trait object injected at construction, so
//! production adapters and the in-memory implementations in this crate are
//! interchangeable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::types::{
    ChainMatch, Currency, DepositRecord, DepositStatus, PortfolioHistoryEntry, RecordTransition,
    SettlementError,
};

/// Source of on-chain facts
///
/// Eventually consistent: the same query may return `None` now and a match
/// later. Read-only from the engine's point of view, so calls for different
/// records need no coordination.
#[async_trait]
pub trait ChainLookup: Send + Sync {
    /// Find an inbound transaction to `address` in `currency` of at least
    /// `min_amount` (inclusive)
    ///
    /// # Returns
    ///
    /// * `Ok(Some(ChainMatch))` - A matching transaction was observed
    /// * `Ok(None)` - Nothing matches yet
    /// * `Err(SettlementError::OracleUnavailable)` - Transport failure
    async fn find_incoming(
        &self,
        address: &str,
        min_amount: Decimal,
        currency: Currency,
    ) -> Result<Option<ChainMatch>, SettlementError>;
}

/// Persistent store of deposit records
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Load a record by id
    ///
    /// Fails with `SettlementError::NotFound` if it does not exist.
    async fn find(&self, id: &str) -> Result<DepositRecord, SettlementError>;

    /// Atomically apply `transition` if the record's status is still `expected`
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The transition was applied
    /// * `Ok(false)` - The stored status differed; nothing was written
    /// * `Err(SettlementError::NotFound)` - No such record
    async fn compare_and_set(
        &self,
        id: &str,
        expected: DepositStatus,
        transition: RecordTransition,
    ) -> Result<bool, SettlementError>;

    /// All records currently in `status`, ordered by id
    async fn list_by_status(
        &self,
        status: DepositStatus,
    ) -> Result<Vec<DepositRecord>, SettlementError>;
}

/// Persistent per-user balances and portfolio history
#[async_trait]
pub trait BalanceLedger: Send + Sync {
    /// Increment `user`'s `currency` balance by `amount` and append `entry`
    /// as one atomic operation
    ///
    /// Implementations must never leave one half applied without the other.
    async fn credit_and_log(
        &self,
        user: &str,
        currency: Currency,
        amount: Decimal,
        entry: PortfolioHistoryEntry,
    ) -> Result<(), SettlementError>;

    /// Whether a credit caused by `record_id` has been logged for `user`
    async fn has_credit(&self, user: &str, record_id: &str) -> Result<bool, SettlementError>;
}

/// USD pricing for portfolio valuation
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// USD price of one unit of `currency`
    async fn usd_price(&self, currency: Currency) -> Result<Decimal, SettlementError>;
}

/// Wall clock
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
