//! Deposit verification and settlement
//!
//! This module provides `SettlementEngine`, which runs one verification
//! attempt for one deposit record: the state machine, the expiry policy and
//! the exactly-once credit protocol.
//!
//! # Architecture
//!
//! ```text
//! SettlementEngine
//!     ├── Arc<dyn LedgerStore>    (deposit records, compare-and-set)
//!     ├── Arc<dyn ChainLookup>    (on-chain payment oracle)
//!     ├── Arc<dyn BalanceLedger>  (balances + portfolio history)
//!     ├── Arc<dyn PriceSource>    (USD valuation of credits)
//!     ├── Arc<dyn Clock>
//!     └── SettlementConfig        (expiry window, call timeouts)
//! ```
//!
//! # Exactly-once credit
//!
//! The only publication points are the two compare-and-sets guarded on the
//! record still being `pending`: one for expiry, one for settlement. Only the
//! caller that wins the settlement compare-and-set reaches the balance ledger.
//! Losers re-read the record and report its current state. A credit failure
//! after the record is completed is reported as `CreditFailed` and left to the
//! reconciler; `verify_once` never retries it.
//!
//! # Thread Safety
//!
//! The engine holds no locks between calls and is cheap to clone. Any number
//! of tasks may call `verify_once` for the same record concurrently.

use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::config::{ExpiryPolicy, SettlementConfig};
use super::traits::{BalanceLedger, ChainLookup, Clock, LedgerStore, PriceSource};
use crate::types::{
    ChainMatch, Currency, DepositRecord, DepositStatus, PortfolioHistoryEntry, RecordTransition,
    SettlementError, VerificationOutcome,
};

/// Deposit settlement orchestrator
#[derive(Clone)]
pub struct SettlementEngine {
    store: Arc<dyn LedgerStore>,
    chain: Arc<dyn ChainLookup>,
    ledger: Arc<dyn BalanceLedger>,
    prices: Arc<dyn PriceSource>,
    clock: Arc<dyn Clock>,
    config: SettlementConfig,
    expiry: ExpiryPolicy,
}

impl SettlementEngine {
    /// Create a new SettlementEngine from its collaborators
    pub fn new(
        store: Arc<dyn LedgerStore>,
        chain: Arc<dyn ChainLookup>,
        ledger: Arc<dyn BalanceLedger>,
        prices: Arc<dyn PriceSource>,
        clock: Arc<dyn Clock>,
        config: SettlementConfig,
    ) -> Self {
        let expiry = config.expiry_policy();
        Self {
            store,
            chain,
            ledger,
            prices,
            clock,
            config,
            expiry,
        }
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Run one verification attempt for record `id`
    ///
    /// This method:
    /// 1. Loads the record
    /// 2. Returns immediately for terminal records
    /// 3. Fails records older than the expiry window (before asking the oracle)
    /// 4. Asks the chain oracle for a payment of at least `min_amount`
    /// 5. Settles the record through a compare-and-set on `pending`
    /// 6. Credits the owner's balance if, and only if, this call won step 5
    ///
    /// # Arguments
    ///
    /// * `id` - The deposit record to verify
    /// * `expected_currency` - Currency the caller expects the payment in
    /// * `min_amount` - Inclusive lower bound on the payment amount
    ///
    /// # Returns
    ///
    /// * `Ok(VerificationOutcome)` - The record's state after this attempt
    /// * `Err(SettlementError::NotFound)` - No such record
    /// * `Err(SettlementError::OracleUnavailable)` - Oracle failed; record untouched
    /// * `Err(SettlementError::StoreUnavailable)` - Store failed; record untouched
    /// * `Err(SettlementError::CreditFailed)` - Record completed, credit not applied
    pub async fn verify_once(
        &self,
        id: &str,
        expected_currency: Currency,
        min_amount: Decimal,
    ) -> Result<VerificationOutcome, SettlementError> {
        let record = self.load(id).await?;

        match record.status {
            DepositStatus::Completed | DepositStatus::Failed => return report(&record),
            DepositStatus::Pending => {}
        }

        let now = self.clock.now();
        if self.expiry.is_expired(record.initiated_at, now) {
            return self.expire(&record).await;
        }

        if record.currency != expected_currency {
            // Exact currency match only: this record can never be paid in
            // `expected_currency`, so it stays pending until it expires.
            warn!(
                record = %record.id,
                stored = %record.currency,
                requested = %expected_currency,
                "Currency mismatch, not querying chain"
            );
            return Ok(VerificationOutcome::Pending);
        }

        let Some(chain_match) = self.lookup(&record, min_amount).await? else {
            debug!(
                record = %record.id,
                address = %record.address,
                "No matching chain transaction yet"
            );
            return Ok(VerificationOutcome::Pending);
        };

        self.settle(&record, chain_match).await
    }

    /// Transition an expired record to `failed`
    async fn expire(&self, record: &DepositRecord) -> Result<VerificationOutcome, SettlementError> {
        let applied = self
            .compare_and_set(&record.id, RecordTransition::Expire)
            .await?;

        if applied {
            info!(
                record = %record.id,
                initiated_at = %record.initiated_at,
                deadline = %self.expiry.deadline(record.initiated_at),
                "Deposit expired"
            );
            return Ok(VerificationOutcome::Failed);
        }

        self.reread_after_lost_race(&record.id).await
    }

    /// Ask the chain oracle for a matching payment, bounded by the oracle timeout
    async fn lookup(
        &self,
        record: &DepositRecord,
        min_amount: Decimal,
    ) -> Result<Option<ChainMatch>, SettlementError> {
        let result = bounded(
            self.config.oracle_timeout,
            self.chain
                .find_incoming(&record.address, min_amount, record.currency),
            || SettlementError::chain_unavailable(timeout_message(self.config.oracle_timeout)),
        )
        .await;

        if let Err(e) = &result {
            warn!(record = %record.id, error = %e, "Chain lookup failed, record left pending");
        }
        result
    }

    /// Publish a chain match and credit the owner
    async fn settle(
        &self,
        record: &DepositRecord,
        chain_match: ChainMatch,
    ) -> Result<VerificationOutcome, SettlementError> {
        let applied = self
            .compare_and_set(&record.id, RecordTransition::settle(&chain_match))
            .await?;

        if !applied {
            debug!(record = %record.id, "Lost settlement race, reporting stored state");
            return self.reread_after_lost_race(&record.id).await;
        }

        info!(
            record = %record.id,
            user = %record.user,
            currency = %record.currency,
            amount = %chain_match.amount,
            tx_hash = %chain_match.tx_hash,
            "Deposit settled"
        );

        self.credit(record, &chain_match).await?;

        Ok(VerificationOutcome::Confirmed {
            tx_hash: chain_match.tx_hash,
        })
    }

    /// Value and apply the balance credit for a record this call just settled
    ///
    /// Runs after the record is published, so every failure here, including
    /// a missing price quote, leaves a completed record for the reconciler.
    async fn credit(
        &self,
        record: &DepositRecord,
        chain_match: &ChainMatch,
    ) -> Result<(), SettlementError> {
        let credit_failed = |reason: String| {
            let failure = SettlementError::credit_failed(
                &record.id,
                &record.user,
                record.currency.code(),
                chain_match.amount,
                reason,
            );
            error!(error = %failure, "Credit needs reconciliation");
            failure
        };

        let usd_price = bounded(
            self.config.oracle_timeout,
            self.prices.usd_price(record.currency),
            || SettlementError::price_unavailable(timeout_message(self.config.oracle_timeout)),
        )
        .await
        .map_err(|e| credit_failed(e.to_string()))?;

        let entry = PortfolioHistoryEntry::for_credit(
            &record.id,
            record.currency,
            chain_match.amount,
            usd_price,
            self.clock.now(),
        )
        .ok_or_else(|| credit_failed("portfolio valuation overflowed".to_string()))?;

        let result = bounded(
            self.config.ledger_timeout,
            self.ledger.credit_and_log(
                &record.user,
                record.currency,
                chain_match.amount,
                entry,
            ),
            || {
                SettlementError::store_unavailable(
                    "credit_and_log",
                    timeout_message(self.config.ledger_timeout),
                )
            },
        )
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(SettlementError::DuplicateCredit { .. }) => {
                // The reconciler got there first; the balance is already right.
                warn!(record = %record.id, "Credit already present in ledger");
                Ok(())
            }
            Err(e) => Err(credit_failed(e.to_string())),
        }
    }

    async fn load(&self, id: &str) -> Result<DepositRecord, SettlementError> {
        bounded(self.config.store_timeout, self.store.find(id), || {
            SettlementError::store_unavailable("find", timeout_message(self.config.store_timeout))
        })
        .await
    }

    async fn compare_and_set(
        &self,
        id: &str,
        transition: RecordTransition,
    ) -> Result<bool, SettlementError> {
        bounded(
            self.config.store_timeout,
            self.store
                .compare_and_set(id, DepositStatus::Pending, transition),
            || {
                SettlementError::store_unavailable(
                    "compare_and_set",
                    timeout_message(self.config.store_timeout),
                )
            },
        )
        .await
    }

    /// Report the state a concurrent caller published
    async fn reread_after_lost_race(
        &self,
        id: &str,
    ) -> Result<VerificationOutcome, SettlementError> {
        let current = self.load(id).await?;
        report(&current)
    }
}

/// Read the outcome off a stored record, rejecting inconsistent records
fn report(record: &DepositRecord) -> Result<VerificationOutcome, SettlementError> {
    VerificationOutcome::from_record(record).ok_or_else(|| {
        SettlementError::invalid_record(
            None,
            format!("record {} is completed without tx_hash", record.id),
        )
    })
}

/// Await `fut`, converting an elapsed `limit` into the error built by `on_timeout`
async fn bounded<T, F>(
    limit: Duration,
    fut: F,
    on_timeout: impl FnOnce() -> SettlementError,
) -> Result<T, SettlementError>
where
    F: Future<Output = Result<T, SettlementError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout()),
    }
}

fn timeout_message(limit: Duration) -> String {
    format!("timed out after {:?}", limit)
}
