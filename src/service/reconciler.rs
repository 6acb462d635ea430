//! Out-of-band repair of completed but uncredited deposits
//!
//! `verify_once` never retries a failed credit: once a record is completed,
//! every later call short-circuits. Records left in that state (credit
//! failure, or a crash or cancellation between settlement and credit) are
//! found here by looking for completed records with no matching credit in the
//! balance ledger, and credited once.
//!
//! Running next to live settlement is safe as long as the balance ledger
//! refuses a second credit for the same record (`DuplicateCredit`), which the
//! reconciler counts as already credited.

use std::sync::Arc;
use tracing::{error, info};

use crate::core::{BalanceLedger, Clock, LedgerStore, PriceSource};
use crate::types::{
    DepositRecord, DepositStatus, PortfolioHistoryEntry, RecordId, SettlementError,
};

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconciliationReport {
    /// Completed records inspected
    pub examined: usize,
    /// Records credited by this pass
    pub repaired: Vec<RecordId>,
    /// Records whose credit was already present
    pub already_credited: usize,
    /// Records that could not be repaired, with the reason
    pub failures: Vec<(RecordId, SettlementError)>,
}

/// Repair job crediting completed records that have no credit entry
pub struct Reconciler {
    store: Arc<dyn LedgerStore>,
    ledger: Arc<dyn BalanceLedger>,
    prices: Arc<dyn PriceSource>,
    clock: Arc<dyn Clock>,
}

enum Repair {
    Applied,
    AlreadyCredited,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        ledger: Arc<dyn BalanceLedger>,
        prices: Arc<dyn PriceSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            ledger,
            prices,
            clock,
        }
    }

    /// Inspect every completed record and credit the ones missing a credit
    ///
    /// Only a failure to list completed records aborts the pass; per-record
    /// failures are collected and the pass moves on.
    pub async fn run(&self) -> Result<ReconciliationReport, SettlementError> {
        let completed = self.store.list_by_status(DepositStatus::Completed).await?;
        let mut report = ReconciliationReport {
            examined: completed.len(),
            ..Default::default()
        };

        for record in completed {
            match self.repair(&record).await {
                Ok(Repair::Applied) => {
                    info!(record = %record.id, user = %record.user, "Missing credit applied");
                    report.repaired.push(record.id);
                }
                Ok(Repair::AlreadyCredited) => report.already_credited += 1,
                Err(e) => {
                    error!(record = %record.id, error = %e, "Reconciliation failed");
                    report.failures.push((record.id, e));
                }
            }
        }

        info!(
            examined = report.examined,
            repaired = report.repaired.len(),
            already_credited = report.already_credited,
            failures = report.failures.len(),
            "Reconciliation pass complete"
        );
        Ok(report)
    }

    async fn repair(&self, record: &DepositRecord) -> Result<Repair, SettlementError> {
        if self.ledger.has_credit(&record.user, &record.id).await? {
            return Ok(Repair::AlreadyCredited);
        }

        let amount = record.amount.ok_or_else(|| {
            SettlementError::invalid_record(
                None,
                format!("completed record {} has no amount", record.id),
            )
        })?;
        let usd_price = self.prices.usd_price(record.currency).await?;
        let entry = PortfolioHistoryEntry::for_credit(
            &record.id,
            record.currency,
            amount,
            usd_price,
            self.clock.now(),
        )
        .ok_or_else(|| {
            SettlementError::credit_failed(
                &record.id,
                &record.user,
                record.currency.code(),
                amount,
                "portfolio valuation overflowed",
            )
        })?;

        match self
            .ledger
            .credit_and_log(&record.user, record.currency, amount, entry)
            .await
        {
            Ok(()) => Ok(Repair::Applied),
            Err(SettlementError::DuplicateCredit { .. }) => Ok(Repair::AlreadyCredited),
            Err(e) => Err(e),
        }
    }
}
