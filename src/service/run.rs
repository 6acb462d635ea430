//! Batch settlement run over CSV inputs
//!
//! Wires the in-memory collaborators together, polls every pending record
//! until nothing can still settle, runs one reconciliation pass and writes
//! the resulting records and balances.
//!
//! # Architecture
//!
//! ```text
//! SettlementRun
//!     ├── RunOptions                  (configs, clock mode, price table)
//!     ├── CsvFileReader               (records.csv, chain.csv)
//!     ├── Poller ── SettlementEngine
//!     │               ├── InMemoryLedgerStore
//!     │               ├── ObservedChain
//!     │               ├── InMemoryBalanceLedger
//!     │               └── FixedPriceSource
//!     └── Reconciler
//! ```
//!
//! With a fixed `now` the run replays on a manual clock that advances by the
//! poll interval between rounds; otherwise it follows the system clock and
//! waits out the interval for real.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::{
    Clock, FixedPriceSource, InMemoryBalanceLedger, InMemoryLedgerStore, ManualClock,
    SettlementConfig, SettlementEngine, SystemClock,
};
use crate::io::csv_format::{write_balances_csv, write_records_csv};
use crate::io::read_all;
use crate::oracle::{ObservedChain, ObservedTransfer};
use crate::service::{Poller, PollerConfig, ReconciliationReport, Reconciler, RoundReport};
use crate::types::{Currency, DepositRecord, DepositStatus, SettlementError, UserAccount};

/// Everything a run needs besides its inputs
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub settlement: SettlementConfig,
    pub poller: PollerConfig,
    /// Fixed start time; `None` means the system clock
    pub now: Option<DateTime<Utc>>,
    pub prices: FixedPriceSource,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            settlement: SettlementConfig::default(),
            poller: PollerConfig::default(),
            now: None,
            prices: FixedPriceSource::usdt_pegged(),
        }
    }
}

/// Final state of a run
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// All records, sorted by id
    pub records: Vec<DepositRecord>,
    /// All credited accounts, sorted by user
    pub accounts: Vec<UserAccount>,
    pub rounds: Vec<RoundReport>,
    pub reconciliation: ReconciliationReport,
}

impl RunSummary {
    /// Write the records report, a blank line, then the balances report
    pub fn write_reports(&self, output: &mut dyn Write) -> Result<(), String> {
        write_records_csv(&self.records, output)?;
        output
            .write_all(b"\n")
            .map_err(|e| format!("Failed to write output: {}", e))?;
        write_balances_csv(&self.accounts, output)
    }
}

/// One settlement run
#[derive(Debug, Clone, Default)]
pub struct SettlementRun {
    options: RunOptions,
}

impl SettlementRun {
    pub fn new(options: RunOptions) -> Self {
        Self { options }
    }

    /// Settle the given records against the given observations
    ///
    /// Duplicate record ids keep the first occurrence. A run whose records
    /// use a currency without a USD quote is refused up front. Otherwise only
    /// store failures abort the run; per-record errors end up in the round
    /// reports.
    pub async fn execute(
        &self,
        records: Vec<DepositRecord>,
        transfers: Vec<ObservedTransfer>,
    ) -> Result<RunSummary, SettlementError> {
        self.check_quotes(&records)?;

        let manual_clock = self.options.now.map(|now| Arc::new(ManualClock::new(now)));
        let clock: Arc<dyn Clock> = match &manual_clock {
            Some(manual) => manual.clone(),
            None => Arc::new(SystemClock),
        };

        let store = Arc::new(InMemoryLedgerStore::new());
        for record in records {
            let id = record.id.clone();
            if !store.insert(record) {
                warn!(record = %id, "Duplicate record id, keeping the first");
            }
        }
        let chain = Arc::new(ObservedChain::with_transfers(clock.clone(), transfers));
        let ledger = Arc::new(InMemoryBalanceLedger::new());
        let prices = Arc::new(self.options.prices.clone());

        let engine = SettlementEngine::new(
            store.clone(),
            chain,
            ledger.clone(),
            prices.clone(),
            clock.clone(),
            self.options.settlement.clone(),
        );
        let poller = Poller::new(engine, store.clone(), self.options.poller.clone());

        info!(records = store.len(), "Starting settlement run");
        let rounds = match &manual_clock {
            Some(manual) => poller.replay(manual).await?,
            None => poller.run_until_settled().await?,
        };

        let reconciliation = Reconciler::new(store.clone(), ledger.clone(), prices, clock)
            .run()
            .await?;

        Ok(RunSummary {
            records: store.snapshot(),
            accounts: ledger.accounts(),
            rounds,
            reconciliation,
        })
    }

    /// Every currency that may need crediting must have a USD quote
    fn check_quotes(&self, records: &[DepositRecord]) -> Result<(), SettlementError> {
        let unpriced: BTreeSet<Currency> = records
            .iter()
            .filter(|r| r.status != DepositStatus::Failed)
            .map(|r| r.currency)
            .filter(|c| !self.options.prices.has_quote(*c))
            .collect();

        match unpriced.iter().next() {
            None => Ok(()),
            Some(currency) => Err(SettlementError::price_unavailable(format!(
                "no quote for {} deposits in the input (pass --price {}=<USD>)",
                currency, currency
            ))),
        }
    }

    /// Load both CSV files, run, and write the reports to `output`
    ///
    /// Malformed rows are logged and skipped. Missing files, runtime
    /// failures, store failures and write failures are fatal.
    pub fn process(
        &self,
        records_path: &Path,
        chain_path: &Path,
        output: &mut dyn Write,
    ) -> Result<(), String> {
        let (records, rejected_records) =
            read_all::<DepositRecord>(records_path).map_err(|e| e.to_string())?;
        let (transfers, rejected_transfers) =
            read_all::<ObservedTransfer>(chain_path).map_err(|e| e.to_string())?;
        if !rejected_records.is_empty() || !rejected_transfers.is_empty() {
            warn!(
                records = rejected_records.len(),
                transfers = rejected_transfers.len(),
                "Skipped malformed rows"
            );
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.options.poller.max_concurrent)
            .enable_time()
            .build()
            .map_err(|e| format!("Failed to create tokio runtime: {}", e))?;

        let summary = runtime
            .block_on(self.execute(records, transfers))
            .map_err(|e| e.to_string())?;

        summary.write_reports(output)
    }
}
