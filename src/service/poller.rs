//! Scheduled polling of pending deposits
//!
//! The poller is the timer-driven caller of the engine: each round it lists
//! the pending records and runs one verification attempt per record, with a
//! bound on how many attempts are in flight at once. Poll interval and
//! concurrency are caller policy; the engine knows nothing about them.
//!
//! # Architecture
//!
//! ```text
//! Poller
//!     ├── SettlementEngine       (one attempt per record)
//!     ├── Arc<dyn LedgerStore>   (source of pending records)
//!     └── PollerConfig           (interval, max_rounds, max_concurrent)
//! ```

use chrono::Duration as ChronoDuration;
use futures::stream::{self, StreamExt};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::core::{LedgerStore, ManualClock, SettlementEngine};
use crate::types::{DepositStatus, RecordId, SettlementError, VerificationOutcome};

/// Configuration for scheduled polling
#[derive(Clone, Debug, PartialEq)]
pub struct PollerConfig {
    /// Delay between the start of two rounds
    pub interval: Duration,
    /// Upper bound on rounds run by `run_until_settled`
    pub max_rounds: usize,
    /// Maximum number of verification attempts in flight
    pub max_concurrent: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            max_rounds: 120,
            max_concurrent: num_cpus::get(),
        }
    }
}

impl PollerConfig {
    /// Create a new PollerConfig with custom values
    ///
    /// Zero `max_rounds` or `max_concurrent` fall back to the defaults. A zero
    /// interval is allowed and means back-to-back rounds.
    pub fn new(interval: Duration, max_rounds: usize, max_concurrent: usize) -> Self {
        let default = Self::default();

        let max_rounds = if max_rounds == 0 {
            warn!(
                "Invalid max_rounds ({}), using default ({})",
                max_rounds, default.max_rounds
            );
            default.max_rounds
        } else {
            max_rounds
        };

        let max_concurrent = if max_concurrent == 0 {
            warn!(
                "Invalid max_concurrent ({}), using default ({})",
                max_concurrent, default.max_concurrent
            );
            default.max_concurrent
        } else {
            max_concurrent
        };

        Self {
            interval,
            max_rounds,
            max_concurrent,
        }
    }
}

/// Tally of one polling round
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundReport {
    /// 1-based round number
    pub round: usize,
    /// Records that were pending when the round started
    pub examined: usize,
    pub confirmed: usize,
    pub failed: usize,
    pub pending: usize,
    /// Attempts that ended in an error, by record
    pub errors: Vec<(RecordId, SettlementError)>,
}

impl RoundReport {
    /// Records that may still settle in a later round
    pub fn remaining(&self) -> usize {
        self.pending + self.errors.iter().filter(|(_, e)| e.is_transient()).count()
    }
}

/// Timer-driven caller of the settlement engine
pub struct Poller {
    engine: SettlementEngine,
    store: Arc<dyn LedgerStore>,
    config: PollerConfig,
}

impl Poller {
    pub fn new(
        engine: SettlementEngine,
        store: Arc<dyn LedgerStore>,
        config: PollerConfig,
    ) -> Self {
        Self {
            engine,
            store,
            config,
        }
    }

    /// Verify every currently pending record once
    ///
    /// Each record is checked against its own currency, with its requested
    /// amount (or zero) as the minimum. Per-record errors are collected in the
    /// report; only a failure to list pending records fails the round.
    pub async fn run_round(&self, round: usize) -> Result<RoundReport, SettlementError> {
        let pending = self.store.list_by_status(DepositStatus::Pending).await?;
        let mut report = RoundReport {
            round,
            examined: pending.len(),
            ..Default::default()
        };

        let attempts = pending.into_iter().map(|record| {
            let engine = self.engine.clone();
            async move {
                let min_amount = record.expected_amount.unwrap_or(Decimal::ZERO);
                let result = engine
                    .verify_once(&record.id, record.currency, min_amount)
                    .await;
                (record.id, result)
            }
        });

        let results: Vec<_> = stream::iter(attempts)
            .buffer_unordered(self.config.max_concurrent)
            .collect()
            .await;

        for (id, result) in results {
            match result {
                Ok(VerificationOutcome::Confirmed { .. }) => report.confirmed += 1,
                Ok(VerificationOutcome::Failed) => report.failed += 1,
                Ok(VerificationOutcome::Pending) => report.pending += 1,
                Err(e) => {
                    debug!(record = %id, error = %e, "Verification attempt failed");
                    report.errors.push((id, e));
                }
            }
        }
        report.errors.sort_by(|a, b| a.0.cmp(&b.0));

        info!(
            round,
            examined = report.examined,
            confirmed = report.confirmed,
            failed = report.failed,
            pending = report.pending,
            errors = report.errors.len(),
            "Polling round complete"
        );
        Ok(report)
    }

    /// Run rounds on the configured interval until nothing can still settle
    ///
    /// Stops early once a round leaves no pending record and no transient
    /// error behind, otherwise after `max_rounds`.
    pub async fn run_until_settled(&self) -> Result<Vec<RoundReport>, SettlementError> {
        let mut ticker = tokio::time::interval(self.config.interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut reports = Vec::new();
        for round in 1..=self.config.max_rounds {
            ticker.tick().await;
            let report = self.run_round(round).await?;
            let done = report.remaining() == 0;
            reports.push(report);
            if done {
                break;
            }
        }
        Ok(reports)
    }

    /// Run rounds against a manual clock instead of the timer
    ///
    /// Between rounds the clock is advanced by the poll interval and no real
    /// time passes, so a fixed set of observations can be replayed with the
    /// same stopping rule as `run_until_settled`.
    pub async fn replay(&self, clock: &ManualClock) -> Result<Vec<RoundReport>, SettlementError> {
        let step = ChronoDuration::from_std(self.config.interval)
            .unwrap_or_else(|_| ChronoDuration::zero());

        let mut reports = Vec::new();
        for round in 1..=self.config.max_rounds {
            if round > 1 {
                clock.advance(step);
            }
            let report = self.run_round(round).await?;
            let done = report.remaining() == 0;
            reports.push(report);
            if done {
                break;
            }
        }
        Ok(reports)
    }
}
