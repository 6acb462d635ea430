//! In-memory chain oracle over a list of observed transfers
//!
//! `ObservedChain` answers `ChainLookup` queries from transfers that were
//! recorded ahead of time (from a CSV file, a test, or an indexer feed). A
//! transfer only becomes visible once the injected clock reaches its
//! timestamp, which reproduces the oracle's eventual consistency: the same
//! query returns nothing before that instant and a match after it.
//!
//! A lookup never consumes a transfer. Two records that share an address
//! and currency resolve to the same transfer, and a transfer that predates
//! a record's initiation still matches it. Callers that need one-to-one
//! matching must assign distinct addresses per record.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::core::traits::{ChainLookup, Clock};
use crate::types::{ChainMatch, Currency, SettlementError};

/// One inbound transfer seen on chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedTransfer {
    pub address: String,
    pub currency: Currency,
    pub tx_hash: String,
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Chain oracle backed by observed transfers, grouped by destination address
pub struct ObservedChain {
    transfers: DashMap<String, Vec<ObservedTransfer>>,
    clock: Arc<dyn Clock>,
}

impl ObservedChain {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            transfers: DashMap::new(),
            clock,
        }
    }

    /// Create an oracle pre-populated with `transfers`
    pub fn with_transfers(
        clock: Arc<dyn Clock>,
        transfers: impl IntoIterator<Item = ObservedTransfer>,
    ) -> Self {
        let chain = Self::new(clock);
        for transfer in transfers {
            chain.observe(transfer);
        }
        chain
    }

    /// Record a transfer
    pub fn observe(&self, transfer: ObservedTransfer) {
        self.transfers
            .entry(transfer.address.clone())
            .or_default()
            .push(transfer);
    }

    pub fn len(&self) -> usize {
        self.transfers.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ChainLookup for ObservedChain {
    /// Earliest visible transfer to `address` in `currency` of at least `min_amount`
    ///
    /// Ties on timestamp are broken by transaction hash so the answer is
    /// deterministic. The query carries no initiation time, so transfers are
    /// not bounded below and repeated lookups return the same transfer.
    async fn find_incoming(
        &self,
        address: &str,
        min_amount: Decimal,
        currency: Currency,
    ) -> Result<Option<ChainMatch>, SettlementError> {
        let now = self.clock.now();
        let Some(transfers) = self.transfers.get(address) else {
            return Ok(None);
        };

        let found = transfers
            .value()
            .iter()
            .filter(|t| t.currency == currency && t.amount >= min_amount && t.timestamp <= now)
            .min_by(|a, b| {
                a.timestamp
                    .cmp(&b.timestamp)
                    .then_with(|| a.tx_hash.cmp(&b.tx_hash))
            })
            .map(|t| ChainMatch {
                tx_hash: t.tx_hash.clone(),
                amount: t.amount,
                timestamp: t.timestamp,
            });

        Ok(found)
    }
}
