//! Fixed-table USD pricing
//!
//! Production deployments inject a live price feed; this table-backed source
//! serves the CLI and tests. A currency without a quote is reported as an
//! unavailable price oracle rather than valued at some default.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;

use super::traits::PriceSource;
use crate::types::{Currency, SettlementError};

/// Price source answering from a fixed quote table
#[derive(Debug, Clone, Default)]
pub struct FixedPriceSource {
    quotes: HashMap<Currency, Decimal>,
}

impl FixedPriceSource {
    /// Create a source with no quotes
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source that only knows the USDT peg (1 USDT = 1 USD)
    pub fn usdt_pegged() -> Self {
        Self::new().with_quote(Currency::Usdt, Decimal::ONE)
    }

    /// Add or replace the quote for `currency`
    pub fn with_quote(mut self, currency: Currency, usd_price: Decimal) -> Self {
        self.quotes.insert(currency, usd_price);
        self
    }

    pub fn has_quote(&self, currency: Currency) -> bool {
        self.quotes.contains_key(&currency)
    }
}

#[async_trait]
impl PriceSource for FixedPriceSource {
    async fn usd_price(&self, currency: Currency) -> Result<Decimal, SettlementError> {
        self.quotes
            .get(&currency)
            .copied()
            .ok_or_else(|| SettlementError::price_unavailable(format!("no quote for {}", currency)))
    }
}
