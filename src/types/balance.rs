//! Balance-related types for the settlement engine
//!
//! This module defines the per-user account held by the balance ledger and
//! the portfolio-history entry appended on every credit.

use super::deposit::{Currency, RecordId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Append-only audit record of one credit event
///
/// Created together with the balance increment it documents and never
/// modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioHistoryEntry {
    /// Deposit record whose settlement produced this credit
    pub record_id: RecordId,

    /// When the credit was applied
    pub date: DateTime<Utc>,

    /// USD value of the credited amount
    pub total_value: Decimal,

    /// USD value attributed to BTC holdings
    pub btc_value: Decimal,

    /// USD value attributed to USDT holdings
    pub usdt_value: Decimal,

    /// Fiat cash component (deposits never carry one)
    pub usd_value: Decimal,

    /// Investment component (deposits never carry one)
    pub investments_value: Decimal,
}

impl PortfolioHistoryEntry {
    /// Build the history entry for crediting `amount` of `currency`
    ///
    /// # Arguments
    ///
    /// * `record_id` - The settled deposit record
    /// * `currency` - Currency being credited
    /// * `amount` - Credited amount in units of `currency`
    /// * `usd_price` - USD price of one unit of `currency`
    /// * `date` - Timestamp of the credit
    ///
    /// # Returns
    ///
    /// `None` if the USD value overflows.
    pub fn for_credit(
        record_id: &str,
        currency: Currency,
        amount: Decimal,
        usd_price: Decimal,
        date: DateTime<Utc>,
    ) -> Option<Self> {
        let value = amount.checked_mul(usd_price)?;
        let (btc_value, usdt_value) = match currency {
            Currency::Btc => (value, Decimal::ZERO),
            Currency::Usdt => (Decimal::ZERO, value),
        };

        Some(PortfolioHistoryEntry {
            record_id: record_id.to_string(),
            date,
            total_value: value,
            btc_value,
            usdt_value,
            usd_value: Decimal::ZERO,
            investments_value: Decimal::ZERO,
        })
    }
}

/// Balances and credit history of one user
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UserAccount {
    /// The owning user
    pub user: UserId,

    /// Balance per currency; currencies never credited are absent
    pub balances: BTreeMap<Currency, Decimal>,

    /// Credit log, in application order
    pub portfolio_history: Vec<PortfolioHistoryEntry>,
}

impl UserAccount {
    /// Create an account with no balances and an empty history
    pub fn new(user: impl Into<UserId>) -> Self {
        UserAccount {
            user: user.into(),
            balances: BTreeMap::new(),
            portfolio_history: Vec::new(),
        }
    }

    /// Balance held in `currency` (zero if never credited)
    pub fn balance(&self, currency: Currency) -> Decimal {
        self.balances.get(&currency).copied().unwrap_or(Decimal::ZERO)
    }

    /// Whether the history already holds a credit for `record_id`
    pub fn has_credit_for(&self, record_id: &str) -> bool {
        self.portfolio_history
            .iter()
            .any(|entry| entry.record_id == record_id)
    }
}
