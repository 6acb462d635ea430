//! Thread-safe in-memory balance ledger
//!
//! This module provides `InMemoryBalanceLedger`, a `BalanceLedger` that keeps
//! each user's balances and portfolio history in one `DashMap` entry.
//!
//! # Atomicity
//!
//! A credit holds the user's entry lock while it checks for a duplicate,
//! performs the checked balance addition and appends the history entry. Either
//! all three happen or none does; no reader can observe an incremented balance
//! without its history entry.

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;

use super::traits::BalanceLedger;
use crate::types::{Currency, PortfolioHistoryEntry, SettlementError, UserAccount, UserId};

/// Thread-safe per-user balance ledger
///
/// Accounts are created on first credit (upsert). A second credit carrying the
/// same record id is refused with `SettlementError::DuplicateCredit`, which
/// makes the reconciler safe to run next to live settlement.
#[derive(Debug, Default)]
pub struct InMemoryBalanceLedger {
    /// Concurrent HashMap storing accounts by user id
    accounts: DashMap<UserId, UserAccount>,
}

impl InMemoryBalanceLedger {
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
        }
    }

    /// Snapshot of one user's account
    pub fn account(&self, user: &str) -> Option<UserAccount> {
        self.accounts.get(user).map(|entry| entry.value().clone())
    }

    /// Snapshot of every account, ordered by user id
    pub fn accounts(&self) -> Vec<UserAccount> {
        let mut accounts: Vec<UserAccount> = self
            .accounts
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        accounts.sort_by(|a, b| a.user.cmp(&b.user));
        accounts
    }

    /// Current balance of `user` in `currency` (zero for unknown users)
    pub fn balance(&self, user: &str, currency: Currency) -> Decimal {
        self.accounts
            .get(user)
            .map(|entry| entry.value().balance(currency))
            .unwrap_or(Decimal::ZERO)
    }
}

#[async_trait]
impl BalanceLedger for InMemoryBalanceLedger {
    async fn credit_and_log(
        &self,
        user: &str,
        currency: Currency,
        amount: Decimal,
        entry: PortfolioHistoryEntry,
    ) -> Result<(), SettlementError> {
        let mut account = self
            .accounts
            .entry(user.to_string())
            .or_insert_with(|| UserAccount::new(user));
        let account = account.value_mut();

        if account.has_credit_for(&entry.record_id) {
            return Err(SettlementError::duplicate_credit(&entry.record_id));
        }

        let updated = account
            .balance(currency)
            .checked_add(amount)
            .ok_or_else(|| SettlementError::arithmetic_overflow(user, currency.code()))?;

        account.balances.insert(currency, updated);
        account.portfolio_history.push(entry);
        Ok(())
    }

    async fn has_credit(&self, user: &str, record_id: &str) -> Result<bool, SettlementError> {
        Ok(self
            .accounts
            .get(user)
            .map(|entry| entry.value().has_credit_for(record_id))
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn entry(record_id: &str, currency: Currency, amount: Decimal) -> PortfolioHistoryEntry {
        PortfolioHistoryEntry::for_credit(
            record_id,
            currency,
            amount,
            Decimal::ONE,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_credit_creates_account() {
        let ledger = InMemoryBalanceLedger::new();
        let amount = Decimal::new(1, 2);

        ledger
            .credit_and_log("u1", Currency::Btc, amount, entry("r1", Currency::Btc, amount))
            .await
            .unwrap();

        let account = ledger.account("u1").unwrap();
        assert_eq!(account.balance(Currency::Btc), amount);
        assert_eq!(account.balance(Currency::Usdt), Decimal::ZERO);
        assert_eq!(account.portfolio_history.len(), 1);
        assert!(ledger.has_credit("u1", "r1").await.unwrap());
    }

    #[tokio::test]
    async fn test_credits_accumulate_per_currency() {
        let ledger = InMemoryBalanceLedger::new();

        ledger
            .credit_and_log(
                "u1",
                Currency::Usdt,
                Decimal::new(100, 0),
                entry("r1", Currency::Usdt, Decimal::new(100, 0)),
            )
            .await
            .unwrap();
        ledger
            .credit_and_log(
                "u1",
                Currency::Usdt,
                Decimal::new(50, 0),
                entry("r2", Currency::Usdt, Decimal::new(50, 0)),
            )
            .await
            .unwrap();
        ledger
            .credit_and_log(
                "u1",
                Currency::Btc,
                Decimal::ONE,
                entry("r3", Currency::Btc, Decimal::ONE),
            )
            .await
            .unwrap();

        assert_eq!(ledger.balance("u1", Currency::Usdt), Decimal::new(150, 0));
        assert_eq!(ledger.balance("u1", Currency::Btc), Decimal::ONE);
        assert_eq!(ledger.account("u1").unwrap().portfolio_history.len(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_record_credit_is_refused() {
        let ledger = InMemoryBalanceLedger::new();
        let amount = Decimal::ONE;

        ledger
            .credit_and_log("u1", Currency::Btc, amount, entry("r1", Currency::Btc, amount))
            .await
            .unwrap();
        let second = ledger
            .credit_and_log("u1", Currency::Btc, amount, entry("r1", Currency::Btc, amount))
            .await;

        assert_eq!(second, Err(SettlementError::duplicate_credit("r1")));
        assert_eq!(ledger.balance("u1", Currency::Btc), amount);
        assert_eq!(ledger.account("u1").unwrap().portfolio_history.len(), 1);
    }

    #[tokio::test]
    async fn test_overflow_leaves_account_unchanged() {
        let ledger = InMemoryBalanceLedger::new();

        ledger
            .credit_and_log(
                "u1",
                Currency::Usdt,
                Decimal::MAX,
                entry("r1", Currency::Usdt, Decimal::ONE),
            )
            .await
            .unwrap();
        let result = ledger
            .credit_and_log(
                "u1",
                Currency::Usdt,
                Decimal::ONE,
                entry("r2", Currency::Usdt, Decimal::ONE),
            )
            .await;

        assert_eq!(result, Err(SettlementError::arithmetic_overflow("u1", "USDT")));
        let account = ledger.account("u1").unwrap();
        assert_eq!(account.balance(Currency::Usdt), Decimal::MAX);
        assert_eq!(account.portfolio_history.len(), 1);
        assert!(!account.has_credit_for("r2"));
    }

    #[tokio::test]
    async fn test_unknown_user_has_no_credit() {
        let ledger = InMemoryBalanceLedger::new();
        assert!(!ledger.has_credit("nobody", "r1").await.unwrap());
        assert_eq!(ledger.balance("nobody", Currency::Btc), Decimal::ZERO);
        assert!(ledger.account("nobody").is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_credits_for_one_user() {
        let ledger = Arc::new(InMemoryBalanceLedger::new());

        let mut handles = Vec::new();
        for i in 0..20 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                let record_id = format!("r{}", i);
                ledger
                    .credit_and_log(
                        "u1",
                        Currency::Usdt,
                        Decimal::ONE,
                        entry(&record_id, Currency::Usdt, Decimal::ONE),
                    )
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let account = ledger.account("u1").unwrap();
        assert_eq!(account.balance(Currency::Usdt), Decimal::new(20, 0));
        assert_eq!(account.portfolio_history.len(), 20);
    }
}
