//! Thread-safe in-memory deposit record store
//!
//! This module provides `InMemoryLedgerStore`, a `LedgerStore` backed by
//! `DashMap` for single-process deployments and tests.
//!
//! # Design
//!
//! `DashMap` shards its entries behind per-shard locks. A compare-and-set
//! holds the lock on the record's entry while it checks the status and
//! applies the transition, so the check and the write cannot interleave with
//! another writer for the same record. Records with different ids proceed in
//! parallel.

use async_trait::async_trait;
use dashmap::DashMap;

use super::traits::LedgerStore;
use crate::types::{DepositRecord, DepositStatus, RecordId, RecordTransition, SettlementError};

/// Thread-safe deposit record store
///
/// Records are never deleted. A record in a terminal status refuses every
/// transition, whatever status the caller expects.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    /// Concurrent HashMap storing deposit records by id
    records: DashMap<RecordId, DepositRecord>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Create a store pre-populated with `records`
    ///
    /// Later duplicates of an id are ignored.
    pub fn with_records(records: impl IntoIterator<Item = DepositRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    /// Insert a record created by the upstream deposit-request flow
    ///
    /// # Returns
    ///
    /// `true` if the record was inserted, `false` if the id already existed
    /// (first occurrence wins).
    pub fn insert(&self, record: DepositRecord) -> bool {
        let mut inserted = false;
        self.records.entry(record.id.clone()).or_insert_with(|| {
            inserted = true;
            record
        });
        inserted
    }

    /// Snapshot of every record, ordered by id
    pub fn snapshot(&self) -> Vec<DepositRecord> {
        let mut records: Vec<DepositRecord> = self
            .records
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn find(&self, id: &str) -> Result<DepositRecord, SettlementError> {
        self.records
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SettlementError::not_found(id))
    }

    async fn compare_and_set(
        &self,
        id: &str,
        expected: DepositStatus,
        transition: RecordTransition,
    ) -> Result<bool, SettlementError> {
        let mut entry = self
            .records
            .get_mut(id)
            .ok_or_else(|| SettlementError::not_found(id))?;

        let record = entry.value_mut();
        if record.status != expected || record.status.is_terminal() {
            return Ok(false);
        }

        transition.apply(record);
        Ok(true)
    }

    async fn list_by_status(
        &self,
        status: DepositStatus,
    ) -> Result<Vec<DepositRecord>, SettlementError> {
        let mut records: Vec<DepositRecord> = self
            .records
            .iter()
            .filter(|entry| entry.value().status == status)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChainMatch, Currency};
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use std::sync::Arc;

    fn pending(id: &str) -> DepositRecord {
        DepositRecord::pending(
            id,
            "u1",
            format!("addr-{}", id),
            Currency::Btc,
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        )
    }

    fn settle(tx_hash: &str) -> RecordTransition {
        RecordTransition::settle(&ChainMatch {
            tx_hash: tx_hash.to_string(),
            amount: Decimal::new(1, 2),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 12, 5, 0).unwrap(),
        })
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = InMemoryLedgerStore::new();
        assert!(store.insert(pending("r1")));

        let record = store.find("r1").await.unwrap();
        assert_eq!(record, pending("r1"));
    }

    #[tokio::test]
    async fn test_find_missing_record() {
        let store = InMemoryLedgerStore::new();
        assert_eq!(
            store.find("missing").await,
            Err(SettlementError::not_found("missing"))
        );
    }

    #[test]
    fn test_insert_ignores_duplicate_id() {
        let store = InMemoryLedgerStore::new();
        let mut second = pending("r1");
        second.user = "u2".to_string();

        assert!(store.insert(pending("r1")));
        assert!(!store.insert(second));
        assert_eq!(store.snapshot()[0].user, "u1");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_compare_and_set_applies_when_status_matches() {
        let store = InMemoryLedgerStore::with_records([pending("r1")]);

        let applied = store
            .compare_and_set("r1", DepositStatus::Pending, settle("0xabc"))
            .await
            .unwrap();
        assert!(applied);

        let record = store.find("r1").await.unwrap();
        assert_eq!(record.status, DepositStatus::Completed);
        assert_eq!(record.tx_hash.as_deref(), Some("0xabc"));
    }

    #[tokio::test]
    async fn test_compare_and_set_rejects_stale_expectation() {
        let store = InMemoryLedgerStore::with_records([pending("r1")]);
        store
            .compare_and_set("r1", DepositStatus::Pending, RecordTransition::Expire)
            .await
            .unwrap();

        let applied = store
            .compare_and_set("r1", DepositStatus::Pending, settle("0xabc"))
            .await
            .unwrap();
        assert!(!applied);

        let record = store.find("r1").await.unwrap();
        assert_eq!(record.status, DepositStatus::Failed);
        assert!(record.tx_hash.is_none());
    }

    #[tokio::test]
    async fn test_terminal_record_refuses_transitions_even_when_expected() {
        let store = InMemoryLedgerStore::with_records([pending("r1")]);
        store
            .compare_and_set("r1", DepositStatus::Pending, RecordTransition::Expire)
            .await
            .unwrap();

        let applied = store
            .compare_and_set("r1", DepositStatus::Failed, settle("0xabc"))
            .await
            .unwrap();
        assert!(!applied);
        assert_eq!(store.find("r1").await.unwrap().status, DepositStatus::Failed);
    }

    #[tokio::test]
    async fn test_compare_and_set_missing_record() {
        let store = InMemoryLedgerStore::new();
        let result = store
            .compare_and_set("r1", DepositStatus::Pending, RecordTransition::Expire)
            .await;
        assert_eq!(result, Err(SettlementError::not_found("r1")));
    }

    #[tokio::test]
    async fn test_list_by_status_is_sorted() {
        let store =
            InMemoryLedgerStore::with_records([pending("r3"), pending("r1"), pending("r2")]);
        store
            .compare_and_set("r2", DepositStatus::Pending, RecordTransition::Expire)
            .await
            .unwrap();

        let pending_ids: Vec<String> = store
            .list_by_status(DepositStatus::Pending)
            .await
            .unwrap()
            .into_iter()
            .map(|record| record.id)
            .collect();
        assert_eq!(pending_ids, vec!["r1", "r3"]);

        let failed = store.list_by_status(DepositStatus::Failed).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, "r2");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_compare_and_set_has_single_winner() {
        let store = Arc::new(InMemoryLedgerStore::with_records([pending("r1")]));

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .compare_and_set("r1", DepositStatus::Pending, settle(&format!("0x{}", i)))
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
        assert_eq!(
            store.find("r1").await.unwrap().status,
            DepositStatus::Completed
        );
    }
}
