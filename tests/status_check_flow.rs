//! Status-check flow through the public API
//!
//! Drives `handle_status_check` the way a client polling a deposit would:
//! repeated checks while the transfer is still propagating, a confirmation,
//! and the responses that follow it.

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use deposit_settlement_engine::core::{
    FixedPriceSource, InMemoryBalanceLedger, InMemoryLedgerStore, ManualClock, SettlementConfig,
    SettlementEngine,
};
use deposit_settlement_engine::oracle::{ObservedChain, ObservedTransfer};
use deposit_settlement_engine::service::handle_status_check;
use deposit_settlement_engine::types::{Currency, DepositRecord, DepositStatus};
use rust_decimal::Decimal;
use std::sync::Arc;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

struct Harness {
    store: Arc<InMemoryLedgerStore>,
    ledger: Arc<InMemoryBalanceLedger>,
    chain: Arc<ObservedChain>,
    clock: Arc<ManualClock>,
    engine: SettlementEngine,
}

fn harness(records: Vec<DepositRecord>) -> Harness {
    let clock = Arc::new(ManualClock::new(t0()));
    let store = Arc::new(InMemoryLedgerStore::with_records(records));
    let ledger = Arc::new(InMemoryBalanceLedger::new());
    let chain = Arc::new(ObservedChain::new(clock.clone()));
    let engine = SettlementEngine::new(
        store.clone(),
        chain.clone(),
        ledger.clone(),
        Arc::new(FixedPriceSource::usdt_pegged().with_quote(Currency::Btc, Decimal::new(64000, 0))),
        clock.clone(),
        SettlementConfig::default(),
    );
    Harness {
        store,
        ledger,
        chain,
        clock,
        engine,
    }
}

#[tokio::test]
async fn test_client_polls_until_confirmed() {
    let h = harness(vec![DepositRecord::pending(
        "r1",
        "u1",
        "addr1",
        Currency::Btc,
        t0(),
    )]);

    let first = handle_status_check(&h.engine, "r1", Some("BTC"), Some("0.01")).await;
    assert_eq!(first.status_code, 200);
    assert_eq!(first.to_json(), r#"{"status":"pending"}"#);

    h.chain.observe(ObservedTransfer {
        address: "addr1".to_string(),
        currency: Currency::Btc,
        tx_hash: "0xabc".to_string(),
        amount: Decimal::new(1, 2),
        timestamp: t0() + ChronoDuration::minutes(4),
    });
    h.clock.advance(ChronoDuration::minutes(2));
    let still_pending = handle_status_check(&h.engine, "r1", Some("BTC"), Some("0.01")).await;
    assert_eq!(still_pending.to_json(), r#"{"status":"pending"}"#);

    h.clock.advance(ChronoDuration::minutes(3));
    let confirmed = handle_status_check(&h.engine, "r1", Some("BTC"), Some("0.01")).await;
    assert_eq!(confirmed.status_code, 200);
    assert_eq!(confirmed.to_json(), r#"{"status":"confirmed","txHash":"0xabc"}"#);

    // Past the window, a completed record still reports the confirmation.
    h.clock.advance(ChronoDuration::hours(2));
    let later = handle_status_check(&h.engine, "r1", Some("BTC"), None).await;
    assert_eq!(later.to_json(), r#"{"status":"confirmed","txHash":"0xabc"}"#);

    let account = h.ledger.account("u1").unwrap();
    assert_eq!(account.balance(Currency::Btc), Decimal::new(1, 2));
    assert_eq!(account.portfolio_history.len(), 1);
    assert_eq!(account.portfolio_history[0].btc_value, Decimal::new(640, 0));

    let record = &h.store.snapshot()[0];
    assert_eq!(record.status, DepositStatus::Completed);
    assert_eq!(
        record.completed_at,
        Some(t0() + ChronoDuration::minutes(4))
    );
}

#[tokio::test]
async fn test_unknown_record_and_bad_parameters() {
    let h = harness(vec![]);

    let missing = handle_status_check(&h.engine, "nope", Some("USDT"), None).await;
    assert_eq!(missing.status_code, 404);
    assert_eq!(
        missing.to_json(),
        r#"{"status":"failed","error":"Transaction not found"}"#
    );

    let no_currency = handle_status_check(&h.engine, "nope", None, None).await;
    assert_eq!(no_currency.status_code, 400);
    assert_eq!(no_currency.to_json(), r#"{"error":"Missing parameters"}"#);
}

#[tokio::test]
async fn test_expired_deposit_reports_failed() {
    let h = harness(vec![DepositRecord::pending(
        "r1",
        "u1",
        "addr1",
        Currency::Usdt,
        t0() - ChronoDuration::minutes(31),
    )]);
    h.chain.observe(ObservedTransfer {
        address: "addr1".to_string(),
        currency: Currency::Usdt,
        tx_hash: "0xlate".to_string(),
        amount: Decimal::new(50, 0),
        timestamp: t0() - ChronoDuration::minutes(1),
    });

    let response = handle_status_check(&h.engine, "r1", Some("USDT"), None).await;

    assert_eq!(response.to_json(), r#"{"status":"failed"}"#);
    assert_eq!(h.store.snapshot()[0].status, DepositStatus::Failed);
    assert!(h.ledger.account("u1").is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_checks_credit_once() {
    let h = harness(vec![DepositRecord::pending(
        "r1",
        "u1",
        "addr1",
        Currency::Usdt,
        t0(),
    )]);
    h.chain.observe(ObservedTransfer {
        address: "addr1".to_string(),
        currency: Currency::Usdt,
        tx_hash: "0xabc".to_string(),
        amount: Decimal::new(125, 0),
        timestamp: t0(),
    });

    let checks: Vec<_> = (0..24)
        .map(|_| {
            let engine = h.engine.clone();
            tokio::spawn(async move {
                handle_status_check(&engine, "r1", Some("USDT"), None).await
            })
        })
        .collect();

    for check in checks {
        let response = check.await.unwrap();
        assert_eq!(response.to_json(), r#"{"status":"confirmed","txHash":"0xabc"}"#);
    }

    assert_eq!(h.ledger.balance("u1", Currency::Usdt), Decimal::new(125, 0));
    assert_eq!(h.ledger.account("u1").unwrap().portfolio_history.len(), 1);
}
