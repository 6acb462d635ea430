//! CSV format handling for deposit records, chain transfers and reports
//!
//! This module centralizes all CSV format concerns, providing:
//! - Row structures for deserialization
//! - Conversion from rows to domain types (`FromCsvRow`)
//! - Record and balance report serialization
//!
//! All functions are pure (no file I/O) for easy testing.

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::io::Write;
use std::str::FromStr;

use crate::oracle::ObservedTransfer;
use crate::types::{Currency, DepositRecord, DepositStatus, UserAccount};

/// Domain types that can be built from one CSV row
pub trait FromCsvRow: Sized {
    /// Raw row shape as deserialized by `csv`
    type Row: DeserializeOwned;

    /// Validate and convert a raw row
    fn from_row(row: Self::Row) -> Result<Self, String>;
}

/// Deposit record row
///
/// Columns: id, user, address, currency, status, expected_amount, amount,
/// tx_hash, initiated_at, completed_at. The last five may be empty.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DepositCsvRecord {
    pub id: String,
    pub user: String,
    pub address: String,
    pub currency: String,
    pub status: String,
    pub expected_amount: Option<String>,
    pub amount: Option<String>,
    pub tx_hash: Option<String>,
    pub initiated_at: String,
    pub completed_at: Option<String>,
}

/// Observed chain transfer row
///
/// Columns: address, currency, tx_hash, amount, timestamp.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TransferCsvRecord {
    pub address: String,
    pub currency: String,
    pub tx_hash: String,
    pub amount: String,
    pub timestamp: String,
}

impl FromCsvRow for DepositRecord {
    type Row = DepositCsvRecord;

    /// Convert a deposit row
    ///
    /// Rejects unknown currencies or statuses, unparsable amounts and
    /// timestamps, and rows whose settlement fields disagree with the status.
    fn from_row(row: DepositCsvRecord) -> Result<Self, String> {
        if row.id.trim().is_empty() {
            return Err("Deposit record requires an id".to_string());
        }

        let record = DepositRecord {
            currency: Currency::from_str(row.currency.trim())?,
            status: DepositStatus::from_str(row.status.trim())?,
            expected_amount: parse_optional_amount(row.expected_amount, &row.id)?,
            amount: parse_optional_amount(row.amount, &row.id)?,
            tx_hash: non_empty(row.tx_hash),
            initiated_at: parse_timestamp(&row.initiated_at)?,
            completed_at: non_empty(row.completed_at)
                .map(|raw| parse_timestamp(&raw))
                .transpose()?,
            id: row.id,
            user: row.user,
            address: row.address,
        };

        record.check_invariants()?;
        Ok(record)
    }
}

impl FromCsvRow for ObservedTransfer {
    type Row = TransferCsvRecord;

    fn from_row(row: TransferCsvRecord) -> Result<Self, String> {
        let amount = parse_amount(&row.amount, &row.tx_hash)?;
        if amount <= Decimal::ZERO {
            return Err(format!(
                "Transfer {} must have a positive amount",
                row.tx_hash
            ));
        }

        Ok(ObservedTransfer {
            currency: Currency::from_str(row.currency.trim())?,
            amount,
            timestamp: parse_timestamp(&row.timestamp)?,
            address: row.address,
            tx_hash: row.tx_hash,
        })
    }
}

fn non_empty(field: Option<String>) -> Option<String> {
    field
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_amount(raw: &str, context: &str) -> Result<Decimal, String> {
    Decimal::from_str(raw.trim()).map_err(|_| format!("Invalid amount '{}' for {}", raw, context))
}

fn parse_optional_amount(raw: Option<String>, context: &str) -> Result<Option<Decimal>, String> {
    non_empty(raw)
        .map(|value| parse_amount(&value, context))
        .transpose()
}

/// Parse an RFC 3339 timestamp into UTC
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("Invalid timestamp '{}': {}", raw, e))
}

fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Write deposit records to CSV
///
/// Records are sorted by id for deterministic output. Unset optional fields
/// are written as empty cells.
pub fn write_records_csv(records: &[DepositRecord], output: &mut dyn Write) -> Result<(), String> {
    use csv::Writer;

    let mut writer = Writer::from_writer(output);

    writer
        .write_record([
            "id",
            "user",
            "address",
            "currency",
            "status",
            "expected_amount",
            "amount",
            "tx_hash",
            "initiated_at",
            "completed_at",
        ])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted = records.to_vec();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    for record in sorted {
        writer
            .write_record(&[
                record.id,
                record.user,
                record.address,
                record.currency.to_string(),
                record.status.to_string(),
                record.expected_amount.map(|a| a.to_string()).unwrap_or_default(),
                record.amount.map(|a| a.to_string()).unwrap_or_default(),
                record.tx_hash.unwrap_or_default(),
                format_timestamp(&record.initiated_at),
                record
                    .completed_at
                    .as_ref()
                    .map(format_timestamp)
                    .unwrap_or_default(),
            ])
            .map_err(|e| format!("Failed to write deposit record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}

/// Write balances to CSV
///
/// One row per (user, currency) pair that has ever been credited, sorted by
/// user then currency, with the number of history entries for the user.
pub fn write_balances_csv(accounts: &[UserAccount], output: &mut dyn Write) -> Result<(), String> {
    use csv::Writer;

    let mut writer = Writer::from_writer(output);

    writer
        .write_record(["user", "currency", "balance", "credits"])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted = accounts.to_vec();
    sorted.sort_by(|a, b| a.user.cmp(&b.user));

    for account in sorted {
        for (currency, balance) in &account.balances {
            let credits = account
                .portfolio_history
                .iter()
                .filter(|entry| {
                    // BTC credits carry btc_value, USDT credits usdt_value.
                    match currency {
                        Currency::Btc => !entry.btc_value.is_zero(),
                        Currency::Usdt => !entry.usdt_value.is_zero(),
                    }
                })
                .count();
            writer
                .write_record(&[
                    account.user.clone(),
                    currency.to_string(),
                    format!("{:.8}", balance),
                    credits.to_string(),
                ])
                .map_err(|e| format!("Failed to write balance record: {}", e))?;
        }
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}
