use crate::core::{FixedPriceSource, SettlementConfig};
use crate::io::csv_format::parse_timestamp;
use crate::service::{PollerConfig, RunOptions};
use crate::types::Currency;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use clap::Parser;
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Settle pending crypto deposits against observed chain transfers
#[derive(Parser, Debug)]
#[command(name = "settle")]
#[command(about = "Settle pending crypto deposits against observed chain transfers", long_about = None)]
pub struct CliArgs {
    /// Deposit records CSV
    #[arg(value_name = "RECORDS", help = "Path to the deposit records CSV file")]
    pub records_file: PathBuf,

    /// Observed chain transfers CSV
    #[arg(value_name = "CHAIN", help = "Path to the observed chain transfers CSV file")]
    pub chain_file: PathBuf,

    /// Fixed start time for a replayed run
    #[arg(
        long = "now",
        value_name = "RFC3339",
        value_parser = parse_now,
        help = "Replay on a manual clock starting at this time (default: system clock)"
    )]
    pub now: Option<DateTime<Utc>>,

    #[arg(
        long = "expiry-minutes",
        value_name = "MINUTES",
        help = "Expiry window for pending deposits (default: 30)"
    )]
    pub expiry_minutes: Option<u32>,

    #[arg(
        long = "oracle-timeout-ms",
        value_name = "MS",
        help = "Timeout for chain and price lookups (default: 10000)"
    )]
    pub oracle_timeout_ms: Option<u64>,

    #[arg(
        long = "store-timeout-ms",
        value_name = "MS",
        help = "Timeout for record store and balance ledger calls (default: 5000)"
    )]
    pub store_timeout_ms: Option<u64>,

    #[arg(
        long = "interval-ms",
        value_name = "MS",
        help = "Delay between polling rounds (default: 15000)"
    )]
    pub interval_ms: Option<u64>,

    #[arg(
        long = "max-rounds",
        value_name = "COUNT",
        help = "Maximum number of polling rounds (default: 120)"
    )]
    pub max_rounds: Option<usize>,

    #[arg(
        long = "max-concurrent",
        value_name = "COUNT",
        help = "Maximum verifications in flight (default: CPU cores)"
    )]
    pub max_concurrent: Option<usize>,

    /// USD quotes, repeatable
    #[arg(
        long = "price",
        value_name = "CURRENCY=USD",
        value_parser = parse_price,
        help = "USD quote for a currency, e.g. BTC=65000 (USDT defaults to 1)"
    )]
    pub prices: Vec<(Currency, Decimal)>,

    #[arg(
        long = "log-level",
        value_name = "LEVEL",
        default_value = "info",
        help = "Log filter used when RUST_LOG is unset"
    )]
    pub log_level: String,
}

fn parse_now(raw: &str) -> Result<DateTime<Utc>, String> {
    parse_timestamp(raw)
}

fn parse_price(raw: &str) -> Result<(Currency, Decimal), String> {
    let (currency, price) = raw
        .split_once('=')
        .ok_or_else(|| format!("Expected CURRENCY=USD, got '{}'", raw))?;
    let currency = Currency::from_str(currency.trim())?;
    let price = Decimal::from_str(price.trim())
        .map_err(|_| format!("Invalid price '{}'", price))?;
    if price <= Decimal::ZERO {
        return Err(format!("Price for {} must be positive", currency));
    }
    Ok((currency, price))
}

impl CliArgs {
    /// Create a SettlementConfig from CLI arguments
    ///
    /// Unset flags take the defaults; zero values are replaced by the
    /// defaults with a warning, as `SettlementConfig::new` does.
    pub fn to_settlement_config(&self) -> SettlementConfig {
        let default = SettlementConfig::default();
        SettlementConfig::new(
            self.expiry_minutes
                .map(|m| ChronoDuration::minutes(i64::from(m)))
                .unwrap_or(default.expiry_window),
            self.oracle_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(default.oracle_timeout),
            self.store_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(default.store_timeout),
            self.store_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(default.ledger_timeout),
        )
    }

    /// Create a PollerConfig from CLI arguments
    pub fn to_poller_config(&self) -> PollerConfig {
        if self.interval_ms.is_some() || self.max_rounds.is_some() || self.max_concurrent.is_some()
        {
            let default = PollerConfig::default();
            PollerConfig::new(
                self.interval_ms
                    .map(Duration::from_millis)
                    .unwrap_or(default.interval),
                self.max_rounds.unwrap_or(default.max_rounds),
                self.max_concurrent.unwrap_or(default.max_concurrent),
            )
        } else {
            PollerConfig::default()
        }
    }

    /// Price table with the USDT peg plus any `--price` overrides
    pub fn to_price_source(&self) -> FixedPriceSource {
        self.prices
            .iter()
            .fold(FixedPriceSource::usdt_pegged(), |prices, (currency, price)| {
                prices.with_quote(*currency, *price)
            })
    }

    pub fn to_run_options(&self) -> RunOptions {
        RunOptions {
            settlement: self.to_settlement_config(),
            poller: self.to_poller_config(),
            now: self.now,
            prices: self.to_price_source(),
        }
    }
}
