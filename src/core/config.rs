//! Settlement configuration and the expiry policy

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use tracing::warn;

/// Settlement engine configuration
///
/// Controls how long a deposit may stay pending and how long each
/// collaborator call may take before it is treated as unavailable.
#[derive(Clone, Debug, PartialEq)]
pub struct SettlementConfig {
    /// Age after which a pending record fails
    pub expiry_window: ChronoDuration,
    /// Bound on one chain lookup or price quote
    pub oracle_timeout: Duration,
    /// Bound on one ledger-store call
    pub store_timeout: Duration,
    /// Bound on one balance-ledger call
    pub ledger_timeout: Duration,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            expiry_window: ChronoDuration::minutes(30),
            oracle_timeout: Duration::from_secs(10),
            store_timeout: Duration::from_secs(5),
            ledger_timeout: Duration::from_secs(5),
        }
    }
}

impl SettlementConfig {
    /// Create a config with custom values
    ///
    /// Zero (or negative) values are replaced by the defaults with a warning.
    pub fn new(
        expiry_window: ChronoDuration,
        oracle_timeout: Duration,
        store_timeout: Duration,
        ledger_timeout: Duration,
    ) -> Self {
        let default = Self::default();

        let expiry_window = if expiry_window <= ChronoDuration::zero() {
            warn!(
                "Invalid expiry window ({}), using default ({})",
                expiry_window, default.expiry_window
            );
            default.expiry_window
        } else {
            expiry_window
        };

        Self {
            expiry_window,
            oracle_timeout: positive_or(oracle_timeout, default.oracle_timeout, "oracle_timeout"),
            store_timeout: positive_or(store_timeout, default.store_timeout, "store_timeout"),
            ledger_timeout: positive_or(ledger_timeout, default.ledger_timeout, "ledger_timeout"),
        }
    }

    /// The expiry policy derived from this config
    pub fn expiry_policy(&self) -> ExpiryPolicy {
        ExpiryPolicy::new(self.expiry_window)
    }
}

fn positive_or(value: Duration, default: Duration, name: &str) -> Duration {
    if value.is_zero() {
        warn!("Invalid {} ({:?}), using default ({:?})", name, value, default);
        default
    } else {
        value
    }
}

/// Time-based expiry of pending records
///
/// A record is expired when strictly more than `window` has elapsed since it
/// was initiated: at exactly `initiated_at + window` it is still live.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExpiryPolicy {
    window: ChronoDuration,
}

impl ExpiryPolicy {
    pub fn new(window: ChronoDuration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> ChronoDuration {
        self.window
    }

    /// Last instant at which a record initiated at `initiated_at` is live
    pub fn deadline(&self, initiated_at: DateTime<Utc>) -> DateTime<Utc> {
        initiated_at + self.window
    }

    pub fn is_expired(&self, initiated_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - initiated_at > self.window
    }
}
