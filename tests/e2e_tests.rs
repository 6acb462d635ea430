//! End-to-end integration tests
//!
//! These tests validate the complete settlement pipeline using predefined CSV
//! fixtures. Each test:
//! 1. Reads records.csv and chain.csv from a fixture directory
//! 2. Replays polling rounds on a manual clock starting at 12:00:00Z,
//!    one minute per round, then runs one reconciliation pass
//! 3. Writes the records and balances reports
//! 4. Compares actual output with expected.csv
//!
//! Test fixtures are located in tests/fixtures/ and cover:
//! - Happy path settlement
//! - Strict expiry, including a record exactly at the window boundary
//! - Transfers that only become visible after a few rounds
//! - Terminal input records and reconciliation of an uncredited completion
//! - Malformed rows and duplicate record ids

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use deposit_settlement_engine::core::{FixedPriceSource, SettlementConfig};
    use deposit_settlement_engine::service::{PollerConfig, RunOptions, SettlementRun};
    use deposit_settlement_engine::types::Currency;
    use rstest::rstest;
    use rust_decimal::Decimal;
    use std::fs;
    use std::io::Write;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn replay_options(max_concurrent: usize) -> RunOptions {
        RunOptions {
            settlement: SettlementConfig::default(),
            poller: PollerConfig::new(Duration::from_secs(60), 60, max_concurrent),
            now: Some(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()),
            prices: FixedPriceSource::usdt_pegged()
                .with_quote(Currency::Btc, Decimal::new(60000, 0)),
        }
    }

    /// Run a fixture and compare the combined report with expected.csv
    ///
    /// # Panics
    ///
    /// Panics if a fixture file is missing or the output differs.
    fn run_test_fixture(fixture_name: &str, max_concurrent: usize) {
        let fixture_dir = format!("tests/fixtures/{}", fixture_name);
        let records_path = format!("{}/records.csv", fixture_dir);
        let chain_path = format!("{}/chain.csv", fixture_dir);
        let expected_path = format!("{}/expected.csv", fixture_dir);

        for path in [&records_path, &chain_path, &expected_path] {
            assert!(Path::new(path).exists(), "Fixture file not found: {}", path);
        }

        let run = SettlementRun::new(replay_options(max_concurrent));
        let mut temp_output = NamedTempFile::new().expect("Failed to create temp file");

        run.process(
            Path::new(&records_path),
            Path::new(&chain_path),
            &mut temp_output,
        )
        .unwrap_or_else(|e| panic!("Failed to run settlement: {}", e));

        temp_output.flush().expect("Failed to flush temp file");

        let actual_output = fs::read_to_string(temp_output.path())
            .unwrap_or_else(|e| panic!("Failed to read temp output file: {}", e));
        let expected_output = fs::read_to_string(&expected_path)
            .unwrap_or_else(|e| panic!("Failed to read expected file {}: {}", expected_path, e));

        assert_eq!(
            actual_output, expected_output,
            "\n\nOutput mismatch for fixture: {} (max_concurrent: {})\n\nActual output:\n{}\n\nExpected output:\n{}\n",
            fixture_name, max_concurrent, actual_output, expected_output
        );
    }

    /// Every fixture, run with one verification in flight and with several
    #[rstest]
    #[case("happy_path")]
    #[case("expiry_window")]
    #[case("late_arrival")]
    #[case("terminal_and_reconcile")]
    #[case("malformed_data")]
    fn test_fixtures(#[case] fixture: &str, #[values(1, 8)] max_concurrent: usize) {
        run_test_fixture(fixture, max_concurrent);
    }

    #[test]
    fn test_btc_input_without_btc_quote_is_fatal() {
        let run = SettlementRun::new(RunOptions {
            now: Some(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()),
            ..RunOptions::default()
        });
        let mut output = Vec::new();

        let err = run
            .process(
                Path::new("tests/fixtures/happy_path/records.csv"),
                Path::new("tests/fixtures/happy_path/chain.csv"),
                &mut output,
            )
            .unwrap_err();

        assert!(err.contains("--price BTC=<USD>"), "unexpected error: {}", err);
        assert!(output.is_empty());
    }

    #[test]
    fn test_missing_records_file_is_fatal() {
        let run = SettlementRun::new(replay_options(1));
        let mut output = Vec::new();

        let err = run
            .process(
                Path::new("tests/fixtures/does_not_exist/records.csv"),
                Path::new("tests/fixtures/happy_path/chain.csv"),
                &mut output,
            )
            .unwrap_err();

        assert!(err.contains("Failed to open file"), "unexpected error: {}", err);
        assert!(output.is_empty());
    }
}
