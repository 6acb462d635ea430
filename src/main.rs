//! Deposit settlement CLI
//!
//! Settles pending crypto deposits against a file of observed chain
//! transfers and prints the resulting records and balances.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- records.csv chain.csv > report.csv
//! cargo run -- --now 2024-06-01T12:00:00Z --interval-ms 60000 --price BTC=65000 records.csv chain.csv
//! RUST_LOG=debug cargo run -- records.csv chain.csv
//! ```
//!
//! Stdout holds the records report, a blank line, then the balances report.
//! Logs go to stderr.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (file not found, runtime failure, store failure, etc.)

use deposit_settlement_engine::cli;
use deposit_settlement_engine::service::SettlementRun;
use std::process;

fn main() {
    let args = cli::parse_args();
    cli::init_logging(&args.log_level);

    let run = SettlementRun::new(args.to_run_options());

    let mut output = std::io::stdout();
    if let Err(e) = run.process(&args.records_file, &args.chain_file, &mut output) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
