//! I/O module
//!
//! Handles CSV parsing and output.
//!
//! # Components
//!
//! - `csv_format` - Row shapes, row conversion and report serialization
//! - `reader` - Streaming CSV file reader with an iterator interface

pub mod csv_format;
pub mod reader;

pub use csv_format::{write_balances_csv, write_records_csv, FromCsvRow};
pub use reader::{read_all, CsvFileReader};
