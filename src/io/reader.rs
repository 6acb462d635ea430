//! Streaming CSV reader for deposit records and chain transfers
//!
//! `CsvFileReader<T>` reads one row at a time and converts it through the
//! row type's `FromCsvRow` impl. Fatal errors (missing or unreadable file)
//! come back from `open`; bad rows are yielded as `Err` items carrying their
//! line number, and iteration continues past them.
//!
//! ```no_run
//! use deposit_settlement_engine::io::CsvFileReader;
//! use deposit_settlement_engine::types::DepositRecord;
//! use std::path::Path;
//!
//! let reader = CsvFileReader::<DepositRecord>::open(Path::new("records.csv")).unwrap();
//! let records: Vec<_> = reader.filter_map(Result::ok).collect();
//! println!("Loaded {} records", records.len());
//! ```

use csv::{ReaderBuilder, Trim};
use std::fs::File;
use std::marker::PhantomData;
use std::path::Path;
use tracing::warn;

use crate::io::csv_format::FromCsvRow;
use crate::types::SettlementError;

/// Iterator over the rows of one CSV file
#[derive(Debug)]
pub struct CsvFileReader<T> {
    reader: csv::Reader<File>,
    line_num: u64,
    _row: PhantomData<fn() -> T>,
}

impl<T: FromCsvRow> CsvFileReader<T> {
    /// Open a CSV file for streaming
    ///
    /// Fields are trimmed and rows may omit trailing empty cells.
    pub fn open(path: &Path) -> Result<Self, SettlementError> {
        let file = File::open(path).map_err(|e| SettlementError::IoError {
            message: format!("Failed to open file '{}': {}", path.display(), e),
        })?;

        let reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .buffer_capacity(8 * 1024)
            .from_reader(file);

        Ok(Self {
            reader,
            line_num: 0,
            _row: PhantomData,
        })
    }
}

impl<T: FromCsvRow> Iterator for CsvFileReader<T> {
    type Item = Result<T, SettlementError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut deserializer = self.reader.deserialize::<T::Row>();
        let row = deserializer.next()?;

        self.line_num += 1;
        // The header occupies line 1.
        let line = self.line_num + 1;

        Some(match row {
            Ok(row) => T::from_row(row).map_err(|e| SettlementError::invalid_record(Some(line), e)),
            Err(e) => Err(SettlementError::ParseError {
                line: Some(line),
                message: e.to_string(),
            }),
        })
    }
}

/// Read every valid row of a file, logging and skipping the bad ones
///
/// # Returns
///
/// * `Ok((rows, rejected))` - Parsed rows and the errors for skipped rows
/// * `Err(SettlementError)` - The file could not be opened
pub fn read_all<T: FromCsvRow>(
    path: &Path,
) -> Result<(Vec<T>, Vec<SettlementError>), SettlementError> {
    let mut rows = Vec::new();
    let mut rejected = Vec::new();

    for result in CsvFileReader::<T>::open(path)? {
        match result {
            Ok(row) => rows.push(row),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Skipping row");
                rejected.push(e);
            }
        }
    }

    Ok((rows, rejected))
}
