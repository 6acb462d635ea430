//! Callers of the settlement engine
//!
//! - `adapter` - Request extraction and response rendering for transports
//! - `poller` - Timer-driven verification of pending records
//! - `reconciler` - Repair job for completed records missing their credit
//! - `run` - Batch run over CSV inputs, used by the `settle` binary

pub mod adapter;
pub mod poller;
pub mod reconciler;
pub mod run;

pub use adapter::{handle_status_check, StatusResponse, VerifyRequest};
pub use poller::{Poller, PollerConfig, RoundReport};
pub use reconciler::{ReconciliationReport, Reconciler};
pub use run::{RunOptions, RunSummary, SettlementRun};
