//! Thin transport adapter for status-check requests
//!
//! Any number of transports (HTTP routes, RPC handlers, a CLI) can front the
//! engine. They differ only in how they extract the request parameters and
//! how they render the outcome; this module holds both halves so that
//! settlement logic never leaks into a handler.

use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;
use tracing::{error, warn};

use crate::core::SettlementEngine;
use crate::types::{Currency, RecordId, SettlementError, VerificationOutcome};

/// Parameters of one verification request
#[derive(Debug, Clone, PartialEq)]
pub struct VerifyRequest {
    pub id: RecordId,
    pub currency: Currency,
    pub min_amount: Decimal,
}

impl VerifyRequest {
    /// Build a request from raw query parameters
    ///
    /// `currency` is required and must be `BTC` or `USDT`. `min_amount`
    /// defaults to zero when absent or blank; a value that does not parse, or
    /// is negative, is rejected.
    ///
    /// # Returns
    ///
    /// * `Ok(VerifyRequest)` - Parameters are valid
    /// * `Err(StatusResponse)` - A ready-to-send 400 response
    pub fn from_query(
        id: &str,
        currency: Option<&str>,
        min_amount: Option<&str>,
    ) -> Result<Self, StatusResponse> {
        let currency = currency
            .and_then(|c| Currency::from_str(c).ok())
            .ok_or_else(|| StatusResponse::bad_request("Missing parameters"))?;

        let min_amount = match min_amount.map(str::trim) {
            None | Some("") => Decimal::ZERO,
            Some(raw) => match Decimal::from_str(raw) {
                Ok(value) if value >= Decimal::ZERO => value,
                _ => return Err(StatusResponse::bad_request("Invalid minAmount")),
            },
        };

        Ok(VerifyRequest {
            id: id.to_string(),
            currency,
            min_amount,
        })
    }
}

/// Response body of a status check, plus the transport status it maps to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<&'static str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip)]
    pub status_code: u16,
}

impl StatusResponse {
    fn ok(status: &'static str, tx_hash: Option<String>) -> Self {
        Self {
            status: Some(status),
            tx_hash,
            error: None,
            status_code: 200,
        }
    }

    fn bad_request(message: &str) -> Self {
        Self {
            status: None,
            tx_hash: None,
            error: Some(message.to_string()),
            status_code: 400,
        }
    }

    fn failure(message: &str, status_code: u16) -> Self {
        Self {
            status: Some("failed"),
            tx_hash: None,
            error: Some(message.to_string()),
            status_code,
        }
    }

    /// Render the result of `verify_once`
    ///
    /// An unavailable oracle is shown to the end user as still pending; the
    /// distinction only shows up in the logs. Every other error is reported,
    /// never folded into a success.
    pub fn render(id: &str, result: &Result<VerificationOutcome, SettlementError>) -> Self {
        match result {
            Ok(VerificationOutcome::Confirmed { tx_hash }) => {
                Self::ok("confirmed", Some(tx_hash.clone()))
            }
            Ok(VerificationOutcome::Pending) => Self::ok("pending", None),
            Ok(VerificationOutcome::Failed) => Self::ok("failed", None),
            Err(SettlementError::NotFound { .. }) => Self::failure("Transaction not found", 404),
            Err(e @ SettlementError::OracleUnavailable { .. }) => {
                warn!(record = %id, error = %e, "Reporting pending while oracle is unavailable");
                Self::ok("pending", None)
            }
            Err(e) => {
                error!(record = %id, error = %e, "Error verifying transaction");
                Self::failure("Failed to verify transaction", 500)
            }
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Handle one status check end to end
pub async fn handle_status_check(
    engine: &SettlementEngine,
    id: &str,
    currency: Option<&str>,
    min_amount: Option<&str>,
) -> StatusResponse {
    let request = match VerifyRequest::from_query(id, currency, min_amount) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let result = engine
        .verify_once(&request.id, request.currency, request.min_amount)
        .await;
    StatusResponse::render(&request.id, &result)
}
