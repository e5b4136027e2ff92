//! Wire types for the Pi Network payments API.

use axum::body::Bytes;
use reqwest::StatusCode;
use reqwest::header::HeaderValue;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

/// An upstream response kept byte-for-byte so it can be relayed verbatim.
#[derive(Debug, Clone)]
pub struct PiResponse {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

impl PiResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// The body as JSON, if it is JSON.
    #[must_use]
    pub fn json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

/// Body of `POST /payments`.
#[derive(Debug, Clone, Serialize)]
pub struct CreatePaymentRequest {
    pub payment: NewPayment,
}

/// A payment to create on behalf of a Pi user.
#[derive(Debug, Clone, Serialize)]
pub struct NewPayment {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub memo: String,
    pub metadata: Value,
    pub uid: String,
}

/// Body of `POST /payments/{id}/complete`.
#[derive(Debug, Clone, Serialize)]
pub struct CompletePaymentRequest<'a> {
    pub txid: &'a str,
}
