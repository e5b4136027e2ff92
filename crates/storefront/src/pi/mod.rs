//! Pi Network payments API client.
//!
//! # Endpoints
//!
//! - `POST {base}/payments` - create an app-to-user payment
//! - `GET  {base}/payments/{id}` - fetch a payment
//! - `POST {base}/payments/{id}/approve`
//! - `POST {base}/payments/{id}/complete` - body `{txid}`
//! - `POST {base}/payments/{id}/cancel`
//!
//! Every call is authenticated with `Authorization: Key <PI_API_KEY>`. The
//! client does not interpret upstream answers: status and body come back
//! as a [`PiResponse`] for the caller to relay.
//!
//! Payment ids come from unauthenticated callers, so each one must pass
//! [`is_valid_payment_id`] and is always sent as a single path segment.

pub mod types;

pub use types::*;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use thiserror::Error;
use url::Url;

use titi_core::PaymentId;

use crate::config::{PiConfig, PiNetwork};

/// Errors that can occur when talking to the Pi payments API.
#[derive(Debug, Error)]
pub enum PiError {
    /// HTTP request failed or timed out.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API key cannot be sent as a header.
    #[error("invalid API key format: {0}")]
    InvalidKey(String),

    /// The configured base URL cannot carry payment paths.
    #[error("invalid Pi API base URL: {0}")]
    InvalidBaseUrl(String),

    /// The payment id is not a plain Pi identifier.
    #[error("invalid payment id")]
    InvalidPaymentId,
}

const MAX_PAYMENT_ID_LEN: usize = 128;

/// Pi payment identifiers are short runs of ASCII letters, digits, `-` and `_`.
#[must_use]
pub fn is_valid_payment_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_PAYMENT_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Which server-side instruction to relay for a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentAction {
    Approve,
    Complete,
    Cancel,
}

impl PaymentAction {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Complete => "complete",
            Self::Cancel => "cancel",
        }
    }
}

/// Pi payments API client.
#[derive(Clone)]
pub struct PiClient {
    client: reqwest::Client,
    base_url: Url,
    network: PiNetwork,
}

impl PiClient {
    /// Create a new Pi payments client.
    ///
    /// # Errors
    ///
    /// Returns error if the API key is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &PiConfig) -> Result<Self, PiError> {
        let mut headers = HeaderMap::new();

        let auth_value = format!("Key {}", config.api_key());
        let mut auth_header = HeaderValue::from_str(&auth_value)
            .map_err(|e| PiError::InvalidKey(e.to_string()))?;
        auth_header.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth_header);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let base_url = Url::parse(&config.api_base_url)
            .map_err(|e| PiError::InvalidBaseUrl(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(PiError::InvalidBaseUrl(base_url.to_string()));
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.payment_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url,
            network: config.network,
        })
    }

    #[must_use]
    pub const fn network(&self) -> PiNetwork {
        self.network
    }

    /// Relay approve, complete or cancel for `payment_id`.
    ///
    /// `txid` is only sent for [`PaymentAction::Complete`].
    ///
    /// # Errors
    ///
    /// Returns `PiError::InvalidPaymentId` for an id that is not a plain
    /// identifier, and `PiError::Http` on network failure or timeout.
    /// Non-2xx answers are not errors.
    #[tracing::instrument(skip(self), fields(network = ?self.network))]
    pub async fn relay(
        &self,
        action: PaymentAction,
        payment_id: &PaymentId,
        txid: Option<&str>,
    ) -> Result<PiResponse, PiError> {
        let url = self.payments_url(Some(payment_id), Some(action))?;

        let request = match (action, txid) {
            (PaymentAction::Complete, Some(txid)) => self
                .client
                
                .post(url)
                .json(&CompletePaymentRequest { txid }),
            _ => self.client.post(url),
        };

        self.send(request).await
    }

    /// Create an app-to-user payment.
    ///
    /// # Errors
    ///
    /// Returns `PiError::Http` on network failure or timeout.
    #[tracing::instrument(skip(self, payment), fields(uid = %payment.uid, amount = %payment.amount))]
    pub async fn create_payment(&self, payment: NewPayment) -> Result<PiResponse, PiError> {
        let url = self.payments_url(None, None)?;
        let request = self
            .client
            .post(url)
            .json(&CreatePaymentRequest { payment });
        self.send(request).await
    }

    /// Fetch the Pi record of a payment.
    ///
    /// # Errors
    ///
    /// Returns `PiError::InvalidPaymentId` for an id that is not a plain
    /// identifier, and `PiError::Http` on network failure or timeout.
    pub async fn get_payment(&self, payment_id: &PaymentId) -> Result<PiResponse, PiError> {
        let url = self.payments_url(Some(payment_id), None)?;
        self.send(self.client.get(url)).await
    }

    /// `{base}/payments[/{id}[/{action}]]` with the id as one segment.
    fn payments_url(
        &self,
        payment_id: Option<&PaymentId>,
        action: Option<PaymentAction>,
    ) -> Result<Url, PiError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| PiError::InvalidBaseUrl(self.base_url.to_string()))?;
            segments.pop_if_empty().push("payments");
            if let Some(payment_id) = payment_id {
                if !is_valid_payment_id(payment_id.as_str()) {
                    return Err(PiError::InvalidPaymentId);
                }
                segments.push(payment_id.as_str());
            }
            if let Some(action) = action {
                segments.push(action.as_str());
            }
        }
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<PiResponse, PiError> {
        let response = request.send().await?;
        let status = response.status();
        let content_type = response.headers().get(CONTENT_TYPE).cloned();
        let body = response.bytes().await?;

        if !status.is_success() {
            tracing::warn!(status = %status, "Pi API returned non-success status");
        }

        Ok(PiResponse {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;
    use secrecy::SecretString;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client_for(server: &MockServer) -> PiClient {
        let config = PiConfig::with_base_url(
            PiNetwork::Sandbox,
            &format!("{}/v2", server.uri()),
            SecretString::from("test-key"),
        )
        .unwrap();
        PiClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_approve_uses_server_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/payments/pay_1/approve"))
            .and(header("authorization", "Key test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"identifier": "pay_1"})))
            .expect(1)
            .mount(&server)
            .await;

        let response = client_for(&server)
            .relay(PaymentAction::Approve, &PaymentId::new("pay_1"), None)
            .await
            .unwrap();
        assert!(response.is_success());
        assert_eq!(response.json().unwrap()["identifier"], "pay_1");
    }

    #[tokio::test]
    async fn test_complete_sends_txid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/payments/pay_1/complete"))
            .and(body_json(json!({"txid": "tx_9"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        let response = client_for(&server)
            .relay(PaymentAction::Complete, &PaymentId::new("pay_1"), Some("tx_9"))
            .await
            .unwrap();
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn test_upstream_errors_are_returned_not_raised() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/payments/pay_1/cancel"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"error": "payment_not_found"})),
            )
            .mount(&server)
            .await;

        let response = client_for(&server)
            .relay(PaymentAction::Cancel, &PaymentId::new("pay_1"), None)
            .await
            .unwrap();
        assert_eq!(response.status, reqwest::StatusCode::NOT_FOUND);
        assert_eq!(response.json().unwrap()["error"], "payment_not_found");
    }

    #[test]
    fn test_payment_id_shape() {
        assert!(is_valid_payment_id("pay_1"));
        assert!(is_valid_payment_id("aB3-x_9"));
        for bad in ["", "..", "../me", "pay/1", "pay?x=1", "pay#1", "pay%2F1", "pay 1"] {
            assert!(!is_valid_payment_id(bad), "{bad:?} accepted");
        }
        assert!(!is_valid_payment_id(&"x".repeat(MAX_PAYMENT_ID_LEN + 1)));
    }

    #[tokio::test]
    async fn test_traversal_payment_id_never_leaves_the_server() {
        let server = MockServer::start().await;
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let client = client_for(&server);

        for id in ["../me", "..", "x/../../me"] {
            let err = client
                .relay(PaymentAction::Approve, &PaymentId::new(id), None)
                .await
                .unwrap_err();
            assert!(matches!(err, PiError::InvalidPaymentId));
        }
        let err = client.get_payment(&PaymentId::new("../me")).await.unwrap_err();
        assert!(matches!(err, PiError::InvalidPaymentId));
    }

    #[tokio::test]
    async fn test_create_wraps_payment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/payments"))
            .and(body_json(json!({
                "payment": {"amount": 1.5, "memo": "Order", "metadata": {"k": 1}, "uid": "u1"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"identifier": "pay_2"})))
            .expect(1)
            .mount(&server)
            .await;

        let response = client_for(&server)
            .create_payment(NewPayment {
                amount: Decimal::new(15, 1),
                memo: "Order".to_string(),
                metadata: json!({"k": 1}),
                uid: "u1".to_string(),
            })
            .await
            .unwrap();
        assert!(response.is_success());
    }
}
