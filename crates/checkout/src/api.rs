//! Storefront API client used during checkout.
//!
//! Every call carries the buyer's Pi access token as a bearer token. The
//! payment relays answer with whatever Pi answered, so only the status is
//! inspected; order creation returns the recorded [`Order`].

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use url::Url;

use titi_core::{Order, PaymentId};

use crate::error::ClientError;
use crate::journal::JournalItem;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentCall<'a> {
    payment_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    txid: Option<&'a str>,
}

/// Body of `POST /orders`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrder<'a> {
    pub items: &'a [JournalItem],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<&'a str>,
    pub payment_id: &'a PaymentId,
    pub total: Decimal,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Client for the TiTi Mall storefront API.
#[derive(Clone)]
pub struct StorefrontClient {
    inner: Arc<StorefrontClientInner>,
}

struct StorefrontClientInner {
    client: reqwest::Client,
    base_url: Url,
}

impl StorefrontClient {
    /// Create a client for `base_url` acting as the holder of `token`.
    ///
    /// No timeout is set on payment calls: a hung relay keeps the checkout
    /// processing until the Pi SDK gives up.
    ///
    /// # Errors
    ///
    /// Returns an error for a URL that cannot be a base, a token that is not
    /// a valid header value, or an HTTP client that fails to build.
    pub fn new(base_url: &str, token: &SecretString) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, token, None)
    }

    /// Like [`Self::new`], bounding every call by `timeout`.
    ///
    /// # Errors
    ///
    /// See [`Self::new`].
    pub fn with_timeout(
        base_url: &str,
        token: &SecretString,
        timeout: Option<Duration>,
    ) -> Result<Self, ClientError> {
        let mut base_url =
            Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(base_url.to_string()));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
            .map_err(|_| ClientError::InvalidToken)?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            inner: Arc::new(StorefrontClientInner {
                client: builder.build()?,
                base_url,
            }),
        })
    }

    /// `POST /pi/approve`
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Rejected` for a non-2xx answer.
    #[tracing::instrument(skip(self, payment_id), fields(payment_id = %payment_id))]
    pub async fn approve(&self, payment_id: &PaymentId) -> Result<(), ClientError> {
        self.payment_call("pi/approve", payment_id, None).await
    }

    /// `POST /pi/complete`
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Rejected` for a non-2xx answer.
    #[tracing::instrument(skip(self, payment_id, txid), fields(payment_id = %payment_id))]
    pub async fn complete(&self, payment_id: &PaymentId, txid: &str) -> Result<(), ClientError> {
        self.payment_call("pi/complete", payment_id, Some(txid)).await
    }

    /// `POST /pi/cancel`
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Rejected` for a non-2xx answer.
    #[tracing::instrument(skip(self, payment_id), fields(payment_id = %payment_id))]
    pub async fn cancel(&self, payment_id: &PaymentId) -> Result<(), ClientError> {
        self.payment_call("pi/cancel", payment_id, None).await
    }

    /// `POST /orders`. Retrying with the same payment id returns the order
    /// already recorded.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Rejected` carrying the storefront error code.
    #[tracing::instrument(skip(self, order), fields(payment_id = %order.payment_id))]
    pub async fn create_order(&self, order: &CreateOrder<'_>) -> Result<Order, ClientError> {
        let response = self
            .inner
            .client
            .post(self.endpoint("orders")?)
            .json(order)
            .send()
            .await?;
        let response = check(response).await?;
        Ok(response.json().await?)
    }

    async fn payment_call(
        &self,
        path: &str,
        payment_id: &PaymentId,
        txid: Option<&str>,
    ) -> Result<(), ClientError> {
        let response = self
            .inner
            .client
            .post(self.endpoint(path)?)
            .json(&PaymentCall {
                payment_id: payment_id.as_str(),
                txid,
            })
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.inner
            .base_url
            .join(path)
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let code = response
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|body| body.error);
    tracing::warn!(status = %status, code = code.as_deref().unwrap_or("-"), "storefront call rejected");
    Err(ClientError::Rejected { status, code })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;
    use titi_core::ProductId;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client(server: &MockServer) -> StorefrontClient {
        StorefrontClient::new(&server.uri(), &SecretString::from("tok")).unwrap()
    }

    #[tokio::test]
    async fn test_approve_sends_bearer_and_payment_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pi/approve"))
            .and(header("authorization", "Bearer tok"))
            .and(body_json(json!({"paymentId": "pay-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).approve(&PaymentId::new("pay-1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_complete_sends_txid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/pi/complete"))
            .and(body_json(json!({"paymentId": "pay-1", "txid": "tx-9"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .complete(&PaymentId::new("pay-1"), "tx-9")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_rejection_carries_error_code() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "INVALID_ITEMS"})))
            .mount(&server)
            .await;

        let payment_id = PaymentId::new("pay-1");
        let err = client(&server)
            .create_order(&CreateOrder {
                items: &[],
                note: None,
                payment_id: &payment_id,
                total: Decimal::ZERO,
            })
            .await
            .unwrap_err();

        assert_eq!(err.code(), Some("INVALID_ITEMS"));
        assert!(matches!(err, ClientError::Rejected { status, .. } if status == reqwest::StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn test_base_path_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/pi/cancel"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            StorefrontClient::new(&format!("{}/api", server.uri()), &SecretString::from("t")).unwrap();
        client.cancel(&PaymentId::new("pay-1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_order_body_shape() {
        let server = MockServer::start().await;
        let order = json!({
            "id": "6f1c1f7e-3c1a-4c43-9a8e-2f3f6b3c9a10",
            "buyerUid": "u1",
            "status": "pending",
            "total": "16",
            "paymentId": "pay-1",
            "createdAt": "2026-01-01T00:00:00Z",
            "items": [{"productId": "p1", "sellerUid": "s1", "name": "P", "quantity": 2, "price": "8"}]
        });
        Mock::given(method("POST"))
            .and(path("/orders"))
            .and(body_json(json!({
                "items": [{"productId": "p1", "quantity": 2, "price": "8"}],
                "paymentId": "pay-1",
                "total": "16"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(order))
            .expect(1)
            .mount(&server)
            .await;

        let items = [JournalItem {
            product_id: ProductId::new("p1"),
            quantity: 2,
            price: Decimal::new(8, 0),
        }];
        let payment_id = PaymentId::new("pay-1");
        let created = client(&server)
            .create_order(&CreateOrder {
                items: &items,
                note: None,
                payment_id: &payment_id,
                total: Decimal::new(16, 0),
            })
            .await
            .unwrap();

        assert_eq!(created.total, Decimal::new(16, 0));
        assert_eq!(created.items.len(), 1);
    }
}
