//! Identity verification against Pi Network.
//!
//! The identity provider turns a bearer access token into a verified
//! [`Identity`]. It is the only source of "who is calling"; nothing the
//! client sends about itself is trusted.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use titi_core::{Identity, PiUid};

use crate::config::PiConfig;

/// Errors that can occur when verifying an access token.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-2xx status.
    #[error("identity provider rejected token: {0}")]
    Rejected(StatusCode),

    /// The provider answered 2xx but the body is not a usable identity.
    #[error("malformed identity response: {0}")]
    Malformed(String),
}

/// Anything that can vouch for an access token.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verify `token` and return the identity it belongs to.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError` if the token is not accepted.
    async fn verify(&self, token: &str) -> Result<Identity, IdentityError>;
}

/// Client for Pi Network's `/me` endpoint.
#[derive(Clone)]
pub struct PiIdentityClient {
    client: reqwest::Client,
    me_url: String,
}

impl PiIdentityClient {
    /// Create a client against the configured Pi API base URL.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &PiConfig) -> Result<Self, IdentityError> {
        let client = reqwest::Client::builder().build()?;

        Ok(Self {
            client,
            me_url: format!("{}/me", config.api_base_url),
        })
    }
}

#[async_trait]
impl IdentityProvider for PiIdentityClient {
    async fn verify(&self, token: &str) -> Result<Identity, IdentityError> {
        let response = self.client.get(&self.me_url).bearer_auth(token).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(IdentityError::Rejected(status));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| IdentityError::Malformed(e.to_string()))?;

        parse_identity(&body)
    }
}

/// Extract an identity from a `/me` response body.
///
/// `uid` must be a string. `username` defaults to empty. The wallet is read
/// from `wallet_address` or `walletAddress`.
///
/// # Errors
///
/// Returns `IdentityError::Malformed` if `uid` is missing or not a string.
pub fn parse_identity(body: &Value) -> Result<Identity, IdentityError> {
    let uid = body
        .get("uid")
        .and_then(Value::as_str)
        .filter(|uid| !uid.is_empty())
        .ok_or_else(|| IdentityError::Malformed("missing uid".to_string()))?;

    let username = body
        .get("username")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let wallet_address = body
        .get("wallet_address")
        .or_else(|| body.get("walletAddress"))
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(Identity {
        uid: PiUid::new(uid),
        username: username.to_string(),
        wallet_address,
    })
}

/// Identity provider backed by a fixed token table.
///
/// Used by tests and the integration harness in place of Pi Network. An
/// optional delay simulates a slow provider.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityProvider {
    tokens: HashMap<String, Identity>,
    delay: Option<Duration>,
}

impl StaticIdentityProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` as `identity`.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, identity: Identity) -> Self {
        self.tokens.insert(token.into(), identity);
        self
    }

    /// Sleep this long before answering every call.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn verify(&self, token: &str) -> Result<Identity, IdentityError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.tokens
            .get(token)
            .cloned()
            .ok_or(IdentityError::Rejected(StatusCode::UNAUTHORIZED))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::PiNetwork;

    async fn client_for(server: &MockServer) -> PiIdentityClient {
        let config = PiConfig::with_base_url(
            PiNetwork::Sandbox,
            &format!("{}/v2", server.uri()),
            SecretString::from("unused"),
        )
        .unwrap();
        PiIdentityClient::new(&config).unwrap()
    }

    #[test]
    fn test_parse_accepts_both_wallet_spellings() {
        let snake = parse_identity(&json!({"uid": "u1", "username": "alice", "wallet_address": "GABC"}))
            .unwrap();
        assert_eq!(snake.wallet_address.as_deref(), Some("GABC"));

        let camel = parse_identity(&json!({"uid": "u1", "walletAddress": "GDEF"})).unwrap();
        assert_eq!(camel.wallet_address.as_deref(), Some("GDEF"));
        assert_eq!(camel.username, "");
    }

    #[test]
    fn test_parse_rejects_non_string_uid() {
        assert!(matches!(
            parse_identity(&json!({"uid": 42})),
            Err(IdentityError::Malformed(_))
        ));
        assert!(matches!(
            parse_identity(&json!({"username": "alice"})),
            Err(IdentityError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_verify_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/me"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "uid": "u1",
                "username": "alice"
            })))
            .mount(&server)
            .await;

        let identity = client_for(&server).await.verify("tok").await.unwrap();
        assert_eq!(identity.uid.as_str(), "u1");
        assert_eq!(identity.username, "alice");
    }

    #[tokio::test]
    async fn test_verify_maps_non_2xx_to_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/me"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = client_for(&server).await.verify("bad").await.unwrap_err();
        assert!(matches!(err, IdentityError::Rejected(StatusCode::UNAUTHORIZED)));
    }
}
