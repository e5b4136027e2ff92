//! Integration test harness for TiTi Mall.
//!
//! [`TestContext`] runs the real storefront router on an ephemeral port,
//! backed by the in-memory store, a fixed table of Pi access tokens and a
//! wiremock server standing in for the Pi payments API. Nothing external
//! is needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p titi-integration-tests
//! ```

#![allow(clippy::missing_panics_doc, clippy::unwrap_used)]

use std::net::SocketAddr;
use std::sync::Arc;

use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use titi_checkout::{CartStore, CheckoutOrchestrator, MemoryStorage, PaymentJournal, StorefrontClient};
use titi_core::{Identity, PiUid, ProductId, UnitPricing};
use titi_storefront::config::{IdentityConfig, PiConfig, PiNetwork, SellerAllowList};
use titi_storefront::db::{MemoryStore, Stores};
use titi_storefront::models::CatalogProduct;
use titi_storefront::pi::PiClient;
use titi_storefront::services::identity::StaticIdentityProvider;
use titi_storefront::{AppState, PiRateLimit, app};

/// Access token accepted for the test buyer `u1`.
pub const BUYER_TOKEN: &str = "buyer-token";
/// Access token accepted for the seller `s1`, allow-listed by username.
pub const SELLER_TOKEN: &str = "seller-token";

/// A running storefront and its fakes.
pub struct TestContext {
    pub base_url: String,
    pub store: Arc<MemoryStore>,
    pub pi: MockServer,
}

impl TestContext {
    /// Start a storefront selling `p1` (10 Pi, on sale for 8 right now)
    /// and `p2` (3 Pi), both from seller `s1`.
    pub async fn start() -> Self {
        let store = Arc::new(MemoryStore::with_products([
            CatalogProduct {
                id: ProductId::new("p1"),
                seller_uid: PiUid::new("s1"),
                name: "Pi Tea".to_string(),
                pricing: UnitPricing {
                    sale_price: Some(Decimal::new(8, 0)),
                    ..UnitPricing::list(Decimal::new(10, 0))
                },
            },
            CatalogProduct {
                id: ProductId::new("p2"),
                seller_uid: PiUid::new("s1"),
                name: "Pi Mug".to_string(),
                pricing: UnitPricing::list(Decimal::new(3, 0)),
            },
        ]));

        let identity = StaticIdentityProvider::new()
            .with_token(BUYER_TOKEN, identity("u1", "buyer"))
            .with_token(SELLER_TOKEN, identity("s1", "teashop"));

        let pi = MockServer::start().await;
        let pi_config = PiConfig::with_base_url(
            PiNetwork::Sandbox,
            &format!("{}/v2", pi.uri()),
            SecretString::from("integration-key"),
        )
        .unwrap();

        let state = AppState::new(
            Stores::from_backend(store.clone()),
            Arc::new(identity),
            PiClient::new(&pi_config).unwrap(),
            &IdentityConfig::default(),
            SellerAllowList::new(["teashop"], Vec::<String>::new()),
        );
        let router = app(state, PiRateLimit::PerClientIp);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            store,
            pi,
        }
    }

    /// Answer every approve, complete and cancel call with 200.
    pub async fn accept_all_payments(&self) {
        Mock::given(method("POST"))
            .and(path_regex(r"^/v2/payments/[^/]+/(approve|complete|cancel)$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .mount(&self.pi)
            .await;
    }

    /// A checkout for `token` over its own in-memory client storage.
    pub async fn checkout(&self, token: &str) -> (Arc<CartStore>, PaymentJournal, CheckoutOrchestrator) {
        let storage = Arc::new(MemoryStorage::new());
        let cart = Arc::new(CartStore::load(storage.clone()).await.unwrap());
        let journal = PaymentJournal::new(storage);
        let client = StorefrontClient::new(&self.base_url, &SecretString::from(token)).unwrap();
        let orchestrator = CheckoutOrchestrator::new(cart.clone(), journal.clone(), client);
        (cart, journal, orchestrator)
    }

    /// A bare HTTP client for direct API calls.
    #[must_use]
    pub fn http(&self) -> reqwest::Client {
        reqwest::Client::new()
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

fn identity(uid: &str, username: &str) -> Identity {
    Identity {
        uid: PiUid::new(uid),
        username: username.to_string(),
        wallet_address: None,
    }
}
