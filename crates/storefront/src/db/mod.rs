//! Storage for the storefront.
//!
//! # Database: `titi_storefront`
//!
//! ## Tables (schema `storefront`)
//!
//! - `users` - Pi users and their stored role
//! - `products` - Catalog rows order creation prices against
//! - `orders` / `order_items` - Recorded purchases; `orders.payment_id` is unique
//! - `payments` - Ledger of relayed Pi payments (`{payment_id, state}`)
//! - `returns` / `reviews` - Buyer feedback on orders
//!
//! Handlers only see the store traits below. [`PgStore`] backs them with
//! `PostgreSQL`; [`MemoryStore`] keeps everything in process for tests and
//! local development.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p titi-cli -- migrate
//! ```

pub mod memory;
pub mod postgres;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use titi_core::{Identity, Order, OrderId, OrderStatus, PaymentId, PiUid, ProductId, Role};

use crate::models::{
    CatalogProduct, NewOrder, NewReturn, NewReview, PaymentRecord, PaymentUpdate, ReturnRequest,
    Review, UserRecord,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., a payment already tied to an order).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Persisted Pi users and their roles.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, uid: &PiUid) -> Result<Option<UserRecord>, RepositoryError>;

    /// Insert the identity, or refresh username and wallet if already known.
    ///
    /// `role_if_new` is only written when the row is created; an existing
    /// role is left alone.
    async fn upsert_user(
        &self,
        identity: &Identity,
        role_if_new: Role,
    ) -> Result<UserRecord, RepositoryError>;

    /// Overwrite the stored role of an existing user.
    ///
    /// # Errors
    ///
    /// `RepositoryError::NotFound` if the user has never been stored.
    async fn set_role(&self, uid: &PiUid, role: Role) -> Result<UserRecord, RepositoryError>;
}

/// Read-only view of the product catalog.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Active products among `ids`. Unknown or inactive ids are simply absent.
    async fn products_by_ids(
        &self,
        ids: &[ProductId],
    ) -> Result<Vec<CatalogProduct>, RepositoryError>;
}

/// Orders and their line items.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist an order and all its items atomically, with status `pending`.
    ///
    /// # Errors
    ///
    /// `RepositoryError::Conflict` if the order's payment id is already recorded.
    async fn insert_order(&self, order: &NewOrder) -> Result<Order, RepositoryError>;

    async fn order_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    async fn order_by_payment_id(
        &self,
        payment_id: &PaymentId,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Orders placed by `buyer`, newest first.
    async fn orders_by_buyer(&self, buyer: &PiUid) -> Result<Vec<Order>, RepositoryError>;

    /// Orders with at least one item sold by `seller`, newest first.
    async fn orders_by_seller(
        &self,
        seller: &PiUid,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, RepositoryError>;

    /// # Errors
    ///
    /// `RepositoryError::NotFound` if the order does not exist.
    async fn update_status(&self, id: OrderId, status: OrderStatus)
    -> Result<(), RepositoryError>;

    /// Cheap connectivity check for readiness probes.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// Ledger of payments relayed to Pi.
#[async_trait]
pub trait PaymentLedger: Send + Sync {
    /// Insert or advance a payment record. `None` fields keep stored values.
    async fn record_payment(&self, update: PaymentUpdate)
    -> Result<PaymentRecord, RepositoryError>;

    async fn payment(&self, payment_id: &PaymentId)
    -> Result<Option<PaymentRecord>, RepositoryError>;

    /// Attach the order recorded for a completed payment.
    ///
    /// # Errors
    ///
    /// `RepositoryError::NotFound` if the ledger has no record of the payment.
    async fn link_order(
        &self,
        payment_id: &PaymentId,
        order_id: OrderId,
    ) -> Result<(), RepositoryError>;

    /// Open payments, and completed ones without an order, not touched since `cutoff`.
    async fn stale_payments(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<PaymentRecord>, RepositoryError>;
}

/// Return requests and reviews.
#[async_trait]
pub trait FeedbackStore: Send + Sync {
    async fn insert_return(&self, request: &NewReturn) -> Result<ReturnRequest, RepositoryError>;

    /// # Errors
    ///
    /// `RepositoryError::Conflict` if the buyer already reviewed the order.
    async fn insert_review(&self, review: &NewReview) -> Result<Review, RepositoryError>;

    async fn review_for(
        &self,
        order_id: OrderId,
        buyer: &PiUid,
    ) -> Result<Option<Review>, RepositoryError>;
}

/// Every store the handlers use, behind trait objects.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub catalog: Arc<dyn ProductCatalog>,
    pub orders: Arc<dyn OrderStore>,
    pub payments: Arc<dyn PaymentLedger>,
    pub feedback: Arc<dyn FeedbackStore>,
}

impl Stores {
    /// Use one backend for every store.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: UserStore + ProductCatalog + OrderStore + PaymentLedger + FeedbackStore + 'static,
    {
        Self {
            users: backend.clone(),
            catalog: backend.clone(),
            orders: backend.clone(),
            payments: backend.clone(),
            feedback: backend,
        }
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
