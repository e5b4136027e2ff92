//! `PostgreSQL` implementation of the store traits.
//!
//! Queries are checked at runtime (`query_as` + `FromRow`) so the crate
//! builds without a live database. Row types stay private to this module and
//! are converted into domain types before leaving it.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use titi_core::{
    Identity, Order, OrderId, OrderItem, OrderStatus, PaymentId, PaymentState, PiUid, ProductId,
    ReturnId, ReviewId, Role, UnitPricing,
};

use super::{
    FeedbackStore, OrderStore, PaymentLedger, ProductCatalog, RepositoryError, UserStore,
};
use crate::models::{
    CatalogProduct, NewOrder, NewReturn, NewReview, PaymentRecord, PaymentUpdate, ReturnRequest,
    Review, UserRecord,
};

/// All storefront stores backed by one connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Attach line items to a batch of order rows, preserving row order.
    async fn hydrate(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>, RepositoryError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let item_rows = sqlx::query_as::<_, ItemRow>(
            r"
            SELECT order_id, product_id, seller_uid, name, quantity, price
            FROM storefront.order_items
            WHERE order_id = ANY($1)
            ORDER BY id ASC
            ",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in item_rows {
            let order_id = row.order_id;
            items.entry(order_id).or_default().push(row.try_into()?);
        }

        rows.into_iter()
            .map(|row| {
                let lines = items.remove(&row.id).unwrap_or_default();
                row.into_order(lines)
            })
            .collect()
    }
}

/// Map unique violations to `Conflict`, everything else to `Database`.
fn conflict_on_unique(message: &'static str) -> impl FnOnce(sqlx::Error) -> RepositoryError {
    move |e| {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.is_unique_violation()
        {
            return RepositoryError::Conflict(message.to_owned());
        }
        RepositoryError::Database(e)
    }
}

// =============================================================================
// Row types
// =============================================================================

#[derive(sqlx::FromRow)]
struct UserRow {
    uid: String,
    username: String,
    wallet_address: Option<String>,
    role: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            uid: PiUid::new(row.uid),
            username: row.username,
            wallet_address: row.wallet_address,
            role: row.role,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: String,
    seller_uid: String,
    name: String,
    price: Decimal,
    sale_price: Option<Decimal>,
    sale_start: Option<DateTime<Utc>>,
    sale_end: Option<DateTime<Utc>>,
}

impl From<ProductRow> for CatalogProduct {
    fn from(row: ProductRow) -> Self {
        Self {
            id: ProductId::new(row.id),
            seller_uid: PiUid::new(row.seller_uid),
            name: row.name,
            pricing: UnitPricing {
                price: row.price,
                sale_price: row.sale_price,
                sale_start: row.sale_start,
                sale_end: row.sale_end,
            },
        }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    buyer_uid: String,
    status: String,
    total: Decimal,
    note: Option<String>,
    payment_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order, RepositoryError> {
        let status = self.status.parse::<OrderStatus>().map_err(|e| {
            RepositoryError::DataCorruption(format!("order {}: {e}", self.id))
        })?;

        Ok(Order {
            id: OrderId::from_uuid(self.id),
            buyer_uid: PiUid::new(self.buyer_uid),
            status,
            total: self.total,
            note: self.note,
            payment_id: self.payment_id.map(PaymentId::new),
            created_at: self.created_at,
            items,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    order_id: Uuid,
    product_id: String,
    seller_uid: String,
    name: String,
    quantity: i32,
    price: Decimal,
}

impl TryFrom<ItemRow> for OrderItem {
    type Error = RepositoryError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        let quantity = u32::try_from(row.quantity).map_err(|_| {
            RepositoryError::DataCorruption(format!(
                "negative quantity on order {}",
                row.order_id
            ))
        })?;

        Ok(Self {
            product_id: ProductId::new(row.product_id),
            seller_uid: PiUid::new(row.seller_uid),
            name: row.name,
            quantity,
            price: row.price,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    payment_id: String,
    state: String,
    buyer_uid: Option<String>,
    amount: Option<Decimal>,
    txid: Option<String>,
    order_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for PaymentRecord {
    type Error = RepositoryError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let state = row.state.parse::<PaymentState>().map_err(|e| {
            RepositoryError::DataCorruption(format!("payment {}: {e}", row.payment_id))
        })?;

        Ok(Self {
            payment_id: PaymentId::new(row.payment_id),
            state,
            buyer_uid: row.buyer_uid.map(PiUid::new),
            amount: row.amount,
            txid: row.txid,
            order_id: row.order_id.map(OrderId::from_uuid),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const ORDER_COLUMNS: &str = "id, buyer_uid, status, total, note, payment_id, created_at";
const PAYMENT_COLUMNS: &str =
    "payment_id, state, buyer_uid, amount, txid, order_id, created_at, updated_at";

// =============================================================================
// Users
// =============================================================================

#[async_trait]
impl UserStore for PgStore {
    async fn find_user(&self, uid: &PiUid) -> Result<Option<UserRecord>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            SELECT uid, username, wallet_address, role, created_at, updated_at
            FROM storefront.users
            WHERE uid = $1
            ",
        )
        .bind(uid.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserRecord::from))
    }

    async fn upsert_user(
        &self,
        identity: &Identity,
        role_if_new: Role,
    ) -> Result<UserRecord, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            INSERT INTO storefront.users AS u (uid, username, wallet_address, role)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (uid) DO UPDATE
            SET username = EXCLUDED.username,
                wallet_address = COALESCE(EXCLUDED.wallet_address, u.wallet_address),
                updated_at = now()
            RETURNING uid, username, wallet_address, role, created_at, updated_at
            ",
        )
        .bind(identity.uid.as_str())
        .bind(&identity.username)
        .bind(identity.wallet_address.as_deref())
        .bind(role_if_new.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn set_role(&self, uid: &PiUid, role: Role) -> Result<UserRecord, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            UPDATE storefront.users
            SET role = $2, updated_at = now()
            WHERE uid = $1
            RETURNING uid, username, wallet_address, role, created_at, updated_at
            ",
        )
        .bind(uid.as_str())
        .bind(role.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRecord::from).ok_or(RepositoryError::NotFound)
    }
}

// =============================================================================
// Catalog
// =============================================================================

#[async_trait]
impl ProductCatalog for PgStore {
    async fn products_by_ids(
        &self,
        ids: &[ProductId],
    ) -> Result<Vec<CatalogProduct>, RepositoryError> {
        let ids: Vec<String> = ids.iter().map(|id| id.as_str().to_owned()).collect();

        let rows = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT id, seller_uid, name, price, sale_price, sale_start, sale_end
            FROM storefront.products
            WHERE id = ANY($1) AND active
            ",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CatalogProduct::from).collect())
    }
}

// =============================================================================
// Orders
// =============================================================================

#[async_trait]
impl OrderStore for PgStore {
    async fn insert_order(&self, order: &NewOrder) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            INSERT INTO storefront.orders (id, buyer_uid, status, total, note, payment_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(OrderId::generate().as_uuid())
        .bind(order.buyer_uid().as_str())
        .bind(OrderStatus::Pending.as_str())
        .bind(order.total())
        .bind(order.note())
        .bind(order.payment_id().map(PaymentId::as_str))
        .fetch_one(&mut *tx)
        .await
        .map_err(conflict_on_unique("payment already recorded"))?;

        for item in order.items() {
            let quantity = i32::try_from(item.quantity).map_err(|_| {
                RepositoryError::DataCorruption(format!("quantity {} out of range", item.quantity))
            })?;

            sqlx::query(
                r"
                INSERT INTO storefront.order_items
                    (order_id, product_id, seller_uid, name, quantity, price)
                VALUES ($1, $2, $3, $4, $5, $6)
                ",
            )
            .bind(row.id)
            .bind(item.product_id.as_str())
            .bind(item.seller_uid.as_str())
            .bind(&item.name)
            .bind(quantity)
            .bind(item.price)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        row.into_order(order.items().to_vec())
    }

    async fn order_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.orders WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(self.hydrate(row.into_iter().collect()).await?.pop())
    }

    async fn order_by_payment_id(
        &self,
        payment_id: &PaymentId,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM storefront.orders WHERE payment_id = $1"
        ))
        .bind(payment_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(self.hydrate(row.into_iter().collect()).await?.pop())
    }

    async fn orders_by_buyer(&self, buyer: &PiUid) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            SELECT {ORDER_COLUMNS}
            FROM storefront.orders
            WHERE buyer_uid = $1
            ORDER BY created_at DESC
            "
        ))
        .bind(buyer.as_str())
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn orders_by_seller(
        &self,
        seller: &PiUid,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r"
            SELECT {ORDER_COLUMNS}
            FROM storefront.orders o
            WHERE EXISTS (
                SELECT 1 FROM storefront.order_items i
                WHERE i.order_id = o.id AND i.seller_uid = $1
            )
            AND ($2::text IS NULL OR o.status = $2)
            ORDER BY o.created_at DESC
            "
        ))
        .bind(seller.as_str())
        .bind(status.as_ref().map(OrderStatus::as_str))
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.orders
            SET status = $2, updated_at = now()
            WHERE id = $1
            ",
        )
        .bind(id.as_uuid())
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// =============================================================================
// Payment ledger
// =============================================================================

#[async_trait]
impl PaymentLedger for PgStore {
    async fn record_payment(
        &self,
        update: PaymentUpdate,
    ) -> Result<PaymentRecord, RepositoryError> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            r"
            INSERT INTO storefront.payments AS p (payment_id, state, buyer_uid, amount, txid)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (payment_id) DO UPDATE
            SET state = EXCLUDED.state,
                buyer_uid = COALESCE(EXCLUDED.buyer_uid, p.buyer_uid),
                amount = COALESCE(EXCLUDED.amount, p.amount),
                txid = COALESCE(EXCLUDED.txid, p.txid),
                updated_at = now()
            RETURNING {PAYMENT_COLUMNS}
            "
        ))
        .bind(update.payment_id.as_str())
        .bind(update.state.as_str())
        .bind(update.buyer_uid.as_ref().map(PiUid::as_str))
        .bind(update.amount)
        .bind(update.txid.as_deref())
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn payment(
        &self,
        payment_id: &PaymentId,
    ) -> Result<Option<PaymentRecord>, RepositoryError> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM storefront.payments WHERE payment_id = $1"
        ))
        .bind(payment_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(PaymentRecord::try_from).transpose()
    }

    async fn link_order(
        &self,
        payment_id: &PaymentId,
        order_id: OrderId,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.payments
            SET order_id = $2, updated_at = now()
            WHERE payment_id = $1
            ",
        )
        .bind(payment_id.as_str())
        .bind(order_id.as_uuid())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn stale_payments(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<PaymentRecord>, RepositoryError> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            r"
            SELECT {PAYMENT_COLUMNS}
            FROM storefront.payments
            WHERE updated_at < $1
              AND (state IN ('created', 'approved')
                   OR (state = 'completed' AND order_id IS NULL))
            ORDER BY updated_at ASC
            "
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PaymentRecord::try_from).collect()
    }
}

// =============================================================================
// Feedback
// =============================================================================

#[derive(sqlx::FromRow)]
struct ReturnRow {
    id: Uuid,
    order_id: Uuid,
    buyer_uid: String,
    reason: String,
    images: Vec<String>,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ReviewRow {
    id: Uuid,
    order_id: Uuid,
    buyer_uid: String,
    rating: i16,
    comment: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ReviewRow> for Review {
    type Error = RepositoryError;

    fn try_from(row: ReviewRow) -> Result<Self, Self::Error> {
        let rating = u8::try_from(row.rating).map_err(|_| {
            RepositoryError::DataCorruption(format!("rating {} out of range", row.rating))
        })?;

        Ok(Self {
            id: ReviewId::from_uuid(row.id),
            order_id: OrderId::from_uuid(row.order_id),
            buyer_uid: PiUid::new(row.buyer_uid),
            rating,
            comment: row.comment,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl FeedbackStore for PgStore {
    async fn insert_return(&self, request: &NewReturn) -> Result<ReturnRequest, RepositoryError> {
        let row = sqlx::query_as::<_, ReturnRow>(
            r"
            INSERT INTO storefront.returns (id, order_id, buyer_uid, reason, images)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, order_id, buyer_uid, reason, images, created_at
            ",
        )
        .bind(ReturnId::generate().as_uuid())
        .bind(request.order_id.as_uuid())
        .bind(request.buyer_uid.as_str())
        .bind(&request.reason)
        .bind(request.images.clone())
        .fetch_one(&self.pool)
        .await?;

        Ok(ReturnRequest {
            id: ReturnId::from_uuid(row.id),
            order_id: OrderId::from_uuid(row.order_id),
            buyer_uid: PiUid::new(row.buyer_uid),
            reason: row.reason,
            images: row.images,
            created_at: row.created_at,
        })
    }

    async fn insert_review(&self, review: &NewReview) -> Result<Review, RepositoryError> {
        let row = sqlx::query_as::<_, ReviewRow>(
            r"
            INSERT INTO storefront.reviews (id, order_id, buyer_uid, rating, comment)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, order_id, buyer_uid, rating, comment, created_at
            ",
        )
        .bind(ReviewId::generate().as_uuid())
        .bind(review.order_id.as_uuid())
        .bind(review.buyer_uid.as_str())
        .bind(i16::from(review.rating))
        .bind(&review.comment)
        .fetch_one(&self.pool)
        .await
        .map_err(conflict_on_unique("order already reviewed"))?;

        row.try_into()
    }

    async fn review_for(
        &self,
        order_id: OrderId,
        buyer: &PiUid,
    ) -> Result<Option<Review>, RepositoryError> {
        let row = sqlx::query_as::<_, ReviewRow>(
            r"
            SELECT id, order_id, buyer_uid, rating, comment, created_at
            FROM storefront.reviews
            WHERE order_id = $1 AND buyer_uid = $2
            ",
        )
        .bind(order_id.as_uuid())
        .bind(buyer.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Review::try_from).transpose()
    }
}
