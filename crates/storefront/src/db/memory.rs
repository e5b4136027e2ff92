//! In-process implementation of the store traits.
//!
//! Used by the test suites. Behaves like [`super::PgStore`] for
//! everything handlers can observe, including unique payment ids and one
//! review per order and buyer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use titi_core::{
    Identity, Order, OrderId, OrderStatus, PaymentId, PiUid, ProductId, ReturnId, ReviewId, Role,
};

use super::{
    FeedbackStore, OrderStore, PaymentLedger, ProductCatalog, RepositoryError, UserStore,
};
use crate::models::{
    CatalogProduct, NewOrder, NewReturn, NewReview, PaymentRecord, PaymentUpdate, ReturnRequest,
    Review, UserRecord,
};

#[derive(Default)]
struct Tables {
    users: HashMap<PiUid, UserRecord>,
    products: HashMap<ProductId, CatalogProduct>,
    /// Insertion order; listings walk it backwards for newest first.
    orders: Vec<Order>,
    payments: HashMap<PaymentId, PaymentRecord>,
    returns: Vec<ReturnRequest>,
    reviews: Vec<Review>,
}

/// All storefront stores held in memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    fail_user_lookups: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose catalog already holds `products`.
    #[must_use]
    pub fn with_products(products: impl IntoIterator<Item = CatalogProduct>) -> Self {
        let tables = Tables {
            products: products.into_iter().map(|p| (p.id.clone(), p)).collect(),
            ..Tables::default()
        };
        Self {
            tables: RwLock::new(tables),
            fail_user_lookups: AtomicBool::new(false),
        }
    }

    /// Store a user with an arbitrary raw role string.
    pub async fn insert_user(&self, user: UserRecord) {
        self.tables.write().await.users.insert(user.uid.clone(), user);
    }

    /// Make every `find_user` call fail, as a lost database connection would.
    pub fn fail_user_lookups(&self, fail: bool) {
        self.fail_user_lookups.store(fail, Ordering::SeqCst);
    }

    /// Number of orders recorded so far.
    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user(&self, uid: &PiUid) -> Result<Option<UserRecord>, RepositoryError> {
        if self.fail_user_lookups.load(Ordering::SeqCst) {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(self.tables.read().await.users.get(uid).cloned())
    }

    async fn upsert_user(
        &self,
        identity: &Identity,
        role_if_new: Role,
    ) -> Result<UserRecord, RepositoryError> {
        let mut tables = self.tables.write().await;
        let record = tables
            .users
            .entry(identity.uid.clone())
            .and_modify(|existing| {
                existing.username.clone_from(&identity.username);
                if identity.wallet_address.is_some() {
                    existing.wallet_address.clone_from(&identity.wallet_address);
                }
                existing.updated_at = Utc::now();
            })
            .or_insert_with(|| UserRecord::from_identity(identity, role_if_new));
        Ok(record.clone())
    }

    async fn set_role(&self, uid: &PiUid, role: Role) -> Result<UserRecord, RepositoryError> {
        let mut tables = self.tables.write().await;
        let record = tables.users.get_mut(uid).ok_or(RepositoryError::NotFound)?;
        record.role = Some(role.as_str().to_string());
        record.updated_at = Utc::now();
        Ok(record.clone())
    }
}

#[async_trait]
impl ProductCatalog for MemoryStore {
    async fn products_by_ids(
        &self,
        ids: &[ProductId],
    ) -> Result<Vec<CatalogProduct>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.products.get(id).cloned())
            .collect())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert_order(&self, order: &NewOrder) -> Result<Order, RepositoryError> {
        let mut tables = self.tables.write().await;

        if let Some(payment_id) = order.payment_id()
            && tables
                .orders
                .iter()
                .any(|o| o.payment_id.as_ref() == Some(payment_id))
        {
            return Err(RepositoryError::Conflict(
                "payment already recorded".to_string(),
            ));
        }

        // Same bound as the `INTEGER` column in Postgres.
        if let Some(item) = order
            .items()
            .iter()
            .find(|i| i32::try_from(i.quantity).is_err())
        {
            return Err(RepositoryError::DataCorruption(format!(
                "quantity {} out of range",
                item.quantity
            )));
        }

        let stored = Order {
            id: OrderId::generate(),
            buyer_uid: order.buyer_uid().clone(),
            status: OrderStatus::Pending,
            total: order.total(),
            note: order.note().map(str::to_string),
            payment_id: order.payment_id().cloned(),
            created_at: Utc::now(),
            items: order.items().to_vec(),
        };
        tables.orders.push(stored.clone());
        Ok(stored)
    }

    async fn order_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn order_by_payment_id(
        &self,
        payment_id: &PaymentId,
    ) -> Result<Option<Order>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .iter()
            .find(|o| o.payment_id.as_ref() == Some(payment_id))
            .cloned())
    }

    async fn orders_by_buyer(&self, buyer: &PiUid) -> Result<Vec<Order>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .iter()
            .rev()
            .filter(|o| &o.buyer_uid == buyer)
            .cloned()
            .collect())
    }

    async fn orders_by_seller(
        &self,
        seller: &PiUid,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .iter()
            .rev()
            .filter(|o| o.has_item_from(seller))
            .filter(|o| status.is_none_or(|s| o.status == s))
            .cloned()
            .collect())
    }

    async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        let order = tables
            .orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or(RepositoryError::NotFound)?;
        order.status = status;
        Ok(())
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[async_trait]
impl PaymentLedger for MemoryStore {
    async fn record_payment(
        &self,
        update: PaymentUpdate,
    ) -> Result<PaymentRecord, RepositoryError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let record = tables
            .payments
            .entry(update.payment_id.clone())
            .or_insert_with(|| PaymentRecord {
                payment_id: update.payment_id.clone(),
                state: update.state,
                buyer_uid: None,
                amount: None,
                txid: None,
                order_id: None,
                created_at: now,
                updated_at: now,
            });

        record.state = update.state;
        if update.buyer_uid.is_some() {
            record.buyer_uid = update.buyer_uid;
        }
        if update.amount.is_some() {
            record.amount = update.amount;
        }
        if update.txid.is_some() {
            record.txid = update.txid;
        }
        record.updated_at = now;
        Ok(record.clone())
    }

    async fn payment(
        &self,
        payment_id: &PaymentId,
    ) -> Result<Option<PaymentRecord>, RepositoryError> {
        Ok(self.tables.read().await.payments.get(payment_id).cloned())
    }

    async fn link_order(
        &self,
        payment_id: &PaymentId,
        order_id: OrderId,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        let record = tables
            .payments
            .get_mut(payment_id)
            .ok_or(RepositoryError::NotFound)?;
        record.order_id = Some(order_id);
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn stale_payments(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<PaymentRecord>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut stale: Vec<PaymentRecord> = tables
            .payments
            .values()
            .filter(|p| p.updated_at < cutoff)
            .filter(|p| p.state.is_open() || p.is_unrecorded())
            .cloned()
            .collect();
        stale.sort_by_key(|p| p.updated_at);
        Ok(stale)
    }
}

#[async_trait]
impl FeedbackStore for MemoryStore {
    async fn insert_return(&self, request: &NewReturn) -> Result<ReturnRequest, RepositoryError> {
        let stored = ReturnRequest {
            id: ReturnId::generate(),
            order_id: request.order_id,
            buyer_uid: request.buyer_uid.clone(),
            reason: request.reason.clone(),
            images: request.images.clone(),
            created_at: Utc::now(),
        };
        self.tables.write().await.returns.push(stored.clone());
        Ok(stored)
    }

    async fn insert_review(&self, review: &NewReview) -> Result<Review, RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables
            .reviews
            .iter()
            .any(|r| r.order_id == review.order_id && r.buyer_uid == review.buyer_uid)
        {
            return Err(RepositoryError::Conflict(
                "order already reviewed".to_string(),
            ));
        }

        let stored = Review {
            id: ReviewId::generate(),
            order_id: review.order_id,
            buyer_uid: review.buyer_uid.clone(),
            rating: review.rating,
            comment: review.comment.clone(),
            created_at: Utc::now(),
        };
        tables.reviews.push(stored.clone());
        Ok(stored)
    }

    async fn review_for(
        &self,
        order_id: OrderId,
        buyer: &PiUid,
    ) -> Result<Option<Review>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .reviews
            .iter()
            .find(|r| r.order_id == order_id && &r.buyer_uid == buyer)
            .cloned())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;
    use titi_core::{OrderItem, PaymentState};

    use super::*;

    fn item(seller: &str) -> OrderItem {
        OrderItem {
            product_id: ProductId::new("p1"),
            seller_uid: PiUid::new(seller),
            name: "Mango".to_string(),
            quantity: 2,
            price: Decimal::from(8),
        }
    }

    #[tokio::test]
    async fn test_duplicate_payment_id_conflicts() {
        let store = MemoryStore::new();
        let payment = Some(PaymentId::new("pay_1"));
        let order = NewOrder::new(PiUid::new("u1"), vec![item("s1")], None, payment);

        store.insert_order(&order).await.unwrap();
        let err = store.insert_order(&order).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn test_seller_listing_filters_by_item_and_status() {
        let store = MemoryStore::new();
        let first = store
            .insert_order(&NewOrder::new(PiUid::new("u1"), vec![item("s1")], None, None))
            .await
            .unwrap();
        store
            .insert_order(&NewOrder::new(PiUid::new("u2"), vec![item("s2")], None, None))
            .await
            .unwrap();
        store
            .update_status(first.id, OrderStatus::Shipping)
            .await
            .unwrap();

        let s1 = PiUid::new("s1");
        assert_eq!(store.orders_by_seller(&s1, None).await.unwrap().len(), 1);
        assert!(
            store
                .orders_by_seller(&s1, Some(OrderStatus::Pending))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_ledger_keeps_fields_not_in_update() {
        let store = MemoryStore::new();
        let id = PaymentId::new("pay_1");
        store
            .record_payment(
                PaymentUpdate::new(id.clone(), PaymentState::Approved)
                    .buyer(Some(PiUid::new("u1"))),
            )
            .await
            .unwrap();
        let record = store
            .record_payment(PaymentUpdate::new(id, PaymentState::Completed).txid("tx"))
            .await
            .unwrap();

        assert_eq!(record.state, PaymentState::Completed);
        assert_eq!(record.buyer_uid, Some(PiUid::new("u1")));
        assert_eq!(record.txid.as_deref(), Some("tx"));
        assert!(record.is_unrecorded());
    }

    #[tokio::test]
    async fn test_upsert_keeps_existing_role() {
        let store = MemoryStore::new();
        let identity = Identity {
            uid: PiUid::new("u1"),
            username: "alice".to_string(),
            wallet_address: None,
        };
        store.upsert_user(&identity, Role::Customer).await.unwrap();
        store.set_role(&identity.uid, Role::Seller).await.unwrap();
        let record = store.upsert_user(&identity, Role::Customer).await.unwrap();
        assert_eq!(record.stored_role(), Some(Role::Seller));
    }
}
