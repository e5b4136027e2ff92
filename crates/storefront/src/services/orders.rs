//! Order placement.
//!
//! Clients send product ids and quantities, optionally with the prices and
//! total they showed the buyer. The server re-prices every line from the
//! catalog at the time of the request, takes the seller from the catalog
//! row, and computes the total itself. Client prices are only compared and
//! logged.
//!
//! When the order carries a Pi `paymentId`, placement is idempotent: the
//! same buyer retrying gets the already recorded order back.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use titi_core::{Order, OrderItem, PaymentId, PaymentState, PiUid, ProductId};

use crate::db::{RepositoryError, Stores};
use crate::error::AppError;
use crate::models::NewOrder;

/// Body of `POST /orders`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub items: Vec<OrderLineRequest>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub payment_id: Option<String>,
    /// Total the client displayed; never trusted.
    #[serde(default)]
    pub total: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineRequest {
    pub product_id: String,
    pub quantity: i64,
    /// Unit price from the client's cart snapshot; never trusted.
    #[serde(default)]
    pub price: Option<Decimal>,
}

/// Outcome of a placement.
#[derive(Debug)]
pub enum Placement {
    Created(Order),
    /// The payment was already recorded for this buyer.
    Existing(Order),
}

struct Line {
    product_id: ProductId,
    quantity: u32,
    client_price: Option<Decimal>,
}

/// Place an order for `buyer`.
///
/// # Errors
///
/// - `INVALID_ITEMS` for an empty list, a quantity outside `1..=i32::MAX`, a blank,
///   duplicated or unknown product id
/// - `PAYMENT_ALREADY_RECORDED` if the payment belongs to another buyer's order
/// - `PAYMENT_CANCELLED` if the ledger saw the payment cancelled
pub async fn place_order(
    stores: &Stores,
    buyer: &PiUid,
    request: CreateOrderRequest,
    now: DateTime<Utc>,
) -> Result<Placement, AppError> {
    let lines = validate_lines(&request.items)?;
    let payment_id = request
        .payment_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(PaymentId::new);

    if let Some(payment_id) = &payment_id {
        if let Some(existing) = stores.orders.order_by_payment_id(payment_id).await? {
            return existing_for(buyer, existing);
        }
        if let Some(record) = stores.payments.payment(payment_id).await?
            && record.state == PaymentState::Cancelled
        {
            return Err(AppError::Conflict("PAYMENT_CANCELLED"));
        }
    }

    let items = price_lines(stores, &lines, now).await?;
    let order = NewOrder::new(buyer.clone(), items, request.note, payment_id.clone());

    if let Some(client_total) = request.total
        && client_total != order.total()
    {
        tracing::warn!(
            buyer = %buyer,
            client_total = %client_total,
            server_total = %order.total(),
            "client total disagrees with catalog pricing"
        );
    }

    let created = match stores.orders.insert_order(&order).await {
        Ok(created) => created,
        // Lost a race with a concurrent retry of the same payment.
        Err(RepositoryError::Conflict(_)) => {
            let Some(payment_id) = &payment_id else {
                return Err(AppError::Internal("order conflict without payment".to_string()));
            };
            return match stores.orders.order_by_payment_id(payment_id).await? {
                Some(existing) => existing_for(buyer, existing),
                None => Err(AppError::Conflict("PAYMENT_ALREADY_RECORDED")),
            };
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(payment_id) = &payment_id {
        match stores.payments.link_order(payment_id, created.id).await {
            Ok(()) => {}
            Err(RepositoryError::NotFound) => {
                tracing::info!(payment_id = %payment_id, "order recorded for payment unknown to the ledger");
            }
            Err(e) => {
                tracing::warn!(payment_id = %payment_id, error = %e, "failed to link order in payment ledger");
            }
        }
    }

    tracing::info!(
        order_id = %created.id,
        buyer = %buyer,
        total = %created.total,
        items = created.items.len(),
        "order placed"
    );

    Ok(Placement::Created(created))
}

fn existing_for(buyer: &PiUid, existing: Order) -> Result<Placement, AppError> {
    if &existing.buyer_uid == buyer {
        tracing::info!(order_id = %existing.id, "order already recorded for payment");
        Ok(Placement::Existing(existing))
    } else {
        Err(AppError::Conflict("PAYMENT_ALREADY_RECORDED"))
    }
}

fn validate_lines(items: &[OrderLineRequest]) -> Result<Vec<Line>, AppError> {
    if items.is_empty() {
        return Err(AppError::Invalid("INVALID_ITEMS"));
    }

    let mut seen = HashSet::new();
    items
        .iter()
        .map(|item| {
            let product_id = item.product_id.trim();
            // Quantities are stored as Postgres `INTEGER`.
            let quantity = i32::try_from(item.quantity)
                .ok()
                .filter(|q| *q > 0)
                .and_then(|q| u32::try_from(q).ok())
                .ok_or(AppError::Invalid("INVALID_ITEMS"))?;

            if product_id.is_empty() || !seen.insert(product_id.to_string()) {
                return Err(AppError::Invalid("INVALID_ITEMS"));
            }

            Ok(Line {
                product_id: ProductId::new(product_id),
                quantity,
                client_price: item.price,
            })
        })
        .collect()
}

async fn price_lines(
    stores: &Stores,
    lines: &[Line],
    now: DateTime<Utc>,
) -> Result<Vec<OrderItem>, AppError> {
    let ids: Vec<ProductId> = lines.iter().map(|l| l.product_id.clone()).collect();
    let catalog: HashMap<ProductId, _> = stores
        .catalog
        .products_by_ids(&ids)
        .await?
        .into_iter()
        .map(|p| (p.id.clone(), p))
        .collect();

    lines
        .iter()
        .map(|line| {
            let product = catalog
                .get(&line.product_id)
                .ok_or(AppError::Invalid("INVALID_ITEMS"))?;
            let price = product.price_at(now);

            if let Some(client_price) = line.client_price
                && client_price != price
            {
                tracing::debug!(
                    product_id = %line.product_id,
                    client_price = %client_price,
                    catalog_price = %price,
                    "client price ignored"
                );
            }

            Ok(OrderItem {
                product_id: line.product_id.clone(),
                seller_uid: product.seller_uid.clone(),
                name: product.name.clone(),
                quantity: line.quantity,
                price,
            })
        })
        .collect()
}
