//! Orders and their line items, as exchanged between server and client.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{OrderId, PaymentId, PiUid, ProductId};
use super::pricing::line_total;
use super::status::OrderStatus;

/// A recorded purchase.
///
/// `total` always equals the sum of `price * quantity` over `items`; the
/// storefront computes it once at creation and never accepts it from a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub buyer_uid: PiUid,
    pub status: OrderStatus,
    pub total: Decimal,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub payment_id: Option<PaymentId>,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

/// One line of an order, priced and attributed to a seller at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ProductId,
    pub seller_uid: PiUid,
    pub name: String,
    pub quantity: u32,
    pub price: Decimal,
}

impl OrderItem {
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        line_total(self.price, self.quantity)
    }
}

impl Order {
    /// Sum of the items' line totals.
    #[must_use]
    pub fn items_total(&self) -> Decimal {
        sum_items(&self.items)
    }

    /// Whether at least one line belongs to `seller`.
    #[must_use]
    pub fn has_item_from(&self, seller: &PiUid) -> bool {
        self.items.iter().any(|item| &item.seller_uid == seller)
    }
}

/// Sum of line totals over a slice of items.
#[must_use]
pub fn sum_items(items: &[OrderItem]) -> Decimal {
    items.iter().map(OrderItem::line_total).sum()
}
