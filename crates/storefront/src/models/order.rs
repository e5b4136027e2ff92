//! Order creation input.

use rust_decimal::Decimal;

use titi_core::{OrderItem, PaymentId, PiUid, sum_items};

/// A fully priced order ready to be persisted.
///
/// Built only through [`NewOrder::new`], which derives `total` from the items.
#[derive(Debug, Clone)]
pub struct NewOrder {
    buyer_uid: PiUid,
    note: Option<String>,
    payment_id: Option<PaymentId>,
    items: Vec<OrderItem>,
    total: Decimal,
}

impl NewOrder {
    #[must_use]
    pub fn new(
        buyer_uid: PiUid,
        items: Vec<OrderItem>,
        note: Option<String>,
        payment_id: Option<PaymentId>,
    ) -> Self {
        let total = sum_items(&items);
        Self {
            buyer_uid,
            note,
            payment_id,
            items,
            total,
        }
    }

    #[must_use]
    pub const fn buyer_uid(&self) -> &PiUid {
        &self.buyer_uid
    }

    #[must_use]
    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    #[must_use]
    pub const fn payment_id(&self) -> Option<&PaymentId> {
        self.payment_id.as_ref()
    }

    #[must_use]
    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    #[must_use]
    pub const fn total(&self) -> Decimal {
        self.total
    }
}
