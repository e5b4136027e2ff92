//! Catalog entries as seen by order creation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use titi_core::{PiUid, ProductId, UnitPricing};

/// The catalog fields order creation needs: who sells it and what it costs.
#[derive(Debug, Clone)]
pub struct CatalogProduct {
    pub id: ProductId,
    pub seller_uid: PiUid,
    pub name: String,
    pub pricing: UnitPricing,
}

impl CatalogProduct {
    /// Unit price charged at `now`.
    #[must_use]
    pub fn price_at(&self, now: DateTime<Utc>) -> Decimal {
        self.pricing.effective_at(now)
    }
}
