//! Unit pricing with sale windows, and order/cart totals.
//!
//! Amounts are Pi, held as [`Decimal`] so totals never pick up binary
//! floating point error.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// List price plus an optional sale price and the window it applies in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitPricing {
    pub price: Decimal,
    #[serde(default)]
    pub sale_price: Option<Decimal>,
    #[serde(default)]
    pub sale_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sale_end: Option<DateTime<Utc>>,
}

impl UnitPricing {
    /// A plain list price with no sale.
    #[must_use]
    pub const fn list(price: Decimal) -> Self {
        Self {
            price,
            sale_price: None,
            sale_start: None,
            sale_end: None,
        }
    }

    /// Whether the sale window covers `now`.
    ///
    /// The window is inclusive at both ends. A missing bound leaves that side
    /// open, so a sale price with no dates at all is always on sale.
    #[must_use]
    pub fn sale_active_at(&self, now: DateTime<Utc>) -> bool {
        self.sale_price.is_some()
            && self.sale_start.is_none_or(|start| start <= now)
            && self.sale_end.is_none_or(|end| now <= end)
    }

    /// Price charged per unit at `now`: the sale price inside the window,
    /// otherwise the list price.
    #[must_use]
    pub fn effective_at(&self, now: DateTime<Utc>) -> Decimal {
        match self.sale_price {
            Some(sale) if self.sale_active_at(now) => sale,
            _ => self.price,
        }
    }
}

/// Anything that carries a unit price and a quantity.
pub trait PricedLine {
    /// Unit price charged at `now`.
    fn unit_price_at(&self, now: DateTime<Utc>) -> Decimal;

    fn quantity(&self) -> u32;
}

/// `unit_price * quantity` for one line.
#[must_use]
pub fn line_total(unit_price: Decimal, quantity: u32) -> Decimal {
    unit_price * Decimal::from(quantity)
}

/// Sum of every line's effective unit price times its quantity.
#[must_use]
pub fn compute_total<'a, L, I>(lines: I, now: DateTime<Utc>) -> Decimal
where
    L: PricedLine + 'a,
    I: IntoIterator<Item = &'a L>,
{
    lines
        .into_iter()
        .map(|line| line_total(line.unit_price_at(now), line.quantity()))
        .sum()
}
