//! Local ledger of Pi payments relayed through the storefront.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use titi_core::{OrderId, PaymentId, PaymentState, PiUid};

/// The persisted `{payment_id, state}` record for one Pi payment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub payment_id: PaymentId,
    pub state: PaymentState,
    pub buyer_uid: Option<PiUid>,
    pub amount: Option<Decimal>,
    pub txid: Option<String>,
    pub order_id: Option<OrderId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    /// Completed on-chain but never turned into an order.
    #[must_use]
    pub fn is_unrecorded(&self) -> bool {
        self.state == PaymentState::Completed && self.order_id.is_none()
    }
}

/// A state change to apply to the ledger.
///
/// Fields left as `None` keep whatever the ledger already holds.
#[derive(Debug, Clone)]
pub struct PaymentUpdate {
    pub payment_id: PaymentId,
    pub state: PaymentState,
    pub buyer_uid: Option<PiUid>,
    pub amount: Option<Decimal>,
    pub txid: Option<String>,
}

impl PaymentUpdate {
    #[must_use]
    pub const fn new(payment_id: PaymentId, state: PaymentState) -> Self {
        Self {
            payment_id,
            state,
            buyer_uid: None,
            amount: None,
            txid: None,
        }
    }

    #[must_use]
    pub fn buyer(mut self, buyer_uid: Option<PiUid>) -> Self {
        self.buyer_uid = buyer_uid;
        self
    }

    #[must_use]
    pub fn amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }

    #[must_use]
    pub fn txid(mut self, txid: impl Into<String>) -> Self {
        self.txid = Some(txid.into());
        self
    }
}
