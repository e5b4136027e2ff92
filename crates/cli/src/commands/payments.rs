//! Payment ledger commands.
//!
//! `clear` is the recovery path for a payment that was approved but never
//! completed: Pi keeps such a payment open and blocks the buyer's next
//! one until it is cancelled server-side.
//!
//! # Environment Variables
//!
//! - `STOREFRONT_DATABASE_URL` (or `DATABASE_URL`)
//! - `PI_API_KEY`, `PI_NETWORK`, `PI_API_BASE_URL` - as for the storefront

use chrono::{Duration, Utc};

use titi_core::{PaymentId, PaymentState};
use titi_storefront::config::PiConfig;
use titi_storefront::db::Stores;
use titi_storefront::models::{PaymentRecord, PaymentUpdate};
use titi_storefront::pi::{PaymentAction, PiClient};

use super::{CommandError, connect};

/// Print payments that need an operator's attention.
pub async fn stale(minutes: u32) -> Result<(), CommandError> {
    let stores = connect().await?;
    let cutoff = Utc::now() - Duration::minutes(i64::from(minutes));

    let records = stores.payments.stale_payments(cutoff).await?;
    tracing::info!(count = records.len(), minutes, "stale payments found");

    #[allow(clippy::print_stdout)]
    {
        if records.is_empty() {
            println!("No payments untouched for {minutes} minutes.");
        }
        for record in &records {
            println!("{}", describe(record));
        }
    }
    Ok(())
}

/// Cancel `payment_id` on Pi, then mark it cancelled in the ledger.
pub async fn clear(payment_id: &str) -> Result<(), CommandError> {
    let payment_id = payment_id.trim();
    if payment_id.is_empty() {
        return Err(CommandError::Invalid("payment id must not be empty".to_string()));
    }
    let payment_id = PaymentId::new(payment_id);

    let stores = connect().await?;
    ensure_no_order(&stores, &payment_id).await?;

    let pi = PiClient::new(&PiConfig::from_env()?)?;
    tracing::info!(payment_id = %payment_id, network = ?pi.network(), "Cancelling payment on Pi...");
    let response = pi.relay(PaymentAction::Cancel, &payment_id, None).await?;
    if !response.is_success() {
        return Err(CommandError::Upstream {
            status: response.status.as_u16(),
            body: String::from_utf8_lossy(&response.body).into_owned(),
        });
    }

    stores
        .payments
        .record_payment(PaymentUpdate::new(payment_id.clone(), PaymentState::Cancelled))
        .await?;

    tracing::info!(payment_id = %payment_id, "Payment cleared");
    Ok(())
}

/// The ledger link can lag the order row, so both are checked.
async fn ensure_no_order(stores: &Stores, payment_id: &PaymentId) -> Result<(), CommandError> {
    let linked = stores
        .payments
        .payment(payment_id)
        .await?
        .is_some_and(|record| record.order_id.is_some());
    if linked || stores.orders.order_by_payment_id(payment_id).await?.is_some() {
        return Err(CommandError::Invalid(format!(
            "payment {payment_id} already has an order; refusing to cancel"
        )));
    }
    Ok(())
}

fn describe(record: &PaymentRecord) -> String {
    let buyer = record.buyer_uid.as_ref().map_or("-", |uid| uid.as_str());
    let amount = record
        .amount
        .map_or_else(|| "-".to_string(), |a| a.to_string());
    let note = if record.is_unrecorded() {
        "  (completed, no order)"
    } else {
        ""
    };
    format!(
        "{}  {:<9}  buyer={}  amount={}  updated={}{}",
        record.payment_id,
        record.state.as_str(),
        buyer,
        amount,
        record.updated_at.format("%Y-%m-%d %H:%M"),
        note
    )
}
