//! Payment gateway relays.
//!
//! Each handler validates its body, forwards one call to the Pi payments
//! API with the server key and relays the upstream status and body as is.
//! Successful relays also advance the local payment ledger; a ledger
//! failure is logged and never changes what the caller sees.
//!
//! These routes need no bearer token. When one is presented and verifies,
//! the ledger records the buyer.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use titi_core::{PaymentId, PaymentState, PiUid};

use crate::error::{AppError, add_breadcrumb};
use crate::middleware::OptionalAuthUser;
use crate::models::PaymentUpdate;
use crate::pi::{NewPayment, PaymentAction, PiError, PiResponse, is_valid_payment_id};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentBody {
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub txid: Option<String>,
}

impl PaymentBody {
    /// `Ok(None)` when absent; `INVALID_PAYMENT_ID` when not a Pi identifier.
    fn payment_id(&self) -> Result<Option<PaymentId>, AppError> {
        non_blank(self.payment_id.as_deref())
            .map(parse_payment_id)
            .transpose()
    }

    fn txid(&self) -> Option<String> {
        non_blank(self.txid.as_deref()).map(str::to_string)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CreatePaymentBody {
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub uid: Option<String>,
}

fn parse_payment_id(raw: &str) -> Result<PaymentId, AppError> {
    if is_valid_payment_id(raw) {
        Ok(PaymentId::new(raw))
    } else {
        Err(AppError::Invalid("INVALID_PAYMENT_ID"))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// `POST /pi/approve` - body `{paymentId}`.
pub async fn approve(
    State(state): State<AppState>,
    OptionalAuthUser(user): OptionalAuthUser,
    body: Result<Json<PaymentBody>, JsonRejection>,
) -> Result<Response, AppError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let payment_id = body
        .payment_id()?
        .ok_or(AppError::Invalid("MISSING_PAYMENT_ID"))?;

    relay(&state, PaymentAction::Approve, payment_id, None, user.map(|u| u.identity.uid)).await
}

/// `POST /pi/complete` - body `{paymentId, txid}`.
pub async fn complete(
    State(state): State<AppState>,
    OptionalAuthUser(user): OptionalAuthUser,
    body: Result<Json<PaymentBody>, JsonRejection>,
) -> Result<Response, AppError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let (Some(payment_id), Some(txid)) = (body.payment_id()?, body.txid()) else {
        return Err(AppError::Invalid("MISSING_PAYMENT_DATA"));
    };

    relay(
        &state,
        PaymentAction::Complete,
        payment_id,
        Some(txid),
        user.map(|u| u.identity.uid),
    )
    .await
}

/// `POST /pi/cancel` - body `{paymentId}`.
pub async fn cancel(
    State(state): State<AppState>,
    OptionalAuthUser(user): OptionalAuthUser,
    body: Result<Json<PaymentBody>, JsonRejection>,
) -> Result<Response, AppError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let payment_id = body
        .payment_id()?
        .ok_or(AppError::Invalid("MISSING_PAYMENT_ID"))?;

    relay(&state, PaymentAction::Cancel, payment_id, None, user.map(|u| u.identity.uid)).await
}

/// `POST /pi/create` - body `{amount, memo, metadata, uid}`.
///
/// `uid` may be omitted when the caller presents a verified bearer token.
#[tracing::instrument(skip_all)]
pub async fn create(
    State(state): State<AppState>,
    OptionalAuthUser(user): OptionalAuthUser,
    body: Result<Json<CreatePaymentBody>, JsonRejection>,
) -> Result<Response, AppError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let amount = body
        .amount
        .filter(|a| *a > Decimal::ZERO)
        .ok_or(AppError::Invalid("INVALID_AMOUNT"))?;
    let uid = non_blank(body.uid.as_deref())
        .map(PiUid::new)
        .or_else(|| user.map(|u| u.identity.uid))
        .ok_or(AppError::Invalid("MISSING_PAYMENT_DATA"))?;

    let payment = NewPayment {
        amount,
        memo: body.memo.unwrap_or_default(),
        metadata: body.metadata.unwrap_or_else(|| Value::Object(serde_json::Map::new())),
        uid: uid.as_str().to_string(),
    };

    let upstream = state.pi().create_payment(payment).await.map_err(upstream_failure)?;

    if upstream.is_success() {
        let identifier = upstream
            .json()
            .and_then(|v| v.get("identifier").and_then(Value::as_str).map(str::to_string));
        match identifier {
            Some(id) => {
                let update = PaymentUpdate::new(PaymentId::new(id), PaymentState::Created)
                    .buyer(Some(uid))
                    .amount(amount);
                record(&state, update).await;
            }
            None => tracing::warn!("created payment has no identifier, ledger not updated"),
        }
    }

    Ok(relay_response(upstream))
}

/// `GET /pi/payments/{id}` - the Pi record of a payment.
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let payment_id = parse_payment_id(id.trim())?;
    let upstream = state
        .pi()
        .get_payment(&payment_id)
        .await
        .map_err(upstream_failure)?;
    Ok(relay_response(upstream))
}

#[tracing::instrument(skip(state, payment_id, txid, buyer), fields(payment_id = %payment_id))]
async fn relay(
    state: &AppState,
    action: PaymentAction,
    payment_id: PaymentId,
    txid: Option<String>,
    buyer: Option<PiUid>,
) -> Result<Response, AppError> {
    add_breadcrumb(
        "payment",
        action.as_str(),
        Some(&[("payment_id", payment_id.as_str())]),
    );

    let upstream = state
        .pi()
        .relay(action, &payment_id, txid.as_deref())
        .await
        .map_err(upstream_failure)?;

    if upstream.is_success() {
        let next = match action {
            PaymentAction::Approve => PaymentState::Approved,
            PaymentAction::Complete => PaymentState::Completed,
            PaymentAction::Cancel => PaymentState::Cancelled,
        };
        let mut update = PaymentUpdate::new(payment_id, next).buyer(buyer);
        if let Some(txid) = txid {
            update = update.txid(txid);
        }
        record(state, update).await;
    }

    Ok(relay_response(upstream))
}

async fn record(state: &AppState, update: PaymentUpdate) {
    let payment_id = update.payment_id.clone();
    let next = update.state;
    match state.stores().payments.record_payment(update).await {
        Ok(_) => tracing::info!(payment_id = %payment_id, state = %next, "payment ledger updated"),
        Err(e) => {
            tracing::error!(payment_id = %payment_id, error = %e, "failed to update payment ledger");
        }
    }
}

fn upstream_failure(e: PiError) -> AppError {
    if matches!(e, PiError::InvalidPaymentId) {
        return AppError::Invalid("INVALID_PAYMENT_ID");
    }
    tracing::error!(error = %e, "Pi payments API unreachable");
    AppError::Internal(e.to_string())
}

fn relay_response(upstream: PiResponse) -> Response {
    let mut response = (upstream.status, upstream.body).into_response();
    match upstream.content_type {
        Some(content_type) => {
            response.headers_mut().insert(CONTENT_TYPE, content_type);
        }
        None => {
            response.headers_mut().remove(CONTENT_TYPE);
        }
    }
    response
}
