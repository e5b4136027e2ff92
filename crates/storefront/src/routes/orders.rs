//! Order endpoints for buyers and owning sellers.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use titi_core::{Order, OrderId, OrderStatus};

use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::policy;
use crate::services::orders::{CreateOrderRequest, Placement, place_order};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct UpdateStatusResponse {
    pub success: bool,
    pub status: OrderStatus,
}

/// `POST /orders` - 201 with the new order, or 200 with the order already
/// recorded for the same payment.
#[tracing::instrument(skip_all, fields(uid = %user.uid()))]
pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    if !policy::can_place_order(&user) {
        return Err(AppError::Forbidden);
    }
    let Json(request) = body.map_err(|e| {
        tracing::debug!(error = %e, "unreadable order body");
        AppError::Invalid("INVALID_ITEMS")
    })?;

    match place_order(state.stores(), user.uid(), request, Utc::now()).await? {
        Placement::Created(order) => Ok((StatusCode::CREATED, Json(order))),
        Placement::Existing(order) => Ok((StatusCode::OK, Json(order))),
    }
}

/// `GET /orders` - the caller's own orders, newest first.
#[tracing::instrument(skip_all, fields(uid = %user.uid()))]
pub async fn list(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<Order>>, AppError> {
    if !policy::can_place_order(&user) {
        return Err(AppError::Forbidden);
    }
    let orders = state.stores().orders.orders_by_buyer(user.uid()).await?;
    Ok(Json(orders))
}

/// `GET /orders/{id}`
#[tracing::instrument(skip_all, fields(uid = %user.uid(), order_id = %id))]
pub async fn show(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Order>, AppError> {
    let order = load_order(&state, &id).await?;
    if !policy::can_view_order(&user, &order) {
        return Err(AppError::Forbidden);
    }
    Ok(Json(order))
}

/// `PATCH /orders/{id}` - change the status, for a seller holding an item.
#[tracing::instrument(skip_all, fields(uid = %user.uid(), order_id = %id))]
pub async fn update_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    body: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<UpdateStatusResponse>, AppError> {
    let order = load_order(&state, &id).await?;
    if !policy::can_mutate_order(&user, &order) {
        return Err(AppError::Forbidden);
    }

    let status = body
        .ok()
        .and_then(|Json(body)| body.status.parse::<OrderStatus>().ok())
        .ok_or(AppError::Invalid("INVALID_STATUS"))?;

    if !order.status.can_transition_to(status) {
        return Err(AppError::Invalid("INVALID_STATUS_TRANSITION"));
    }

    state.stores().orders.update_status(order.id, status).await?;
    tracing::info!(from = %order.status, to = %status, "order status changed");

    Ok(Json(UpdateStatusResponse {
        success: true,
        status,
    }))
}

/// Fetch an order by its path id; malformed ids are simply not found.
pub(crate) async fn load_order(state: &AppState, id: &str) -> Result<Order, AppError> {
    let id = OrderId::parse(id).ok_or(AppError::NotFound("ORDER_NOT_FOUND"))?;
    state
        .stores()
        .orders
        .order_by_id(id)
        .await?
        .ok_or(AppError::NotFound("ORDER_NOT_FOUND"))
}
