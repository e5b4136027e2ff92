//! Seller endpoints.

use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
};
use serde::{Deserialize, Serialize};

use titi_core::{Order, OrderStatus, Role};

use crate::error::AppError;
use crate::middleware::{AuthUser, SellerUser};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SellerOrdersQuery {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub role: Role,
}

/// `GET /seller/orders?status=` - orders holding at least one of the
/// caller's items, newest first.
#[tracing::instrument(skip_all, fields(uid = %user.uid()))]
pub async fn orders(
    State(state): State<AppState>,
    SellerUser(user): SellerUser,
    query: Result<Query<SellerOrdersQuery>, QueryRejection>,
) -> Result<Json<Vec<Order>>, AppError> {
    let Query(query) = query.map_err(|_| AppError::Invalid("INVALID_STATUS"))?;
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<OrderStatus>)
        .transpose()
        .map_err(|_| AppError::Invalid("INVALID_STATUS"))?;

    let orders = state
        .stores()
        .orders
        .orders_by_seller(user.uid(), status)
        .await?;
    Ok(Json(orders))
}

/// `POST /seller/register` - promote the caller to seller.
///
/// Admins keep their role.
#[tracing::instrument(skip_all, fields(uid = %user.uid()))]
pub async fn register(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<RegisterResponse>, AppError> {
    if matches!(user.role, Role::Admin | Role::Seller) {
        return Ok(Json(RegisterResponse { role: user.role }));
    }

    let users = &state.stores().users;
    users.upsert_user(&user.identity, Role::Seller).await?;
    users.set_role(user.uid(), Role::Seller).await?;

    tracing::info!("registered as seller");
    Ok(Json(RegisterResponse { role: Role::Seller }))
}
