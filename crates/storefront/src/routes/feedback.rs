//! Return requests and reviews.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};

use titi_core::ReturnId;

use crate::db::RepositoryError;
use crate::error::AppError;
use crate::middleware::AuthUser;
use crate::models::{NewReturn, NewReview, Review};
use crate::policy;
use crate::routes::orders::load_order;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnBody {
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnResponse {
    pub success: bool,
    pub return_id: ReturnId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewBody {
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub rating: Option<i64>,
    #[serde(default)]
    pub comment: String,
}

/// `POST /returns`
#[tracing::instrument(skip_all, fields(uid = %user.uid()))]
pub async fn create_return(
    State(state): State<AppState>,
    user: AuthUser,
    body: Result<Json<ReturnBody>, JsonRejection>,
) -> Result<Json<ReturnResponse>, AppError> {
    let Json(body) = body.map_err(|_| AppError::Invalid("INVALID_BODY"))?;
    let reason = body.reason.trim();
    if reason.is_empty() {
        return Err(AppError::Invalid("INVALID_REASON"));
    }

    let order = load_order(&state, &body.order_id).await?;
    if !policy::can_return_order(&user, &order) {
        return Err(AppError::Forbidden);
    }
    if !order.status.is_returnable() {
        return Err(AppError::Invalid("ORDER_NOT_RETURNABLE"));
    }

    let images = body
        .images
        .into_iter()
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .collect();

    let stored = state
        .stores()
        .feedback
        .insert_return(&NewReturn {
            order_id: order.id,
            buyer_uid: user.uid().clone(),
            reason: reason.to_string(),
            images,
        })
        .await?;

    tracing::info!(order_id = %order.id, return_id = %stored.id, "return requested");
    Ok(Json(ReturnResponse {
        success: true,
        return_id: stored.id,
    }))
}

/// `POST /reviews` - one review per order and buyer.
#[tracing::instrument(skip_all, fields(uid = %user.uid()))]
pub async fn create_review(
    State(state): State<AppState>,
    user: AuthUser,
    body: Result<Json<ReviewBody>, JsonRejection>,
) -> Result<Json<Review>, AppError> {
    let Json(body) = body.map_err(|_| AppError::Invalid("INVALID_BODY"))?;
    let rating = body
        .rating
        .and_then(|r| u8::try_from(r).ok())
        .filter(|r| (1..=5).contains(r))
        .ok_or(AppError::Invalid("INVALID_RATING"))?;

    let order = load_order(&state, &body.order_id).await?;
    if !policy::can_review_order(&user, &order) {
        return Err(AppError::Forbidden);
    }

    let feedback = &state.stores().feedback;
    if feedback.review_for(order.id, user.uid()).await?.is_some() {
        return Err(AppError::Conflict("ALREADY_REVIEWED"));
    }

    let review = feedback
        .insert_review(&NewReview {
            order_id: order.id,
            buyer_uid: user.uid().clone(),
            rating,
            comment: body.comment.trim().to_string(),
        })
        .await
        .map_err(|e| match e {
            RepositoryError::Conflict(_) => AppError::Conflict("ALREADY_REVIEWED"),
            other => other.into(),
        })?;

    Ok(Json(review))
}
