//! Session-less authentication endpoints.
//!
//! There is no server session: every request carries its Pi access token.
//! `login` records the user, `logout` drops the cached verification.

use axum::{Json, extract::State, http::StatusCode};

use crate::error::{AppError, clear_sentry_user};
use crate::middleware::{AuthUser, BearerToken};
use crate::state::AppState;

/// `POST /auth/login` - record the caller and return `{user, role}`.
///
/// A first login creates the user row with the resolved role (seller when
/// allow-listed, otherwise customer). Later logins refresh username and
/// wallet but never touch the stored role.
#[tracing::instrument(skip_all, fields(uid = %user.uid()))]
pub async fn login(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<AuthUser>, AppError> {
    state
        .stores()
        .users
        .upsert_user(&user.identity, user.role)
        .await?;

    tracing::info!(role = %user.role, "user logged in");
    Ok(Json(user))
}

/// `POST /auth/logout` - evict the token from the identity cache.
#[tracing::instrument(skip_all, fields(uid = %user.uid()))]
pub async fn logout(
    State(state): State<AppState>,
    user: AuthUser,
    BearerToken(token): BearerToken,
) -> StatusCode {
    state.identity_cache().invalidate(&token).await;
    clear_sentry_user();
    StatusCode::NO_CONTENT
}

/// `GET /me` - the verified caller and their role.
pub async fn me(user: AuthUser) -> Json<AuthUser> {
    Json(user)
}
