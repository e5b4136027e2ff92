//! Authentication extractors.
//!
//! The auth guard turns `Authorization: Bearer <pi-access-token>` into an
//! [`AuthUser`]: the token is verified with the identity provider (bounded
//! by the configured timeout, short-circuited by the identity cache), then
//! the role resolver assigns a role. Anything short of a verified identity
//! is `UNAUTHENTICATED`.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use serde::Serialize;

use titi_core::{Identity, PiUid, Role};

use crate::error::{AppError, set_sentry_user};
use crate::policy;
use crate::state::AppState;

/// A caller whose identity has been verified, with their resolved role.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(user: AuthUser) -> impl IntoResponse {
///     format!("Hello, {}!", user.identity.username)
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct AuthUser {
    #[serde(rename = "user")]
    pub identity: Identity,
    pub role: Role,
}

impl AuthUser {
    #[must_use]
    pub const fn uid(&self) -> &PiUid {
        &self.identity.uid
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;
        let identity = verify_token(state, &token).await?;
        let role = state.roles().resolve(&identity).await;

        set_sentry_user(&identity.uid, Some(&identity.username));
        tracing::debug!(uid = %identity.uid, role = %role, "authenticated");

        Ok(Self { identity, role })
    }
}

/// Extractor that additionally requires a seller-capable role.
///
/// Rejects with `FORBIDDEN` when the caller is authenticated but not a
/// seller or admin.
pub struct SellerUser(pub AuthUser);

impl FromRequestParts<AppState> for SellerUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !policy::can_act_as_seller(&user) {
            return Err(AppError::Forbidden);
        }
        Ok(Self(user))
    }
}

/// Extractor that optionally verifies the caller.
///
/// Unlike `AuthUser`, this never rejects: a missing or unverifiable token
/// yields `None`.
pub struct OptionalAuthUser(pub Option<AuthUser>);

impl FromRequestParts<AppState> for OptionalAuthUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if bearer_token(&parts.headers).is_none() {
            return Ok(Self(None));
        }
        Ok(Self(AuthUser::from_request_parts(parts, state).await.ok()))
    }
}

/// The raw bearer token of the request.
pub struct BearerToken(pub String);

impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        bearer_token(&parts.headers)
            .map(|token| Self(token.to_string()))
            .ok_or(AppError::Unauthenticated)
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
///
/// The scheme is matched case-insensitively; an empty token counts as absent.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Verify `token`, consulting the identity cache first.
async fn verify_token(state: &AppState, token: &str) -> Result<Identity, AppError> {
    if let Some(identity) = state.identity_cache().get(token).await {
        return Ok(identity);
    }

    let verification = tokio::time::timeout(
        state.identity_timeout(),
        state.identity_provider().verify(token),
    )
    .await;

    match verification {
        Ok(Ok(identity)) => {
            state.identity_cache().insert(token, identity.clone()).await;
            Ok(identity)
        }
        Ok(Err(e)) => {
            tracing::info!(error = %e, "identity verification failed");
            Err(AppError::Unauthenticated)
        }
        Err(_) => {
            tracing::warn!(
                timeout_ms = u64::try_from(state.identity_timeout().as_millis()).unwrap_or(u64::MAX),
                "identity provider timed out"
            );
            Err(AppError::Unauthenticated)
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(value) {
            headers.insert(AUTHORIZATION, value);
        }
        headers
    }

    #[test]
    fn test_parses_bearer_tokens() {
        assert_eq!(bearer_token(&headers("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers("bearer  abc ")), Some("abc"));
    }

    #[test]
    fn test_rejects_malformed_headers() {
        assert_eq!(bearer_token(&HeaderMap::new()), None);
        assert_eq!(bearer_token(&headers("Bearer")), None);
        assert_eq!(bearer_token(&headers("Bearer   ")), None);
        assert_eq!(bearer_token(&headers("Basic abc")), None);
        assert_eq!(bearer_token(&headers("abc")), None);
    }
}
