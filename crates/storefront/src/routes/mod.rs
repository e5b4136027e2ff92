//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET   /health                - Liveness
//! GET   /health/ready          - Readiness (503 when the store is unreachable)
//!
//! # Auth (bearer token)
//! POST  /auth/login            - Record the user, return {user, role}
//! POST  /auth/logout           - Evict the cached verification
//! GET   /me                    - {user, role}
//!
//! # Orders (bearer token)
//! POST  /orders                - Place an order
//! GET   /orders                - Caller's orders
//! GET   /orders/{id}           - One order (buyer, owning seller, admin)
//! PATCH /orders/{id}           - Change status (owning seller, admin)
//! POST  /returns               - Request a return
//! POST  /reviews               - Review an order
//!
//! # Seller
//! GET   /seller/orders         - Orders holding the seller's items
//! POST  /seller/register       - Become a seller
//!
//! # Payment gateway relays (server key, rate limited)
//! POST  /pi/create
//! POST  /pi/approve
//! POST  /pi/complete
//! POST  /pi/cancel
//! GET   /pi/payments/{id}
//! ```

pub mod auth;
pub mod feedback;
pub mod health;
pub mod orders;
pub mod pi;
pub mod seller;

use axum::{
    Router,
    routing::{get, post},
};

use crate::middleware::pi_rate_limiter;
use crate::state::AppState;

/// Whether the payment relays get the per-IP rate limiter.
///
/// The limiter needs a client address; in-process tests have none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PiRateLimit {
    PerClientIp,
    Disabled,
}

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
}

/// Create the seller routes router.
pub fn seller_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(seller::orders))
        .route("/register", post(seller::register))
}

/// Create the payment relay routes router.
pub fn pi_routes(rate_limit: PiRateLimit) -> Router<AppState> {
    let router = Router::new()
        .route("/create", post(pi::create))
        .route("/approve", post(pi::approve))
        .route("/complete", post(pi::complete))
        .route("/cancel", post(pi::cancel))
        .route("/payments/{id}", get(pi::show));

    match rate_limit {
        PiRateLimit::PerClientIp => router.layer(pi_rate_limiter()),
        PiRateLimit::Disabled => router,
    }
}

/// Create all routes for the storefront.
pub fn routes(rate_limit: PiRateLimit) -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/auth", auth_routes())
        .route("/me", get(auth::me))
        .route("/orders", get(orders::list).post(orders::create))
        .route(
            "/orders/{id}",
            get(orders::show).patch(orders::update_status),
        )
        .route("/returns", post(feedback::create_return))
        .route("/reviews", post(feedback::create_review))
        .nest("/seller", seller_routes())
        .nest("/pi", pi_routes(rate_limit))
}
