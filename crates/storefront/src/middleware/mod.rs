//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. CORS (the Pi Browser app calls from its own origin)
//! 5. Rate limiting on `/pi/*` (governor)
//!
//! Authentication is not a layer: handlers take [`AuthUser`] or one of its
//! variants as an extractor.

pub mod auth;
pub mod rate_limit;
pub mod request_id;

pub use auth::{AuthUser, BearerToken, OptionalAuthUser, SellerUser, bearer_token};
pub use rate_limit::pi_rate_limiter;
pub use request_id::request_id_middleware;
