//! Business logic services for storefront.
//!
//! # Services
//!
//! - `identity` - Pi access token verification
//! - `identity_cache` - Short-lived cache of verified tokens
//! - `roles` - Role resolution from the user store and seller allow-list
//! - `orders` - Order placement against the catalog and payment ledger

pub mod identity;
pub mod identity_cache;
pub mod orders;
pub mod roles;
