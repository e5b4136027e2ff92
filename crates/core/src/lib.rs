//! TiTi Mall Core - Shared domain types.
//!
//! This crate provides the types shared by every TiTi Mall component:
//! - `storefront` - HTTP API (auth guard, orders, Pi payment relays)
//! - `checkout` - Client-side checkout orchestrator
//! - `cli` - Operator tooling (migrations, clearing pending payments)
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. Pricing lives here so that the client computing a
//! checkout amount and the server recording an order agree on the arithmetic.
//!
//! # Modules
//!
//! - [`types`] - Newtype ids, identities, roles, statuses and pricing

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
