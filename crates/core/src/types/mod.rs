//! Core types for TiTi Mall.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod identity;
pub mod order;
pub mod pricing;
pub mod status;

pub use id::*;
pub use identity::{Identity, ParseRoleError, Role};
pub use order::{Order, OrderItem, sum_items};
pub use pricing::{PricedLine, UnitPricing, compute_total, line_total};
pub use status::*;
