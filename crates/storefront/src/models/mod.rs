//! Domain models for the storefront.
//!
//! Shared order types live in `titi_core`; these are the records only the
//! server reads and writes.

pub mod catalog;
pub mod feedback;
pub mod order;
pub mod payment;
pub mod user;

pub use catalog::CatalogProduct;
pub use feedback::{NewReturn, NewReview, ReturnRequest, Review};
pub use order::NewOrder;
pub use payment::{PaymentRecord, PaymentUpdate};
pub use user::UserRecord;
