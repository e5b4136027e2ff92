//! TiTi Mall checkout client.
//!
//! Drives a Pi payment from the buyer's side: the cart the amount is taken
//! from, the journal that survives an interrupted flow, the storefront API
//! calls, and the state machine tying them to the Pi SDK callbacks.
//!
//! # Modules
//!
//! - [`storage`] - Key/value persistence boundary (memory or files)
//! - [`cart`] - Cart lines with selection and change notifications
//! - [`journal`] - The payment currently in flight
//! - [`api`] - Storefront HTTP client
//! - [`orchestrator`] - The checkout state machine

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cart;
pub mod error;
pub mod journal;
pub mod orchestrator;
pub mod storage;

pub use api::StorefrontClient;
pub use cart::{CartEvent, CartLine, CartStore};
pub use error::{CheckoutError, ClientError, StorageError};
pub use journal::{JournalEntry, PaymentJournal};
pub use orchestrator::{CheckoutFailure, CheckoutOrchestrator, CheckoutState, PaymentRequest};
pub use storage::{ClientStorage, FileStorage, MemoryStorage};
