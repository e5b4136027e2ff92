//! Error types for the checkout client.

use reqwest::StatusCode;
use thiserror::Error;

use crate::orchestrator::CheckoutState;

/// Errors reading or writing client storage.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored value is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Keys become file names, so only a safe alphabet is accepted.
    #[error("invalid storage key: {0}")]
    InvalidKey(String),
}

/// Errors calling the storefront API.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network failure or timeout.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The storefront answered with a non-success status.
    #[error("storefront returned {status}: {}", code.as_deref().unwrap_or("no error code"))]
    Rejected {
        status: StatusCode,
        code: Option<String>,
    },

    #[error("invalid storefront URL: {0}")]
    InvalidUrl(String),

    #[error("invalid bearer token")]
    InvalidToken,
}

impl ClientError {
    /// The `{"error": CODE}` code of a rejected call, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Rejected { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// Errors driving the checkout state machine.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// A flow is already in flight.
    #[error("a checkout is already being processed")]
    AlreadyProcessing,

    #[error("no cart lines are selected")]
    EmptySelection,

    /// A Pi SDK callback arrived in a state that does not expect it.
    #[error("unexpected {callback} callback while {state:?}")]
    UnexpectedCallback {
        callback: &'static str,
        state: CheckoutState,
    },

    /// A callback named a different payment than the one in flight.
    #[error("callback for payment {received} while {expected} is in flight")]
    PaymentMismatch { expected: String, received: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Client(#[from] ClientError),
}
